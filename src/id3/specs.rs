use memchr::memchr;

use crate::common::error::{Id3Error, Result};

/// Text encoding types used in ID3v2 frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    /// ISO-8859-1
    Latin1 = 0,
    /// UTF-16 starting with a byte order mark (UCS-2 in v2.2)
    Utf16 = 1,
    /// UTF-16 big endian without a byte order mark
    Utf16Be = 2,
    Utf8 = 3,
}

impl Encoding {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Encoding::Latin1),
            1 => Some(Encoding::Utf16),
            2 => Some(Encoding::Utf16Be),
            3 => Some(Encoding::Utf8),
            _ => None,
        }
    }

    /// Whether a tag of the given major version may use this encoding.
    pub fn allowed_in(self, version: u8) -> bool {
        match self {
            Encoding::Latin1 | Encoding::Utf16 => true,
            Encoding::Utf16Be => version >= 3,
            Encoding::Utf8 => version >= 4,
        }
    }

    /// Resolve an encoding byte read from, or destined for, a tag of `version`.
    pub fn for_version(b: u8, version: u8) -> Result<Self> {
        match Encoding::from_byte(b) {
            Some(enc) if enc.allowed_in(version) => Ok(enc),
            _ => Err(Id3Error::WrongEncoding { encoding: b, version }),
        }
    }

    pub fn is_utf16(self) -> bool {
        matches!(self, Encoding::Utf16 | Encoding::Utf16Be)
    }
}

/// Check for a UTF-16 byte order mark at the start of `data`.
pub fn has_bom(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xFE]) || data.starts_with(&[0xFE, 0xFF])
}

/// The encoding a text run actually uses.
///
/// Runs tagged "UTF-16 with BOM" that do not start with a BOM (common in
/// v2.2 tags, where the value meant UCS-2) are treated as BOM-less UTF-16.
pub fn effective_encoding(encoding: Encoding, run: &[u8]) -> Encoding {
    if encoding == Encoding::Utf16 && !has_bom(run) {
        Encoding::Utf16Be
    } else {
        encoding
    }
}

/// Decode text from bytes using the specified encoding.
pub fn decode_text(data: &[u8], encoding: Encoding) -> Result<String> {
    match encoding {
        Encoding::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
        Encoding::Utf16 => {
            let (decoder, start) = if data.starts_with(&[0xFF, 0xFE]) {
                (encoding_rs::UTF_16LE, 2)
            } else if data.starts_with(&[0xFE, 0xFF]) {
                (encoding_rs::UTF_16BE, 2)
            } else {
                (encoding_rs::UTF_16BE, 0)
            };
            let (result, _) = decoder.decode_without_bom_handling(&data[start..]);
            Ok(result.into_owned())
        }
        Encoding::Utf16Be => {
            let (result, _) = encoding_rs::UTF_16BE.decode_without_bom_handling(data);
            Ok(result.into_owned())
        }
        Encoding::Utf8 => Ok(String::from_utf8_lossy(data).into_owned()),
    }
}

/// Encode text to bytes using the specified encoding.
/// Characters outside Latin-1 become `?` when encoding to Latin-1.
pub fn encode_text(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Latin1 => text
            .chars()
            .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
            .collect(),
        Encoding::Utf16 => {
            let mut result = vec![0xFF, 0xFE]; // BOM (LE)
            for c in text.encode_utf16() {
                result.extend_from_slice(&c.to_le_bytes());
            }
            result
        }
        Encoding::Utf16Be => {
            let mut result = Vec::with_capacity(text.len() * 2);
            for c in text.encode_utf16() {
                result.extend_from_slice(&c.to_be_bytes());
            }
            result
        }
        Encoding::Utf8 => text.as_bytes().to_vec(),
    }
}

/// Re-encode a text run from one encoding into another.
pub fn transcode(data: &[u8], from: Encoding, to: Encoding) -> Result<Vec<u8>> {
    if from == to {
        return Ok(data.to_vec());
    }
    let text = decode_text(data, from)?;
    Ok(encode_text(&text, to))
}

/// Find the null terminator for the given encoding.
/// Returns the position of the null terminator (not including it).
/// UTF-16 terminators are only matched on even offsets.
pub fn find_null_terminator(data: &[u8], encoding: Encoding) -> Option<usize> {
    if encoding.is_utf16() {
        data.chunks_exact(2).position(|pair| pair == [0, 0]).map(|i| i * 2)
    } else {
        memchr(0, data)
    }
}

/// Size of the null terminator for each encoding.
pub fn null_terminator_size(encoding: Encoding) -> usize {
    if encoding.is_utf16() {
        2
    } else {
        1
    }
}

/// Split a null-terminated run off the front of `data`.
/// Returns the run without its terminator and the number of bytes consumed,
/// or `None` when no terminator is present.
pub fn split_terminated(data: &[u8], encoding: Encoding) -> Option<(&[u8], usize)> {
    find_null_terminator(data, encoding)
        .map(|pos| (&data[..pos], pos + null_terminator_size(encoding)))
}

/// Picture type enum matching ID3v2 APIC frame specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PictureType {
    Other = 0x00,
    FileIcon = 0x01,
    OtherFileIcon = 0x02,
    FrontCover = 0x03,
    BackCover = 0x04,
    LeafletPage = 0x05,
    Media = 0x06,
    LeadArtist = 0x07,
    Artist = 0x08,
    Conductor = 0x09,
    Band = 0x0A,
    Composer = 0x0B,
    Lyricist = 0x0C,
    RecordingLocation = 0x0D,
    DuringRecording = 0x0E,
    DuringPerformance = 0x0F,
    VideoScreenCapture = 0x10,
    ABrightColouredFish = 0x11,
    Illustration = 0x12,
    ArtistLogotype = 0x13,
    PublisherLogotype = 0x14,
}

impl PictureType {
    const ALL: [PictureType; 21] = [
        PictureType::Other,
        PictureType::FileIcon,
        PictureType::OtherFileIcon,
        PictureType::FrontCover,
        PictureType::BackCover,
        PictureType::LeafletPage,
        PictureType::Media,
        PictureType::LeadArtist,
        PictureType::Artist,
        PictureType::Conductor,
        PictureType::Band,
        PictureType::Composer,
        PictureType::Lyricist,
        PictureType::RecordingLocation,
        PictureType::DuringRecording,
        PictureType::DuringPerformance,
        PictureType::VideoScreenCapture,
        PictureType::ABrightColouredFish,
        PictureType::Illustration,
        PictureType::ArtistLogotype,
        PictureType::PublisherLogotype,
    ];

    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }
}

pub const JPEG_MIME: &str = "image/jpeg";
pub const PNG_MIME: &str = "image/png";

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Detect the MIME type of picture data from its magic numbers.
pub fn mime_type_from_image(data: &[u8]) -> Option<&'static str> {
    if data.len() >= 4 && data.starts_with(&[0xFF, 0xD8]) && data.ends_with(&[0xFF, 0xD9]) {
        Some(JPEG_MIME)
    } else if data.starts_with(&PNG_SIGNATURE) {
        Some(PNG_MIME)
    } else {
        None
    }
}

/// Expand a v2.2 image format code to a MIME type.
///
/// Only `JPG`/`jpg` map to JPEG; every other code is reported as PNG.
pub fn mime_type_from_image_format(code: &[u8]) -> &'static str {
    if code == b"JPG" || code == b"jpg" {
        JPEG_MIME
    } else {
        PNG_MIME
    }
}

/// The v2.2 image format code for a MIME type.
pub fn image_format_from_mime_type(mime: &str) -> &'static [u8; 3] {
    if mime.eq_ignore_ascii_case(JPEG_MIME) || mime.eq_ignore_ascii_case("image/jpg") {
        b"JPG"
    } else {
        b"PNG"
    }
}

/// Logical tag fields with a well-known frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Genre,
    Track,
    Year,
    Comment,
    DiscNumber,
    Composer,
    Picture,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Title,
        Field::Artist,
        Field::Album,
        Field::AlbumArtist,
        Field::Genre,
        Field::Track,
        Field::Year,
        Field::Comment,
        Field::DiscNumber,
        Field::Composer,
        Field::Picture,
    ];

    /// Frame ID of this field in a tag of the given major version.
    pub fn frame_id(self, version: u8) -> &'static str {
        FrameIdTable::for_version(version).id(self)
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Artist => "artist",
            Field::Album => "album",
            Field::AlbumArtist => "album_artist",
            Field::Genre => "genre",
            Field::Track => "track",
            Field::Year => "year",
            Field::Comment => "comment",
            Field::DiscNumber => "disc_number",
            Field::Composer => "composer",
            Field::Picture => "picture",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Frame IDs of the well-known fields for one family of versions.
/// Indexed in [`Field`] declaration order.
#[derive(Debug)]
pub struct FrameIdTable {
    ids: [&'static str; 11],
}

static V22_FRAME_IDS: FrameIdTable = FrameIdTable {
    ids: ["TT2", "TP1", "TAL", "TP2", "TCO", "TRK", "TYE", "COM", "TPA", "TCM", "PIC"],
};

static V23_FRAME_IDS: FrameIdTable = FrameIdTable {
    ids: ["TIT2", "TPE1", "TALB", "TPE2", "TCON", "TRCK", "TYER", "COMM", "TPOS", "TCOM", "APIC"],
};

impl FrameIdTable {
    pub fn for_version(version: u8) -> &'static FrameIdTable {
        if version == 2 {
            &V22_FRAME_IDS
        } else {
            &V23_FRAME_IDS
        }
    }

    pub fn id(&self, field: Field) -> &'static str {
        self.ids[field as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_allowed_by_version() {
        assert!(Encoding::for_version(1, 2).is_ok());
        assert!(matches!(
            Encoding::for_version(2, 2),
            Err(Id3Error::WrongEncoding { encoding: 2, version: 2 })
        ));
        assert!(Encoding::for_version(2, 3).is_ok());
        assert!(Encoding::for_version(3, 3).is_err());
        assert!(Encoding::for_version(3, 4).is_ok());
        assert!(Encoding::for_version(4, 4).is_err());
    }

    #[test]
    fn bom_presence_decides_encoding() {
        assert_eq!(effective_encoding(Encoding::Utf16, &[0xFF, 0xFE, b'a', 0]), Encoding::Utf16);
        assert_eq!(effective_encoding(Encoding::Utf16, &[0, b'a']), Encoding::Utf16Be);
        assert_eq!(effective_encoding(Encoding::Latin1, b"abc"), Encoding::Latin1);
    }

    #[test]
    fn decode_each_encoding() {
        assert_eq!(decode_text(b"caf\xE9", Encoding::Latin1).unwrap(), "café");
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0], Encoding::Utf16).unwrap(), "hi");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0, b'h', 0, b'i'], Encoding::Utf16).unwrap(), "hi");
        assert_eq!(decode_text(&[0, b'h', 0, b'i'], Encoding::Utf16Be).unwrap(), "hi");
        assert_eq!(decode_text("ß".as_bytes(), Encoding::Utf8).unwrap(), "ß");
    }

    #[test]
    fn encode_each_encoding() {
        assert_eq!(encode_text("é€", Encoding::Latin1), vec![0xE9, b'?']);
        assert_eq!(encode_text("A", Encoding::Utf16), vec![0xFF, 0xFE, b'A', 0]);
        assert_eq!(encode_text("A", Encoding::Utf16Be), vec![0, b'A']);
        assert_eq!(encode_text("A", Encoding::Utf8), vec![b'A']);
    }

    #[test]
    fn transcode_between_encodings() {
        let utf16 = transcode(b"abc", Encoding::Latin1, Encoding::Utf16).unwrap();
        assert_eq!(utf16, vec![0xFF, 0xFE, b'a', 0, b'b', 0, b'c', 0]);
        let back = transcode(&utf16, Encoding::Utf16, Encoding::Utf8).unwrap();
        assert_eq!(back, b"abc");
        let be = transcode(&utf16, Encoding::Utf16, Encoding::Utf16Be).unwrap();
        assert_eq!(be, vec![0, b'a', 0, b'b', 0, b'c']);
    }

    #[test]
    fn terminators() {
        assert_eq!(find_null_terminator(b"ab\0cd", Encoding::Latin1), Some(2));
        // The zero pair at offset 1..3 is not aligned and must be skipped
        assert_eq!(find_null_terminator(&[b'a', 0, 0, b'b', 0, 0], Encoding::Utf16Be), Some(4));
        assert_eq!(find_null_terminator(b"abc", Encoding::Utf8), None);
        assert_eq!(split_terminated(b"ab\0cd", Encoding::Latin1), Some((&b"ab"[..], 3)));
        assert_eq!(null_terminator_size(Encoding::Utf16), 2);
    }

    #[test]
    fn picture_types() {
        assert_eq!(PictureType::from_byte(0x03), Some(PictureType::FrontCover));
        assert_eq!(PictureType::from_byte(0x11), Some(PictureType::ABrightColouredFish));
        assert_eq!(PictureType::from_byte(0x14), Some(PictureType::PublisherLogotype));
        assert_eq!(PictureType::from_byte(0x15), None);
    }

    #[test]
    fn mime_detection() {
        assert_eq!(mime_type_from_image(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]), Some(JPEG_MIME));
        assert_eq!(mime_type_from_image(&[0xFF, 0xD8, 0x00, 0x00]), None);
        let mut png = PNG_SIGNATURE.to_vec();
        png.push(0);
        assert_eq!(mime_type_from_image(&png), Some(PNG_MIME));
        assert_eq!(mime_type_from_image(b"GIF89a"), None);
    }

    #[test]
    fn image_format_codes() {
        assert_eq!(mime_type_from_image_format(b"JPG"), JPEG_MIME);
        assert_eq!(mime_type_from_image_format(b"jpg"), JPEG_MIME);
        assert_eq!(mime_type_from_image_format(b"PNG"), PNG_MIME);
        // Unknown codes fall through to PNG
        assert_eq!(mime_type_from_image_format(b"GIF"), PNG_MIME);
        assert_eq!(image_format_from_mime_type(JPEG_MIME), b"JPG");
        assert_eq!(image_format_from_mime_type(PNG_MIME), b"PNG");
    }

    #[test]
    fn frame_id_table() {
        assert_eq!(Field::Title.frame_id(2), "TT2");
        assert_eq!(Field::Title.frame_id(3), "TIT2");
        assert_eq!(Field::Picture.frame_id(2), "PIC");
        assert_eq!(Field::Picture.frame_id(4), "APIC");
        assert_eq!(Field::DiscNumber.frame_id(4), "TPOS");
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
            assert_eq!(field.frame_id(2).len(), 3);
            assert_eq!(field.frame_id(3).len(), 4);
        }
    }
}
