use std::io::Read;

use byteorder::{BigEndian, WriteBytesExt};

use crate::common::error::{Id3Error, Result};
use crate::common::util;
use crate::id3::frames::{self, CommentContent, Frame, PictureContent, TextContent};
use crate::id3::header::{BitPaddedInt, ID3Header};
use crate::id3::specs::{self, Encoding, Field, PictureType};
use crate::id3::unsynch;

/// Largest value a 4-byte synchsafe integer holds.
pub(crate) const MAX_SYNCHSAFE: u32 = (1 << 28) - 1;
const MAX_U24: usize = (1 << 24) - 1;

/// An ID3v2 tag: header plus frames in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ID3Tag {
    pub header: ID3Header,
    frames: Vec<Frame>,
}

impl ID3Tag {
    /// Empty tag of the given major version.
    pub fn new(version: u8) -> Result<Self> {
        Ok(ID3Tag {
            header: ID3Header::new(version)?,
            frames: Vec::with_capacity(16),
        })
    }

    /// Build a tag from a parsed header and the `header.size` bytes following it.
    pub fn from_body(header: ID3Header, body: &[u8]) -> Result<Self> {
        let mut tag = ID3Tag {
            header,
            frames: Vec::with_capacity(16),
        };
        tag.read_frames(body)?;
        Ok(tag)
    }

    /// Major version: 2, 3 or 4.
    pub fn version(&self) -> u8 {
        self.header.major()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Parse the frame sequence of a tag body.
    fn read_frames(&mut self, body: &[u8]) -> Result<()> {
        let version = self.version();
        let flags = self.header.flags;

        // v2.2/v2.3 unsynchronisation covers the whole body; v2.4 applies it per frame
        let desynced;
        let mut data = body;
        if flags.unsynchronisation && version < 4 {
            desynced = unsynch::decode(body)?;
            data = &desynced;
        }

        // the extended header size is only meaningful once the body is desynced
        if flags.extended && data.len() >= 4 {
            self.header.extended_size = BitPaddedInt::syncsafe(&data[..4]);
        }
        let skip = self.header.extended_header_skip();
        if skip > 0 {
            log::debug!("skipping {} byte extended header", skip);
        }
        if skip >= data.len() {
            return Ok(());
        }
        let mut rest = &data[skip..];

        let frame_unsync = flags.unsynchronisation && version == 4;
        while let Some((frame, used)) = Frame::parse(rest, version, frame_unsync)? {
            self.frames.push(frame);
            rest = &rest[used..];
        }

        log::debug!("read {} frames from ID3v2.{} tag", self.frames.len(), version);
        Ok(())
    }

    fn lookup_key<'a>(&self, id: &'a str) -> &'a str {
        if self.version() == 2 {
            id.get(..3).unwrap_or(id)
        } else {
            id
        }
    }

    /// First frame with the given ID. In a v2.2 tag only the first three
    /// characters of `id` are compared.
    pub fn find(&self, id: &str) -> Option<&Frame> {
        let key = self.lookup_key(id);
        self.frames.iter().find(|f| f.id() == key)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Frame> {
        let key = self.lookup_key(id);
        self.frames.iter_mut().find(|f| f.id() == key)
    }

    fn find_field(&self, field: Field) -> Result<&Frame> {
        let id = field.frame_id(self.version());
        self.find(id)
            .ok_or_else(|| Id3Error::NotFound(format!("{} ({})", field.name(), id)))
    }

    /// Append a frame. v2.2 frames only go into v2.2 tags and vice versa.
    pub fn add_frame(&mut self, frame: Frame) -> Result<()> {
        let tag_version = self.version();
        if (frame.version() == 2) != (tag_version == 2) {
            return Err(Id3Error::IncompatibleTag {
                frame: frame.version(),
                tag: tag_version,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Remove every frame with the given ID, returning how many went.
    pub fn remove(&mut self, id: &str) -> usize {
        let key = self.lookup_key(id).to_string();
        let before = self.frames.len();
        self.frames.retain(|f| f.id() != key);
        before - self.frames.len()
    }

    /// Text of a well-known text field.
    pub fn text_field(&self, field: Field) -> Result<TextContent<'_>> {
        self.find_field(field)?.text_content()
    }

    pub fn title(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::Title)
    }

    pub fn artist(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::Artist)
    }

    pub fn album(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::Album)
    }

    pub fn album_artist(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::AlbumArtist)
    }

    pub fn genre(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::Genre)
    }

    pub fn track(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::Track)
    }

    pub fn year(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::Year)
    }

    pub fn disc_number(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::DiscNumber)
    }

    pub fn composer(&self) -> Result<TextContent<'_>> {
        self.text_field(Field::Composer)
    }

    pub fn comment(&self) -> Result<CommentContent<'_>> {
        self.find_field(Field::Comment)?.comment_content()
    }

    pub fn album_cover(&self) -> Result<PictureContent<'_>> {
        self.find_field(Field::Picture)?.picture_content()
    }

    fn check_encoding(&self, encoding: Encoding) -> Result<()> {
        if encoding.allowed_in(self.version()) {
            Ok(())
        } else {
            Err(Id3Error::WrongEncoding {
                encoding: encoding as u8,
                version: self.version(),
            })
        }
    }

    /// Store `payload` in the frame for `field`, appending one if needed.
    fn put_payload(&mut self, field: Field, payload: Vec<u8>) -> Result<()> {
        let version = self.version();
        let id = field.frame_id(version);
        match self.find_mut(id) {
            Some(frame) => frame.set_data(payload),
            None => self.frames.push(Frame::with_data(id, version, payload)?),
        }
        Ok(())
    }

    /// Set a well-known text field, replacing any previous value.
    pub fn set_text_field(&mut self, field: Field, text: &str, encoding: Encoding) -> Result<()> {
        match field {
            Field::Comment => return self.set_comment(text, encoding),
            Field::Picture => {
                return Err(Id3Error::Unsupported(
                    "the picture field does not hold text".to_string(),
                ))
            }
            _ => {}
        }
        self.check_encoding(encoding)?;
        self.put_payload(field, frames::text_payload(text, encoding))
    }

    pub fn set_title(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::Title, text, encoding)
    }

    pub fn set_artist(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::Artist, text, encoding)
    }

    pub fn set_album(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::Album, text, encoding)
    }

    pub fn set_album_artist(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::AlbumArtist, text, encoding)
    }

    pub fn set_genre(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::Genre, text, encoding)
    }

    pub fn set_track(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::Track, text, encoding)
    }

    pub fn set_year(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::Year, text, encoding)
    }

    pub fn set_disc_number(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::DiscNumber, text, encoding)
    }

    pub fn set_composer(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.set_text_field(Field::Composer, text, encoding)
    }

    /// Set the comment text. An existing comment keeps its language and
    /// description; a new one is written as English with no description.
    pub fn set_comment(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.check_encoding(encoding)?;
        let version = self.version();
        let id = Field::Comment.frame_id(version);
        match self.find_mut(id) {
            Some(frame) if frame.is_parsed() && frame.comment_content().is_ok() => {
                frame.set_text(text, encoding)
            }
            // undecodable or transformed comments are replaced wholesale
            Some(frame) => {
                frame.set_data(frames::comment_payload(b"eng", "", text, encoding));
                Ok(())
            }
            None => {
                let payload = frames::comment_payload(b"eng", "", text, encoding);
                self.frames.push(Frame::with_data(id, version, payload)?);
                Ok(())
            }
        }
    }

    /// Set the front cover from image bytes, detecting JPEG or PNG.
    pub fn set_album_cover_from_bytes(&mut self, picture: &[u8]) -> Result<()> {
        let mime = specs::mime_type_from_image(picture).ok_or(Id3Error::UnknownMimeType)?;
        self.set_album_cover(mime, picture)
    }

    /// Set the front cover from an image file. The MIME type comes from the
    /// file name.
    pub fn set_album_cover_from_file(&mut self, path: &str) -> Result<()> {
        let mut file = util::open_ro(path)?;
        let mut picture = Vec::new();
        file.read_to_end(&mut picture)?;
        self.set_album_cover(util::mime_type_from_filename(path), &picture)
    }

    fn set_album_cover(&mut self, mime: &str, picture: &[u8]) -> Result<()> {
        let payload =
            frames::picture_payload(self.version(), mime, PictureType::FrontCover, "", picture)?;
        self.put_payload(Field::Picture, payload)
    }

    /// Serialize every frame (header and payload) in order.
    pub fn render_frames(&self) -> Result<Vec<u8>> {
        let version = self.version();
        let total: usize = self
            .frames
            .iter()
            .map(|f| f.size() + frames::frame_header_size(version))
            .sum();

        let mut out = Vec::new();
        out.try_reserve_exact(total)?;

        for frame in &self.frames {
            let size = frame.size();
            let id = frame.id().as_bytes();
            match version {
                2 => {
                    if size > MAX_U24 {
                        return Err(frame_too_large(frame));
                    }
                    out.extend_from_slice(id);
                    out.write_u24::<BigEndian>(size as u32)?;
                }
                3 => {
                    let size = u32::try_from(size).map_err(|_| frame_too_large(frame))?;
                    out.extend_from_slice(id);
                    out.write_u32::<BigEndian>(size)?;
                    out.extend_from_slice(&frame.flags());
                }
                _ => {
                    if size > MAX_SYNCHSAFE as usize {
                        return Err(frame_too_large(frame));
                    }
                    out.extend_from_slice(id);
                    out.extend_from_slice(&BitPaddedInt::encode(size as u32, 4, 7));
                    out.extend_from_slice(&frame.flags());
                }
            }
            out.extend_from_slice(frame.data());
        }

        Ok(out)
    }
}

fn frame_too_large(frame: &Frame) -> Id3Error {
    Id3Error::InvalidData(format!(
        "frame {} is too large ({} bytes)",
        frame.id(),
        frame.size()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id3::header::ID3Flags;

    fn header(major: u8, size: u32) -> ID3Header {
        ID3Header {
            version: (major, 0),
            flags: ID3Flags::default(),
            size,
            extended_size: 0,
            offset: 0,
        }
    }

    fn v23_frame(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(payload);
        out
    }

    fn v22_frame(id: &[u8; 3], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        let len = payload.len() as u32;
        out.extend_from_slice(&len.to_be_bytes()[1..]);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn reads_frames_until_padding() {
        let mut body = v23_frame(b"TIT2", b"\x00Hello");
        body.extend_from_slice(&v23_frame(b"TPE1", b"\x00Artist"));
        body.extend_from_slice(&[0u8; 32]);
        let tag = ID3Tag::from_body(header(3, body.len() as u32), &body).unwrap();
        assert_eq!(tag.len(), 2);
        assert_eq!(tag.title().unwrap().text.bytes, b"Hello");
        assert_eq!(tag.artist().unwrap().to_text().unwrap(), "Artist");
    }

    #[test]
    fn bad_frame_keeps_earlier_frames() {
        let mut body = v23_frame(b"TIT2", b"\x00Hello");
        body.extend_from_slice(b"ti!2garbage-garbage");
        let tag = ID3Tag::from_body(header(3, body.len() as u32), &body).unwrap();
        assert_eq!(tag.len(), 1);
    }

    #[test]
    fn missing_field_is_not_found() {
        let tag = ID3Tag::new(3).unwrap();
        assert!(matches!(tag.title(), Err(Id3Error::NotFound(_))));
        assert!(matches!(tag.album_cover(), Err(Id3Error::NotFound(_))));
    }

    #[test]
    fn v22_lookup_truncates_key() {
        let body = v22_frame(b"TT2", b"\x00Old");
        let tag = ID3Tag::from_body(header(2, body.len() as u32), &body).unwrap();
        assert_eq!(tag.find("TT2X").map(|f| f.id()), Some("TT2"));
        assert_eq!(tag.find("TT2").map(|f| f.id()), Some("TT2"));
        assert_eq!(tag.title().unwrap().text.bytes, b"Old");
    }

    #[test]
    fn first_match_wins() {
        let mut body = v23_frame(b"TIT2", b"\x00one");
        body.extend_from_slice(&v23_frame(b"TIT2", b"\x00two"));
        let tag = ID3Tag::from_body(header(3, body.len() as u32), &body).unwrap();
        assert_eq!(tag.title().unwrap().text.bytes, b"one");
    }

    #[test]
    fn whole_tag_unsynchronisation_v23() {
        let body = unsynch::encode(&v23_frame(b"TIT2", &[0x00, 0xFF, 0xE0]));
        let mut h = header(3, body.len() as u32);
        h.flags.unsynchronisation = true;
        let tag = ID3Tag::from_body(h, &body).unwrap();
        assert_eq!(tag.title().unwrap().text.bytes, &[0xFF, 0xE0]);
    }

    #[test]
    fn extended_header_skipped() {
        let mut body = vec![0, 0, 0, 6, 0, 0, 0, 0, 0, 0];
        body.extend_from_slice(&v23_frame(b"TALB", b"\x00LP"));
        let mut h = header(3, body.len() as u32);
        h.flags.extended = true;
        h.extended_size = 6;
        let tag = ID3Tag::from_body(h, &body).unwrap();
        assert_eq!(tag.album().unwrap().text.bytes, b"LP");
    }

    #[test]
    fn extended_header_size_read_after_desync() {
        let mut plain = vec![0, 0, 0, 6, 0xFF, 0x00, 0xFF, 0xE0, 0, 0];
        plain.extend_from_slice(&v23_frame(b"TALB", b"\x00LP"));
        let body = unsynch::encode(&plain);
        assert!(body.len() > plain.len());

        let mut h = header(3, body.len() as u32);
        h.flags.unsynchronisation = true;
        h.flags.extended = true;
        h.extended_size = 99;
        let tag = ID3Tag::from_body(h, &body).unwrap();
        assert_eq!(tag.header.extended_size, 6);
        assert_eq!(tag.len(), 1);
        assert_eq!(tag.album().unwrap().text.bytes, b"LP");
    }

    #[test]
    fn set_title_updates_existing_frame() {
        let body = v23_frame(b"TIT2", b"\x00Hello");
        let mut tag = ID3Tag::from_body(header(3, body.len() as u32), &body).unwrap();
        tag.set_title("World", Encoding::Latin1).unwrap();
        assert_eq!(tag.len(), 1);
        let title = tag.title().unwrap();
        assert_eq!(title.encoding, Encoding::Latin1);
        assert_eq!(title.text.bytes, b"World");
    }

    #[test]
    fn setters_append_version_specific_ids() {
        let mut tag = ID3Tag::new(2).unwrap();
        tag.set_title("t", Encoding::Latin1).unwrap();
        tag.set_year("1999", Encoding::Latin1).unwrap();
        let ids: Vec<&str> = tag.frames().iter().map(|f| f.id()).collect();
        assert_eq!(ids, ["TT2", "TYE"]);

        let mut tag = ID3Tag::new(4).unwrap();
        tag.set_composer("c", Encoding::Utf8).unwrap();
        tag.set_disc_number("1/2", Encoding::Latin1).unwrap();
        let ids: Vec<&str> = tag.frames().iter().map(|f| f.id()).collect();
        assert_eq!(ids, ["TCOM", "TPOS"]);
    }

    #[test]
    fn setter_rejects_encoding_for_version() {
        let mut tag = ID3Tag::new(3).unwrap();
        assert!(matches!(
            tag.set_genre("Rock", Encoding::Utf8),
            Err(Id3Error::WrongEncoding { encoding: 3, version: 3 })
        ));
        assert!(tag.is_empty());
        assert!(matches!(
            tag.set_text_field(Field::Picture, "x", Encoding::Latin1),
            Err(Id3Error::Unsupported(_))
        ));
    }

    #[test]
    fn set_comment_replaces_undecodable_comment() {
        for payload in [&b""[..], &b"\x07engdesc\x00text"[..]] {
            let body = v23_frame(b"COMM", payload);
            let mut tag = ID3Tag::from_body(header(3, body.len() as u32), &body).unwrap();
            assert!(tag.comment().is_err());

            tag.set_comment("hello", Encoding::Latin1).unwrap();
            assert_eq!(tag.len(), 1);
            let c = tag.comment().unwrap();
            assert_eq!(&c.language, b"eng");
            assert_eq!(c.text.decode().unwrap(), "hello");
        }
    }

    #[test]
    fn comment_set_and_get() {
        let mut tag = ID3Tag::new(3).unwrap();
        tag.set_comment("nice", Encoding::Latin1).unwrap();
        let c = tag.comment().unwrap();
        assert_eq!(&c.language, b"eng");
        assert!(c.description.bytes.is_empty());
        assert_eq!(c.text.bytes, b"nice");

        tag.find_mut("COMM").unwrap().set_description("d").unwrap();
        tag.set_comment("again", Encoding::Utf16).unwrap();
        let c = tag.comment().unwrap();
        assert_eq!(c.description.decode().unwrap(), "d");
        assert_eq!(c.text.decode().unwrap(), "again");
    }

    #[test]
    fn album_cover_from_bytes() {
        let png = b"\x89PNG\r\n\x1a\nrest";
        let mut tag = ID3Tag::new(3).unwrap();
        tag.set_album_cover_from_bytes(png).unwrap();
        let p = tag.album_cover().unwrap();
        assert_eq!(p.mime_type, "image/png");
        assert_eq!(p.kind(), Some(PictureType::FrontCover));
        assert_eq!(p.data, png);

        assert!(matches!(
            tag.set_album_cover_from_bytes(b"BM bitmap"),
            Err(Id3Error::UnknownMimeType)
        ));
        assert_eq!(tag.album_cover().unwrap().data, png);
    }

    #[test]
    fn album_cover_v22_uses_format_code() {
        let jpeg = [0xFF, 0xD8, 0x00, 0xFF, 0xD9];
        let mut tag = ID3Tag::new(2).unwrap();
        tag.set_album_cover_from_bytes(&jpeg).unwrap();
        let frame = tag.find("PIC").unwrap();
        assert_eq!(frame.id(), "PIC");
        assert_eq!(&frame.data()[1..4], b"JPG");
        assert_eq!(tag.album_cover().unwrap().mime_type, "image/jpeg");
    }

    #[test]
    fn add_frame_checks_version_family() {
        let mut v3 = ID3Tag::new(3).unwrap();
        let v22_frame = Frame::new("TT2", 2).unwrap();
        assert!(matches!(
            v3.add_frame(v22_frame.clone()),
            Err(Id3Error::IncompatibleTag { frame: 2, tag: 3 })
        ));
        v3.add_frame(Frame::new("TIT2", 4).unwrap()).unwrap();

        let mut v2 = ID3Tag::new(2).unwrap();
        v2.add_frame(v22_frame).unwrap();
        assert!(v2.add_frame(Frame::new("TIT2", 3).unwrap()).is_err());
    }

    #[test]
    fn remove_frames() {
        let mut tag = ID3Tag::new(3).unwrap();
        tag.set_title("a", Encoding::Latin1).unwrap();
        tag.add_frame(Frame::with_data("TIT2", 3, b"\x00b".to_vec()).unwrap()).unwrap();
        tag.set_artist("c", Encoding::Latin1).unwrap();
        assert_eq!(tag.remove("TIT2"), 2);
        assert_eq!(tag.len(), 1);
    }

    #[test]
    fn render_frames_per_version() {
        let mut tag = ID3Tag::new(2).unwrap();
        tag.set_title("ab", Encoding::Latin1).unwrap();
        assert_eq!(tag.render_frames().unwrap(), b"TT2\x00\x00\x03\x00ab");

        let mut tag = ID3Tag::new(3).unwrap();
        tag.set_title("ab", Encoding::Latin1).unwrap();
        assert_eq!(tag.render_frames().unwrap(), v23_frame(b"TIT2", b"\x00ab"));

        let mut tag = ID3Tag::new(4).unwrap();
        tag.add_frame(Frame::with_data("TXXX", 4, vec![0u8; 200]).unwrap()).unwrap();
        let out = tag.render_frames().unwrap();
        assert_eq!(&out[4..8], &[0x00, 0x00, 0x01, 0x48]);
        assert_eq!(out.len(), 210);
    }

    #[test]
    fn render_then_read_keeps_payloads() {
        let mut body = v23_frame(b"TIT2", b"\x00Hello");
        body.extend_from_slice(&v23_frame(b"COMM", b"\x00engdesc\x00text"));
        body.extend_from_slice(&v23_frame(b"XTST", b"opaque"));
        let tag = ID3Tag::from_body(header(3, body.len() as u32), &body).unwrap();
        assert_eq!(tag.render_frames().unwrap(), body);
    }
}
