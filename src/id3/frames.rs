use std::borrow::Cow;
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder};

use crate::common::error::{Id3Error, Result};
use crate::id3::header::BitPaddedInt;
use crate::id3::specs::{self, Encoding, PictureType};
use crate::id3::unsynch;

/// Frame header length in ID3v2.2 (3-byte ID, 3-byte size).
pub const FRAME_HEADER_V22: usize = 6;
/// Frame header length in ID3v2.3/2.4 (4-byte ID, 4-byte size, 2 flag bytes).
pub const FRAME_HEADER: usize = 10;

// Second flag byte, ID3v2.3: %ijk00000
const V23_COMPRESSION: u8 = 0x80;
const V23_ENCRYPTION: u8 = 0x40;
const V23_GROUPING: u8 = 0x20;

// Second flag byte, ID3v2.4: %0h00kmnp
const V24_GROUPING: u8 = 0x40;
const V24_COMPRESSION: u8 = 0x08;
const V24_ENCRYPTION: u8 = 0x04;
const V24_UNSYNCHRONISED: u8 = 0x02;
const V24_DATA_LENGTH: u8 = 0x01;

const LANGUAGE_LEN: usize = 3;

/// Bytes of frame header preceding the payload for a tag version.
pub fn frame_header_size(version: u8) -> usize {
    if version == 2 {
        FRAME_HEADER_V22
    } else {
        FRAME_HEADER
    }
}

fn id_len(version: u8) -> usize {
    if version == 2 {
        3
    } else {
        4
    }
}

/// Flag bits marking a frame transform this library cannot undo.
fn unknown_transform_mask(version: u8) -> u8 {
    match version {
        3 => V23_COMPRESSION | V23_ENCRYPTION | V23_GROUPING,
        4 => V24_GROUPING | V24_COMPRESSION | V24_ENCRYPTION,
        _ => 0,
    }
}

/// Frame IDs are letters followed by a final letter or digit.
pub fn is_valid_frame_id(id: &[u8]) -> bool {
    match id.split_last() {
        Some((last, head)) => {
            last.is_ascii_alphanumeric() && head.iter().all(|b| b.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Content layout family of a frame, derived from its ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Comment,
    Picture,
    Experimental,
    Invalid,
}

impl FrameKind {
    pub fn classify(id: &str) -> Self {
        // v2.2 calls the picture frame PIC, which breaks the first-letter rule
        if id == "PIC" {
            return FrameKind::Picture;
        }
        match id.as_bytes().first() {
            Some(b'T') => FrameKind::Text,
            Some(b'C') => FrameKind::Comment,
            Some(b'A') => FrameKind::Picture,
            Some(b'X') | Some(b'Y') | Some(b'Z') => FrameKind::Experimental,
            _ => FrameKind::Invalid,
        }
    }
}

/// One frame of a tag: its ID, flags and owned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: String,
    flags: [u8; 2],
    version: u8,
    data: Vec<u8>,
    parsed: bool,
}

/// A run of encoded text inside a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRun<'a> {
    /// Encoding the bytes are actually in (see [`specs::effective_encoding`]).
    pub encoding: Encoding,
    pub bytes: &'a [u8],
}

impl<'a> TextRun<'a> {
    fn new(nominal: Encoding, bytes: &'a [u8]) -> Self {
        TextRun {
            encoding: specs::effective_encoding(nominal, bytes),
            bytes,
        }
    }

    /// Decode to a string, dropping trailing terminators.
    pub fn decode(&self) -> Result<String> {
        let text = specs::decode_text(self.bytes, self.encoding)?;
        Ok(text.trim_end_matches('\0').to_string())
    }
}

/// View of a text frame (`T***`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextContent<'a> {
    /// Encoding byte as stored in the frame.
    pub encoding: Encoding,
    pub text: TextRun<'a>,
}

impl TextContent<'_> {
    pub fn to_text(&self) -> Result<String> {
        self.text.decode()
    }
}

/// View of a comment frame (`COMM`/`COM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentContent<'a> {
    pub encoding: Encoding,
    /// ISO-639-2 code as stored; not validated.
    pub language: [u8; 3],
    pub description: TextRun<'a>,
    pub text: TextRun<'a>,
}

impl CommentContent<'_> {
    pub fn language_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.language)
    }
}

/// View of an attached picture frame (`APIC`/`PIC`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureContent<'a> {
    pub encoding: Encoding,
    /// Borrowed from the payload in v2.3/2.4, expanded from the image
    /// format code in v2.2.
    pub mime_type: Cow<'a, str>,
    pub picture_type: u8,
    pub description: TextRun<'a>,
    pub data: &'a [u8],
}

impl PictureContent<'_> {
    pub fn kind(&self) -> Option<PictureType> {
        PictureType::from_byte(self.picture_type)
    }
}

/// Byte ranges of a comment payload.
struct CommentLayout {
    description: Range<usize>,
    text_start: usize,
}

/// Byte ranges of a picture payload.
struct PictureLayout {
    mime: Range<usize>,
    picture_type: usize,
    description: Range<usize>,
    /// First byte after the description terminator.
    data_start: usize,
}

impl Frame {
    /// Create an empty frame with the given ID for a tag of `version`.
    pub fn new(id: &str, version: u8) -> Result<Self> {
        if !(2..=4).contains(&version) {
            return Err(Id3Error::UnsupportedVersion(format!("ID3v2.{}", version)));
        }
        if id.len() != id_len(version) || !is_valid_frame_id(id.as_bytes()) {
            return Err(Id3Error::InvalidData(format!(
                "'{}' is not a valid ID3v2.{} frame ID",
                id, version
            )));
        }
        Ok(Frame {
            id: id.to_string(),
            flags: [0; 2],
            version,
            data: Vec::new(),
            parsed: true,
        })
    }

    /// Create a frame holding `data` as its payload.
    pub fn with_data(id: &str, version: u8, data: Vec<u8>) -> Result<Self> {
        let mut frame = Frame::new(id, version)?;
        frame.data = data;
        Ok(frame)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn flags(&self) -> [u8; 2] {
        self.flags
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// False for frames whose payload uses a transform (compression,
    /// encryption, grouping) that is not decoded. Such frames keep their
    /// raw bytes and flags and are written back unchanged.
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::classify(&self.id)
    }

    /// Read one frame from the start of `data`.
    ///
    /// Returns `None` at the end of the frame sequence: padding, an invalid
    /// ID, or a frame running past the available bytes. Otherwise returns the
    /// frame and the number of bytes it occupied. `unsynchronised` requests
    /// removal of unsynchronisation from the payload; v2.4 frames also honour
    /// their own flag.
    pub fn parse(data: &[u8], version: u8, unsynchronised: bool) -> Result<Option<(Frame, usize)>> {
        let header_len = frame_header_size(version);
        if data.len() < header_len {
            return Ok(None);
        }

        let id_len = id_len(version);
        let id_bytes = &data[..id_len];
        if id_bytes.iter().all(|&b| b == 0) {
            log::debug!("reached padding");
            return Ok(None);
        }
        if !is_valid_frame_id(id_bytes) {
            log::warn!("invalid frame ID {:02x?}, stopping frame scan", id_bytes);
            return Ok(None);
        }
        let id: String = id_bytes.iter().map(|&b| b as char).collect();

        let size_field = &data[id_len..id_len * 2];
        let size = match version {
            2 => BigEndian::read_u24(size_field),
            3 => BigEndian::read_u32(size_field),
            _ => BitPaddedInt::syncsafe(size_field),
        } as usize;

        let end = header_len + size;
        if end > data.len() {
            log::warn!(
                "frame {} declares {} bytes but only {} remain",
                id,
                size,
                data.len() - header_len
            );
            return Ok(None);
        }
        let raw = &data[header_len..end];

        let mut flags = [0u8; 2];
        if version != 2 {
            flags.copy_from_slice(&data[8..10]);
        }

        let transformed = flags[1] & unknown_transform_mask(version) != 0;
        let short_length_prefix =
            version == 4 && flags[1] & V24_DATA_LENGTH != 0 && raw.len() < 4;
        if transformed || short_length_prefix {
            log::debug!("frame {} has flags {:02x?}, keeping it undecoded", id, flags);
            // tag-level unsynchronisation still applies to the kept bytes
            if unsynchronised && version == 4 {
                flags[1] |= V24_UNSYNCHRONISED;
            }
            return Ok(Some((
                Frame {
                    id,
                    flags,
                    version,
                    data: copy_payload(raw)?,
                    parsed: false,
                },
                end,
            )));
        }

        let mut body = raw;
        if version == 4 && flags[1] & V24_DATA_LENGTH != 0 {
            body = &body[4..];
        }
        let desync = unsynchronised || (version == 4 && flags[1] & V24_UNSYNCHRONISED != 0);
        let payload = if desync {
            unsynch::decode(body)?
        } else {
            copy_payload(body)?
        };

        // The payload is stored plain, so the flags describing its
        // on-disk form no longer apply.
        flags[1] &= !(V24_UNSYNCHRONISED | V24_DATA_LENGTH);

        Ok(Some((
            Frame {
                id,
                flags,
                version,
                data: payload,
                parsed: true,
            },
            end,
        )))
    }

    /// Replace the whole payload. The frame counts as parsed afterwards and
    /// any transform flags are cleared.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.parsed = true;
        if self.version != 2 {
            self.flags[1] = 0;
        }
    }

    fn require(&self, kind: FrameKind) -> Result<()> {
        if !self.parsed {
            return Err(Id3Error::Unsupported(format!(
                "frame {} uses an unsupported transform",
                self.id
            )));
        }
        if self.kind() != kind {
            return Err(Id3Error::Unsupported(format!(
                "frame {} is not a {:?} frame",
                self.id, kind
            )));
        }
        Ok(())
    }

    fn encoding(&self) -> Result<Encoding> {
        let b = *self.data.first().ok_or_else(|| {
            Id3Error::InvalidData(format!("frame {} has an empty payload", self.id))
        })?;
        Encoding::from_byte(b).ok_or(Id3Error::WrongEncoding {
            encoding: b,
            version: self.version,
        })
    }

    /// Decode the text of a text frame.
    pub fn text_content(&self) -> Result<TextContent<'_>> {
        self.require(FrameKind::Text)?;
        let encoding = self.encoding()?;
        Ok(TextContent {
            encoding,
            text: TextRun::new(encoding, &self.data[1..]),
        })
    }

    fn comment_layout(&self, encoding: Encoding) -> Result<CommentLayout> {
        let start = 1 + LANGUAGE_LEN;
        if self.data.len() < start {
            return Err(Id3Error::InvalidData(format!(
                "comment frame {} is too short",
                self.id
            )));
        }
        let rest = &self.data[start..];
        let desc_encoding = specs::effective_encoding(encoding, rest);
        Ok(match specs::split_terminated(rest, desc_encoding) {
            Some((desc, used)) => CommentLayout {
                description: start..start + desc.len(),
                text_start: start + used,
            },
            None => CommentLayout {
                description: start..self.data.len(),
                text_start: self.data.len(),
            },
        })
    }

    /// Decode language, short description and text of a comment frame.
    pub fn comment_content(&self) -> Result<CommentContent<'_>> {
        self.require(FrameKind::Comment)?;
        let encoding = self.encoding()?;
        let layout = self.comment_layout(encoding)?;

        let mut language = [0u8; 3];
        language.copy_from_slice(&self.data[1..1 + LANGUAGE_LEN]);

        Ok(CommentContent {
            encoding,
            language,
            description: TextRun::new(encoding, &self.data[layout.description]),
            text: TextRun::new(encoding, &self.data[layout.text_start..]),
        })
    }

    fn picture_layout(&self, encoding: Encoding) -> Result<PictureLayout> {
        let truncated =
            || Id3Error::InvalidData(format!("picture frame {} is truncated", self.id));

        let mut pos = 1;
        let mime = if self.version == 2 {
            if self.data.len() < pos + 3 {
                return Err(truncated());
            }
            pos += 3;
            1..4
        } else {
            let (mime, used) =
                specs::split_terminated(&self.data[pos..], Encoding::Latin1).ok_or_else(truncated)?;
            let range = pos..pos + mime.len();
            pos += used;
            range
        };

        if pos >= self.data.len() {
            return Err(truncated());
        }
        let picture_type = pos;
        pos += 1;

        let rest = &self.data[pos..];
        let desc_encoding = specs::effective_encoding(encoding, rest);
        let (desc, used) = specs::split_terminated(rest, desc_encoding).ok_or_else(truncated)?;

        Ok(PictureLayout {
            mime,
            picture_type,
            description: pos..pos + desc.len(),
            data_start: pos + used,
        })
    }

    /// Decode MIME type, picture type, description and image bytes of a
    /// picture frame.
    pub fn picture_content(&self) -> Result<PictureContent<'_>> {
        self.require(FrameKind::Picture)?;
        let encoding = self.encoding()?;
        let layout = self.picture_layout(encoding)?;

        let raw_mime = &self.data[layout.mime];
        let mime_type = if self.version == 2 {
            Cow::Borrowed(specs::mime_type_from_image_format(raw_mime))
        } else {
            String::from_utf8_lossy(raw_mime)
        };

        Ok(PictureContent {
            encoding,
            mime_type,
            picture_type: self.data[layout.picture_type],
            description: TextRun::new(encoding, &self.data[layout.description]),
            data: &self.data[layout.data_start..],
        })
    }

    fn check_encoding(&self, encoding: Encoding) -> Result<()> {
        if encoding.allowed_in(self.version) {
            Ok(())
        } else {
            Err(Id3Error::WrongEncoding {
                encoding: encoding as u8,
                version: self.version,
            })
        }
    }

    /// Set the text of a text or comment frame.
    ///
    /// Comment frames keep their language; the short description is
    /// re-encoded into `encoding`.
    pub fn set_text(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        self.check_encoding(encoding)?;
        match self.kind() {
            FrameKind::Text => {
                self.set_data(text_payload(text, encoding));
                Ok(())
            }
            FrameKind::Comment => {
                self.require(FrameKind::Comment)?;
                let old_encoding = self.encoding()?;
                let layout = self.comment_layout(old_encoding)?;
                let old_desc = &self.data[layout.description];
                let desc = specs::transcode(
                    old_desc,
                    specs::effective_encoding(old_encoding, old_desc),
                    encoding,
                )?;

                let mut payload = Vec::with_capacity(8 + desc.len() + text.len() * 2);
                payload.push(encoding as u8);
                payload.extend_from_slice(&self.data[1..1 + LANGUAGE_LEN]);
                payload.extend_from_slice(&desc);
                push_terminator(&mut payload, encoding);
                payload.extend_from_slice(&specs::encode_text(text, encoding));
                self.set_data(payload);
                Ok(())
            }
            _ => Err(Id3Error::Unsupported(format!(
                "cannot set text on frame {}",
                self.id
            ))),
        }
    }

    /// Replace the short description of a comment or picture frame,
    /// keeping the frame's encoding.
    pub fn set_description(&mut self, description: &str) -> Result<()> {
        let kind = self.kind();
        if kind != FrameKind::Comment && kind != FrameKind::Picture {
            return Err(Id3Error::Unsupported(format!(
                "frame {} has no description",
                self.id
            )));
        }
        self.require(kind)?;
        let encoding = self.encoding()?;
        let (range, after) = if kind == FrameKind::Comment {
            let layout = self.comment_layout(encoding)?;
            (layout.description, layout.text_start)
        } else {
            let layout = self.picture_layout(encoding)?;
            (layout.description, layout.data_start)
        };

        let mut payload = Vec::with_capacity(self.data.len() + description.len() * 2);
        payload.extend_from_slice(&self.data[..range.start]);
        payload.extend_from_slice(&specs::encode_text(description, encoding));
        push_terminator(&mut payload, encoding);
        payload.extend_from_slice(&self.data[after..]);
        self.set_data(payload);
        Ok(())
    }

    /// Set the language code of a comment frame.
    pub fn set_language(&mut self, language: &[u8; 3]) -> Result<()> {
        self.require(FrameKind::Comment)?;
        if self.data.len() < 1 + LANGUAGE_LEN {
            return Err(Id3Error::InvalidData(format!(
                "comment frame {} is too short",
                self.id
            )));
        }
        self.data[1..1 + LANGUAGE_LEN].copy_from_slice(language);
        Ok(())
    }

    /// Set the picture type byte of a picture frame.
    pub fn set_picture_type(&mut self, picture_type: PictureType) -> Result<()> {
        self.require(FrameKind::Picture)?;
        let layout = self.picture_layout(self.encoding()?)?;
        self.data[layout.picture_type] = picture_type as u8;
        Ok(())
    }

    /// Replace the image of a picture frame.
    ///
    /// The MIME type is detected from the image bytes; encoding, picture
    /// type and description are kept. Images that are neither JPEG nor PNG
    /// are rejected without touching the frame.
    pub fn set_picture(&mut self, picture: &[u8]) -> Result<()> {
        self.require(FrameKind::Picture)?;
        let mime = specs::mime_type_from_image(picture).ok_or(Id3Error::UnknownMimeType)?;
        let layout = self.picture_layout(self.encoding()?)?;

        let mut payload = Vec::new();
        payload.try_reserve_exact(layout.data_start + mime.len() + picture.len())?;
        payload.push(self.data[0]);
        push_mime(&mut payload, self.version, mime);
        payload.extend_from_slice(&self.data[layout.picture_type..layout.data_start]);
        payload.extend_from_slice(picture);
        self.set_data(payload);
        Ok(())
    }
}

fn copy_payload(raw: &[u8]) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.try_reserve_exact(raw.len())?;
    payload.extend_from_slice(raw);
    Ok(payload)
}

fn push_terminator(out: &mut Vec<u8>, encoding: Encoding) {
    out.extend(std::iter::repeat(0u8).take(specs::null_terminator_size(encoding)));
}

fn push_mime(out: &mut Vec<u8>, version: u8, mime: &str) {
    if version == 2 {
        out.extend_from_slice(specs::image_format_from_mime_type(mime));
    } else {
        out.extend_from_slice(mime.as_bytes());
        out.push(0);
    }
}

/// Payload of a text frame: encoding byte followed by the encoded text.
pub fn text_payload(text: &str, encoding: Encoding) -> Vec<u8> {
    let encoded = specs::encode_text(text, encoding);
    let mut payload = Vec::with_capacity(1 + encoded.len());
    payload.push(encoding as u8);
    payload.extend_from_slice(&encoded);
    payload
}

/// Payload of a comment frame.
pub fn comment_payload(language: &[u8; 3], description: &str, text: &str, encoding: Encoding) -> Vec<u8> {
    let mut payload = vec![encoding as u8];
    payload.extend_from_slice(language);
    payload.extend_from_slice(&specs::encode_text(description, encoding));
    push_terminator(&mut payload, encoding);
    payload.extend_from_slice(&specs::encode_text(text, encoding));
    payload
}

/// Payload of a picture frame for a tag of `version`, with a Latin-1
/// description.
pub fn picture_payload(
    version: u8,
    mime: &str,
    picture_type: PictureType,
    description: &str,
    picture: &[u8],
) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.try_reserve_exact(mime.len() + description.len() + picture.len() + 4)?;
    payload.push(Encoding::Latin1 as u8);
    push_mime(&mut payload, version, mime);
    payload.push(picture_type as u8);
    payload.extend_from_slice(&specs::encode_text(description, Encoding::Latin1));
    payload.push(0);
    payload.extend_from_slice(picture);
    Ok(payload)
}
