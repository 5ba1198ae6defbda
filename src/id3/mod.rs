pub mod header;
pub mod unsynch;
pub mod specs;
pub mod frames;
pub mod tags;
pub mod options;
pub mod writer;

use rayon::prelude::*;

use crate::common::error::{Id3Error, Result};
use crate::common::util;
use crate::id3::header::{ID3Header, HEADER_SIZE};

pub use crate::id3::header::scan_for_tags;
pub use crate::id3::options::WriteOptions;
pub use crate::id3::tags::ID3Tag;
pub use crate::id3::writer::{render_tag, save_tag, splice_tag};

/// Parse a header, mapping "this is not a tag we can read" to `None`.
fn header_or_none(data: &[u8], offset: u64) -> Result<Option<ID3Header>> {
    match ID3Header::parse(data, offset) {
        Ok(h) => Ok(Some(h)),
        Err(Id3Error::NoHeader) => Ok(None),
        Err(Id3Error::UnsupportedVersion(v)) => {
            log::debug!("skipping tag with unsupported version {}", v);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Load the ID3v2 tag at the start of a file.
///
/// Only the header and the bytes it declares are read. Returns `None` when
/// the file does not start with a readable tag.
pub fn load_tag(path: &str) -> Result<Option<ID3Tag>> {
    let mut file = util::open_ro(path)?;

    let header_buf = util::read_up_to(&mut file, HEADER_SIZE)?;
    let header = match header_or_none(&header_buf, 0)? {
        Some(h) => h,
        None => return Ok(None),
    };

    let body = util::read_up_to(&mut file, header.size as usize)?;
    if body.len() < header.size as usize {
        return Err(Id3Error::InsufficientData {
            needed: HEADER_SIZE + header.size as usize,
            available: HEADER_SIZE + body.len(),
        });
    }

    ID3Tag::from_body(header, &body).map(Some)
}

/// Load the ID3v2 tag at the start of `data`.
pub fn load_tag_from_buffer(data: &[u8]) -> Result<Option<ID3Tag>> {
    load_tag_from_buffer_at(data, 0)
}

/// Load the ID3v2 tag starting `offset` bytes into `data`, as reported by
/// [`scan_for_tags`].
pub fn load_tag_from_buffer_at(data: &[u8], offset: u64) -> Result<Option<ID3Tag>> {
    let data = match usize::try_from(offset).ok().and_then(|o| data.get(o..)) {
        Some(d) => d,
        None => return Ok(None),
    };

    let header = match header_or_none(data, offset)? {
        Some(h) => h,
        None => return Ok(None),
    };

    let end = HEADER_SIZE + header.size as usize;
    if data.len() < end {
        return Err(Id3Error::InsufficientData {
            needed: end,
            available: data.len(),
        });
    }

    ID3Tag::from_body(header, &data[HEADER_SIZE..end]).map(Some)
}

/// Offsets of every ID3v2 tag in a file.
pub fn scan_file_for_tags(path: &str) -> Result<Vec<u64>> {
    let map = util::map_file(path)?;
    Ok(scan_for_tags(&map))
}

/// Load the tags of many files in parallel. Results keep the input order.
pub fn load_tags<S>(paths: &[S]) -> Vec<Result<Option<ID3Tag>>>
where
    S: AsRef<str> + Sync,
{
    paths.par_iter().map(|p| load_tag(p.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id3::header::BitPaddedInt;

    fn tag_bytes(major: u8, flags: u8, body: &[u8]) -> Vec<u8> {
        let mut out = b"ID3".to_vec();
        out.extend_from_slice(&[major, 0, flags]);
        out.extend_from_slice(&BitPaddedInt::encode(body.len() as u32, 4, 7));
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn buffer_without_tag() {
        assert!(load_tag_from_buffer(b"RIFF....WAVE").unwrap().is_none());
        assert!(load_tag_from_buffer(b"ID3").unwrap().is_none());
        assert!(load_tag_from_buffer(&tag_bytes(3, 0x01, b"")).unwrap().is_none());
        assert!(load_tag_from_buffer(&tag_bytes(5, 0, b"")).unwrap().is_none());
    }

    #[test]
    fn buffer_shorter_than_declared() {
        let mut data = tag_bytes(3, 0, &[0u8; 40]);
        data.truncate(30);
        match load_tag_from_buffer(&data) {
            Err(Id3Error::InsufficientData { needed, available }) => {
                assert_eq!(needed, 50);
                assert_eq!(available, 30);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn buffer_at_offset() {
        let mut data = b"junk".to_vec();
        data.extend_from_slice(&tag_bytes(4, 0, b"TIT2\x00\x00\x00\x03\x00\x00\x00hi"));
        let offsets = scan_for_tags(&data);
        assert_eq!(offsets, vec![4]);
        let tag = load_tag_from_buffer_at(&data, offsets[0]).unwrap().unwrap();
        assert_eq!(tag.header.offset, 4);
        assert_eq!(tag.title().unwrap().text.bytes, b"hi");

        assert!(load_tag_from_buffer_at(&data, 1000).unwrap().is_none());
    }
}
