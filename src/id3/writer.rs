use std::io::Read;

use crate::common::error::{Id3Error, Result};
use crate::common::util;
use crate::id3::header::{ID3Flags, ID3Header, HEADER_SIZE};
use crate::id3::options::WriteOptions;
use crate::id3::tags::{ID3Tag, MAX_SYNCHSAFE};

/// Build a complete tag: header, frames, then zero padding.
///
/// The header carries the tag's own major version with revision 0 and no
/// flags set; frames are written without unsynchronisation.
pub fn render_tag(tag: &ID3Tag, options: &WriteOptions) -> Result<Vec<u8>> {
    let frame_data = tag.render_frames()?;
    let padding = options.padding as usize;
    let total_size = frame_data.len() + padding;

    if total_size > MAX_SYNCHSAFE as usize {
        return Err(Id3Error::InvalidData(format!(
            "tag body of {} bytes does not fit a synchsafe size",
            total_size
        )));
    }

    let header = ID3Header {
        version: (tag.version(), 0),
        flags: ID3Flags::default(),
        size: total_size as u32,
        extended_size: 0,
        offset: 0,
    };

    let mut out = Vec::new();
    out.try_reserve_exact(HEADER_SIZE + total_size)?;
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&frame_data);
    out.resize(HEADER_SIZE + total_size, 0);

    Ok(out)
}

/// Put a freshly rendered tag in front of `original`, replacing the tag it
/// starts with (if any). Everything after the old tag is kept unchanged.
pub fn splice_tag(tag: &ID3Tag, original: &[u8], options: &WriteOptions) -> Result<Vec<u8>> {
    let old_size = match ID3Header::parse(original, 0) {
        Ok(h) => (h.full_size() as usize).min(original.len()),
        Err(_) => 0,
    };
    let audio = &original[old_size..];

    let new_tag = render_tag(tag, options)?;
    log::debug!(
        "replacing {} byte tag with {} bytes, keeping {} bytes of audio",
        old_size,
        new_tag.len(),
        audio.len()
    );

    let mut out = new_tag;
    out.try_reserve_exact(audio.len())?;
    out.extend_from_slice(audio);
    Ok(out)
}

/// Write `tag` to the file at `path`, replacing any tag at its start.
pub fn save_tag(path: &str, tag: &ID3Tag, options: &WriteOptions) -> Result<()> {
    let mut file = util::open_ro(path)?;
    let mut existing = Vec::new();
    file.read_to_end(&mut existing)?;
    drop(file);

    let contents = splice_tag(tag, &existing, options)?;
    util::replace_file(path, &contents)
}
