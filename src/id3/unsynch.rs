//! Unsynchronisation: the byte stuffing ID3v2 uses so that tag data never
//! contains an MPEG frame sync (`0xFF` followed by a byte `>= 0xE0`).

use memchr::memchr;

use crate::common::error::Result;

/// Remove unsynchronisation from `data`.
///
/// Every `0x00` that directly follows a `0xFF` is dropped, so `FF 00 E0`
/// becomes `FF E0` and `FF 00 00` collapses to `FF 00`. Nothing else is
/// touched; the output is never longer than the input.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    output.try_reserve_exact(data.len())?;

    let mut rest = data;
    while let Some(pos) = memchr(0xFF, rest) {
        output.extend_from_slice(&rest[..=pos]);
        rest = &rest[pos + 1..];
        if rest.first() == Some(&0x00) {
            rest = &rest[1..];
        }
    }
    output.extend_from_slice(rest);

    output.shrink_to_fit();
    Ok(output)
}

/// Apply unsynchronisation to `data`.
///
/// A `0x00` is inserted after every `0xFF` that is followed by a byte with
/// the top three bits set, by `0x00`, or by the end of the data.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + data.len() / 10);
    for (i, &b) in data.iter().enumerate() {
        output.push(b);
        if b == 0xFF {
            match data.get(i + 1) {
                Some(&next) if next < 0xE0 && next != 0x00 => {}
                _ => output.push(0x00),
            }
        }
    }
    output
}
