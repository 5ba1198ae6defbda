use memchr::memmem;

use crate::common::error::{Id3Error, Result};

/// Size of the fixed tag header (and of the optional v2.4 footer).
pub const HEADER_SIZE: usize = 10;

/// Flag bits with no defined meaning. A header carrying any of them cannot
/// be decoded reliably.
const RESERVED_FLAGS: u8 = 0x0F;

/// Syncsafe integer encoding used in ID3v2 tags.
/// Each byte uses only 7 bits (MSB is always 0).
pub struct BitPaddedInt;

impl BitPaddedInt {
    /// Decode an integer from bytes, most significant byte first.
    /// `bits` is the number of significant bits per byte (7 for syncsafe, 8 for normal).
    pub fn decode(data: &[u8], bits: u8) -> u32 {
        let mut result: u32 = 0;
        let mask = (1u32 << bits) - 1;
        for &b in data {
            result = (result << bits) | (b as u32 & mask);
        }
        result
    }

    /// Decode standard syncsafe (7 bits per byte).
    pub fn syncsafe(data: &[u8]) -> u32 {
        Self::decode(data, 7)
    }

    /// Encode an integer into `width` bytes of `bits` significant bits each.
    pub fn encode(value: u32, width: usize, bits: u8) -> Vec<u8> {
        let mut result = vec![0u8; width];
        let mask = (1u32 << bits) - 1;
        let mut val = value;
        for i in (0..width).rev() {
            result[i] = (val & mask) as u8;
            val >>= bits;
        }
        result
    }

    /// Spread the low 28 bits of `value` over four 7-bit bytes.
    pub fn encode_u32(value: u32) -> u32 {
        (value & 0x7F)
            | ((value & 0x3F80) << 1)
            | ((value & 0x1F_C000) << 2)
            | ((value & 0x0FE0_0000) << 3)
    }

    /// Inverse of [`BitPaddedInt::encode_u32`]; the top bit of each byte is ignored.
    pub fn decode_u32(value: u32) -> u32 {
        (value & 0x7F)
            | ((value >> 1) & 0x3F80)
            | ((value >> 2) & 0x1F_C000)
            | ((value >> 3) & 0x0FE0_0000)
    }

    /// Check if data could be a valid syncsafe integer (no high bits set).
    pub fn has_valid_padding(data: &[u8]) -> bool {
        data.iter().all(|&b| b & 0x80 == 0)
    }
}

/// ID3v2 header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ID3Flags {
    pub unsynchronisation: bool,
    pub extended: bool,
    pub experimental: bool,
    pub footer: bool,
}

impl ID3Flags {
    pub fn from_byte(flag_byte: u8, major: u8) -> Self {
        ID3Flags {
            unsynchronisation: flag_byte & 0x80 != 0,
            extended: flag_byte & 0x40 != 0,
            experimental: flag_byte & 0x20 != 0,
            footer: major == 4 && flag_byte & 0x10 != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.unsynchronisation {
            b |= 0x80;
        }
        if self.extended {
            b |= 0x40;
        }
        if self.experimental {
            b |= 0x20;
        }
        if self.footer {
            b |= 0x10;
        }
        b
    }
}

/// Parsed ID3v2 header (10 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ID3Header {
    pub version: (u8, u8), // (major, revision) e.g. (4, 0) for ID3v2.4
    pub flags: ID3Flags,
    pub size: u32,          // Tag size excluding header (10 bytes)
    pub extended_size: u32, // Declared extended header size, 0 if absent
    pub offset: u64,        // Offset of the ID3 header in the file
}

impl ID3Header {
    /// Header for a freshly created tag of the given major version.
    pub fn new(major: u8) -> Result<Self> {
        if !(2..=4).contains(&major) {
            return Err(Id3Error::UnsupportedVersion(format!("ID3v2.{}", major)));
        }
        Ok(ID3Header {
            version: (major, 0),
            flags: ID3Flags::default(),
            size: 0,
            extended_size: 0,
            offset: 0,
        })
    }

    /// Parse an ID3v2 header from the start of `data`.
    ///
    /// If the extended-header flag is set and the four bytes after the header
    /// are available, their syncsafe value is recorded in `extended_size`.
    pub fn parse(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Id3Error::NoHeader);
        }

        if &data[0..3] != b"ID3" {
            return Err(Id3Error::NoHeader);
        }

        let major = data[3];
        let revision = data[4];
        let flag_byte = data[5];

        if flag_byte & RESERVED_FLAGS != 0 {
            log::debug!("header flags {:#04x} carry reserved bits", flag_byte);
            return Err(Id3Error::NoHeader);
        }

        // We support versions 2.2, 2.3, 2.4
        if !(2..=4).contains(&major) {
            return Err(Id3Error::UnsupportedVersion(format!(
                "ID3v2.{}.{}",
                major, revision
            )));
        }

        let flags = ID3Flags::from_byte(flag_byte, major);

        // Size is always syncsafe in the header
        let size = BitPaddedInt::syncsafe(&data[6..10]);

        let extended_size = if flags.extended && data.len() >= HEADER_SIZE + 4 {
            BitPaddedInt::syncsafe(&data[10..14])
        } else {
            0
        };

        Ok(ID3Header {
            version: (major, revision),
            flags,
            size,
            extended_size,
            offset,
        })
    }

    /// Major version: 2, 3 or 4.
    pub fn major(&self) -> u8 {
        self.version.0
    }

    /// Number of bytes to skip at the start of the tag body for the
    /// extended header. The v2.3 size field excludes itself, the v2.4 one
    /// does not.
    pub fn extended_header_skip(&self) -> usize {
        if !self.flags.extended {
            return 0;
        }
        if self.major() == 4 {
            self.extended_size as usize
        } else {
            self.extended_size as usize + 4
        }
    }

    /// Full tag size including 10-byte header (and optional 10-byte footer).
    pub fn full_size(&self) -> u32 {
        let mut s = self.size + HEADER_SIZE as u32;
        if self.flags.footer {
            s += HEADER_SIZE as u32;
        }
        s
    }

    /// Render the 10-byte header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..3].copy_from_slice(b"ID3");
        out[3] = self.version.0;
        out[4] = self.version.1;
        out[5] = self.flags.to_byte();
        out[6..10].copy_from_slice(&BitPaddedInt::encode(self.size, 4, 7));
        out
    }
}

/// Cheap pre-check of the ten bytes at a candidate offset: two version bytes
/// below 0xFF, any flag byte, and a size whose bytes are all below 0x80.
fn looks_like_header(candidate: &[u8]) -> bool {
    candidate.len() >= HEADER_SIZE
        && candidate[3] != 0xFF
        && candidate[4] != 0xFF
        && BitPaddedInt::has_valid_padding(&candidate[6..10])
}

/// Find every ID3v2 tag in `data`.
///
/// Each hit is confirmed by a full header parse. After a hit the search
/// resumes past the end of that tag, so data inside a tag is never mistaken
/// for another header.
pub fn scan_for_tags(data: &[u8]) -> Vec<u64> {
    let finder = memmem::Finder::new(b"ID3");
    let mut offsets = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let found = match finder.find(&data[pos..]) {
            Some(rel) => pos + rel,
            None => break,
        };

        let candidate = &data[found..];
        if looks_like_header(candidate) {
            if let Ok(header) = ID3Header::parse(candidate, found as u64) {
                log::debug!(
                    "ID3v2.{} tag at offset {} ({} bytes)",
                    header.major(),
                    found,
                    header.full_size()
                );
                offsets.push(found as u64);
                pos = found + header.full_size() as usize;
                continue;
            }
        }
        pos = found + 1;
    }

    offsets
}
