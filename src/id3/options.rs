/// Padding written after the frames when no other value is configured.
pub const DEFAULT_PADDING: u32 = 2048;

/// Settings for serializing a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Zero bytes appended after the last frame, leaving room for the tag
    /// to grow in place later.
    pub padding: u32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            padding: DEFAULT_PADDING,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }
}
