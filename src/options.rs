/// Treatment of a child atom whose declared size is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroSizePolicy {
    /// The atom extends to the end of its container.
    #[default]
    ExtendToEnd,
    /// The atom ends traversal of its container.
    Terminate,
    /// The atom is malformed.
    Reject,
}

/// Limits and tolerances applied while walking a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Maximum number of nested containers.
    pub max_depth: u32,
    /// Largest atom payload that is buffered in memory, in bytes.
    pub max_payload_size: u64,
    pub zero_size_atoms: ZeroSizePolicy,
    /// Stop quietly instead of failing when a top-level atom runs past the end of the stream.
    pub tolerate_trailing_junk: bool,
    /// Keep tracks whose handler is neither video, sound nor music.
    pub keep_unclassified_tracks: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_payload_size: 64 * 1024 * 1024,
            zero_size_atoms: ZeroSizePolicy::default(),
            tolerate_trailing_junk: true,
            keep_unclassified_tracks: false,
        }
    }
}
