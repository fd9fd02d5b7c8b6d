use serde::{Deserialize, Serialize};

/// Archive writer settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Size of the fixed buffer each section payload is streamed through.
    pub chunk_size: usize,
    /// zstd compression level for section payloads.
    pub compression_level: i32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            compression_level: 3,
        }
    }
}

impl ArchiveConfig {
    /// Chunk size clamped to what a chunk length prefix can carry.
    pub(crate) fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, u32::MAX as usize)
    }
}
