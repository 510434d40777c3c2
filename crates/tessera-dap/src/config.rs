use serde::Deserialize;

/// Size reported for memory URIs that carry no range.
pub const DEFAULT_MEMORY_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryConfig {
    pub default_size: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_MEMORY_SIZE,
        }
    }
}
