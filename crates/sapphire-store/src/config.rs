//! Storage engine configuration.
//!
//! The embedding application supplies the root directory and tunables at
//! construction time; there is no environment or CLI configuration in
//! this core.

use std::path::PathBuf;

use sapphire_shared::constants;

/// Construction-time settings for [`crate::DataStorage`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory the category subdirectories live under.
    pub root: PathBuf,

    /// Messages per rotating log file before a new file is started.
    pub messages_per_file: usize,

    /// Number of trailing messages retained in memory for query serving.
    /// Older messages stay counted but are served only as a total.
    pub message_retention: usize,

    /// A demo-file offset is recorded every this many demos.
    pub demo_index_stride: u32,

    /// Buckets in each per-entity lock pool.
    pub lock_pool_size: usize,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            messages_per_file: constants::MESSAGES_PER_LOG_FILE,
            message_retention: constants::MESSAGE_RETENTION,
            demo_index_stride: constants::DEMO_INDEX_STRIDE,
            lock_pool_size: constants::LOCK_POOL_SIZE,
        }
    }
}
