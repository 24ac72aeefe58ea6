/// Maximum user display-name length in characters
pub const MAX_USER_NAME_LEN: usize = 32;

/// Maximum level title length in characters
pub const MAX_LEVEL_TITLE_LEN: usize = 64;

/// Maximum level author-name length in characters
pub const MAX_LEVEL_AUTHOR_LEN: usize = 32;

/// Maximum discussion-message length in characters
pub const MAX_MESSAGE_LEN: usize = 512;

/// Highest accepted level rating (ratings are 1..=MAX_RATING)
pub const MAX_RATING: u8 = 10;

/// Number of mutexes in each per-entity lock pool
pub const LOCK_POOL_SIZE: usize = 64;

/// Messages stored per rotating log file before a new file is started
pub const MESSAGES_PER_LOG_FILE: usize = 256;

/// Messages retained in memory for query serving (tail window)
pub const MESSAGE_RETENTION: usize = 512;

/// A demo-file offset is indexed every this many demos
pub const DEMO_INDEX_STRIDE: u32 = 16;
