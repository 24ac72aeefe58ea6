//! Domain model structs persisted by the storage engine.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be written
//! to its per-entity file with bincode and handed to the network layer
//! unchanged. Cross-references between records are identifiers, never
//! pointers, so indexes can grow independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sapphire_shared::{HardwareId, LevelId, RegistrationToken, UserId};

use crate::index::Keyed;
use crate::leaderboard::Leaderboard;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user account. One file per user under `users/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique user identifier.
    pub id: UserId,
    /// Secret issued at registration, checked on login.
    pub token: RegistrationToken,
    /// Display name, bounded by `MAX_USER_NAME_LEN`.
    pub name: String,
    /// Preferred difficulty color in the UI (opaque to the engine).
    pub difficulty_color: u32,
    /// When the account was registered.
    pub created_at: DateTime<Utc>,
    /// Levels this user uploaded, sorted by identifier.
    pub uploaded_levels: Vec<LevelId>,
    /// Ratings this user gave, sorted by level identifier.
    pub level_ratings: Vec<(LevelId, u8)>,
}

impl User {
    /// Look up the rating this user gave a level, if any.
    pub fn rating_for(&self, level: LevelId) -> Option<u8> {
        self.level_ratings
            .binary_search_by_key(&level, |(id, _)| *id)
            .ok()
            .map(|pos| self.level_ratings[pos].1)
    }
}

impl Keyed for User {
    type Key = UserId;

    fn key(&self) -> UserId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// Lightweight level descriptor kept in the in-memory index for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelInfo {
    /// Unique level identifier.
    pub id: LevelId,
    /// Level title, bounded by `MAX_LEVEL_TITLE_LEN`.
    pub title: String,
    /// Author display name, bounded by `MAX_LEVEL_AUTHOR_LEN`.
    pub author: String,
    /// The uploading user.
    pub uploader: UserId,
    /// Author-assigned difficulty class.
    pub difficulty: u8,
    /// Level category.
    pub category: u8,
    /// When the level was uploaded.
    pub created_at: DateTime<Utc>,
    /// Sum of all current ratings.
    pub rating_sum: u32,
    /// Number of users who rated the level.
    pub rating_count: u32,
}

impl Keyed for LevelInfo {
    type Key = LevelId;

    fn key(&self) -> LevelId {
        self.id
    }
}

/// A full level: descriptor plus playable content. The content grid/rules
/// are opaque bytes to the storage engine. One file per level under
/// `levels/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Level {
    pub info: LevelInfo,
    /// Serialized playable content (grid, rules), opaque to the engine.
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

/// A peer device linked to this one, with the progress counter value of
/// this device the peer last synchronized against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssociatedHardware {
    pub peer: HardwareId,
    pub last_synced_progress_id: u64,
}

/// Per-device progress record. One file per device under `hardware/`.
/// Created on the first progress report from a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HardwareRecord {
    /// Device identifier.
    pub id: HardwareId,
    /// Levels the device has seen, sorted.
    pub seen_levels: Vec<LevelId>,
    /// Levels the device has finished, sorted.
    pub finished_levels: Vec<LevelId>,
    /// Strictly monotonic counter, incremented on every accepted
    /// progress write.
    pub progress_id: u64,
    /// Linked peer devices, sorted by peer identifier.
    pub associated: Vec<AssociatedHardware>,
}

impl HardwareRecord {
    pub fn new(id: HardwareId) -> Self {
        Self {
            id,
            seen_levels: Vec::new(),
            finished_levels: Vec::new(),
            progress_id: 0,
            associated: Vec::new(),
        }
    }

    /// Position of a peer in the sorted association list.
    pub fn association(&self, peer: HardwareId) -> Option<usize> {
        self.associated
            .binary_search_by_key(&peer, |a| a.peer)
            .ok()
    }
}

impl Keyed for HardwareRecord {
    type Key = HardwareId;

    fn key(&self) -> HardwareId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single discussion message, append-only in rotating log files under
/// `messages/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// The authoring user.
    pub author: UserId,
    /// Author display name at the time of posting.
    pub author_name: String,
    /// Message text, bounded by `MAX_MESSAGE_LEN`.
    pub text: String,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Level statistics
// ---------------------------------------------------------------------------

/// Aggregate play statistics and leaderboards for one level. Created
/// lazily on the first completed playthrough; one file per level under
/// `stats/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelStats {
    /// The level these statistics belong to.
    pub level: LevelId,
    /// Completed playthroughs recorded.
    pub play_count: u64,
    /// Demos appended to the per-level demo file so far.
    pub demo_count: u32,
    /// Byte offset of every `DEMO_INDEX_STRIDE`-th demo in the demo file,
    /// so retrieval seeks forward from the nearest indexed offset.
    pub demo_offsets: Vec<u64>,
    /// One leaderboard per kind (gems, time, steps).
    pub leaderboards: Vec<Leaderboard>,
}

impl Keyed for LevelStats {
    type Key = LevelId;

    fn key(&self) -> LevelId {
        self.level
    }
}
