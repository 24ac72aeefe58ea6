//! # sapphire-store
//!
//! File-backed community storage engine for the Sapphire server: users,
//! levels, demos, discussion messages, per-device progress
//! synchronization and per-level leaderboards.
//!
//! The crate exposes a synchronous [`DataStorage`] handle. Entities are
//! persisted one file each under category directories, loaded eagerly at
//! open and indexed in sorted in-memory arrays; discussion messages go
//! to rotating append-only logs via a background writer thread. The
//! network layer embedding this engine does all wire (de)serialization
//! and maps [`StoreError`] values onto protocol error codes.

pub mod config;
pub mod events;
pub mod index;
pub mod leaderboard;
pub mod lock_pool;
pub mod models;
pub mod stats;
pub mod storage;

mod codec;
mod demos;
mod error;
mod hardware;
mod levels;
mod messages;
mod users;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use events::{
    AssociationEvent, LevelChange, LevelEvent, ListenerHandle, MessageEvent, ProgressEvent,
};
pub use leaderboard::{Leaderboard, LeaderboardEntry, LeaderboardStanding};
pub use messages::MessageWindow;
pub use models::*;
pub use stats::PlayResult;
pub use storage::DataStorage;
