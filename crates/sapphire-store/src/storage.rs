//! The storage engine handle.
//!
//! [`DataStorage`] owns the in-memory sorted indexes, the per-entity lock
//! pools, the listener registries and the message board. `open` eagerly
//! loads every category directory; all facade operations live in the
//! domain modules (`users`, `levels`, `hardware`, `messages`, `stats`,
//! `demos`) as `impl DataStorage` blocks.
//!
//! Locking discipline: an operation first takes the per-entity lock-pool
//! guard for the record it mutates, then takes the category index mutex
//! only long enough to copy the record out or write the mutated copy
//! back. The index is only updated after the persistence write succeeded,
//! so a failed write never leaves the in-memory state inconsistent.
//! Operations needing guards from several pools acquire them in the fixed
//! order users, levels, hardware.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::events::{
    AssociationEvent, LevelEvent, ListenerHandle, Listeners, MessageEvent, ProgressEvent,
};
use crate::index::{Keyed, SortedIndex};
use crate::lock_pool::LockPool;
use crate::messages::MessageBoard;
use crate::models::{HardwareRecord, LevelInfo, LevelStats, User};

use sapphire_shared::{HardwareId, LevelId, UserId};

pub struct DataStorage {
    pub(crate) config: StoreConfig,

    users_dir: PathBuf,
    levels_dir: PathBuf,
    hardware_dir: PathBuf,
    stats_dir: PathBuf,
    demos_dir: PathBuf,

    pub(crate) users: Mutex<SortedIndex<User>>,
    pub(crate) levels: Mutex<SortedIndex<LevelInfo>>,
    pub(crate) hardware: Mutex<SortedIndex<HardwareRecord>>,
    pub(crate) stats: Mutex<SortedIndex<LevelStats>>,

    pub(crate) user_locks: LockPool,
    pub(crate) level_locks: LockPool,
    pub(crate) hardware_locks: LockPool,

    pub(crate) listeners: Listeners,
    pub(crate) board: MessageBoard,
}

impl DataStorage {
    /// Open (or create) the storage root and eagerly load every category.
    ///
    /// Corrupt or partial record files are skipped with a warning; only a
    /// genuine I/O fault aborts the open.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let root = config.root.clone();
        let users_dir = root.join("users");
        let levels_dir = root.join("levels");
        let hardware_dir = root.join("hardware");
        let stats_dir = root.join("stats");
        let demos_dir = root.join("demos");
        let messages_dir = root.join("messages");

        for dir in [
            &users_dir,
            &levels_dir,
            &hardware_dir,
            &stats_dir,
            &demos_dir,
            &messages_dir,
        ] {
            fs::create_dir_all(dir)?;
        }

        let users = load_category::<User>(&users_dir)?;
        let levels = load_category::<LevelInfo>(&levels_dir)?;
        let hardware = load_category::<HardwareRecord>(&hardware_dir)?;
        let stats = load_category::<LevelStats>(&stats_dir)?;
        let board = MessageBoard::open(messages_dir, &config)?;

        info!(
            root = %root.display(),
            users = users.len(),
            levels = levels.len(),
            hardware = hardware.len(),
            stats = stats.len(),
            messages = board.total(),
            "storage opened"
        );

        Ok(Self {
            user_locks: LockPool::new(config.lock_pool_size),
            level_locks: LockPool::new(config.lock_pool_size),
            hardware_locks: LockPool::new(config.lock_pool_size),
            config,
            users_dir,
            levels_dir,
            hardware_dir,
            stats_dir,
            demos_dir,
            users: Mutex::new(users),
            levels: Mutex::new(levels),
            hardware: Mutex::new(hardware),
            stats: Mutex::new(stats),
            listeners: Listeners::new(),
            board,
        })
    }

    /// Block until every queued message-log append has reached disk.
    pub fn flush(&self) -> Result<()> {
        self.board.flush()
    }

    /// Flush and stop the background writer. Called automatically on
    /// drop; explicit use gives the embedder an error to inspect.
    pub fn close(&self) -> Result<()> {
        self.board.flush()?;
        self.board.shutdown();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    pub(crate) fn user_path(&self, id: UserId) -> PathBuf {
        self.users_dir.join(id.to_string())
    }

    pub(crate) fn level_path(&self, id: LevelId) -> PathBuf {
        self.levels_dir.join(id.to_string())
    }

    pub(crate) fn hardware_path(&self, id: HardwareId) -> PathBuf {
        self.hardware_dir.join(id.to_string())
    }

    pub(crate) fn stats_path(&self, id: LevelId) -> PathBuf {
        self.stats_dir.join(id.to_string())
    }

    pub(crate) fn demo_path(&self, id: LevelId) -> PathBuf {
        self.demos_dir.join(id.to_string())
    }

    // ------------------------------------------------------------------
    // Listener registration
    // ------------------------------------------------------------------

    pub fn add_level_listener(
        &self,
        callback: Box<dyn Fn(&LevelEvent) + Send + Sync>,
    ) -> ListenerHandle {
        self.listeners.level.add(callback)
    }

    pub fn remove_level_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.level.remove(handle)
    }

    pub fn add_message_listener(
        &self,
        callback: Box<dyn Fn(&MessageEvent) + Send + Sync>,
    ) -> ListenerHandle {
        self.listeners.message.add(callback)
    }

    pub fn remove_message_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.message.remove(handle)
    }

    pub fn add_progress_listener(
        &self,
        callback: Box<dyn Fn(&ProgressEvent) + Send + Sync>,
    ) -> ListenerHandle {
        self.listeners.progress.add(callback)
    }

    pub fn remove_progress_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.progress.remove(handle)
    }

    pub fn add_association_listener(
        &self,
        callback: Box<dyn Fn(&AssociationEvent) + Send + Sync>,
    ) -> ListenerHandle {
        self.listeners.association.add(callback)
    }

    pub fn remove_association_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.association.remove(handle)
    }
}

impl Drop for DataStorage {
    fn drop(&mut self) {
        if let Err(e) = self.board.flush() {
            warn!(error = %e, "message board flush on close failed");
        }
        self.board.shutdown();
    }
}

/// Scan a category directory and load every readable record into a
/// sorted index. Leftover temp files from interrupted writes are removed;
/// anything else unreadable is skipped with a warning.
fn load_category<T: Keyed + DeserializeOwned>(dir: &Path) -> Result<SortedIndex<T>> {
    let mut index = SortedIndex::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".tmp") {
            let _ = fs::remove_file(&path);
            continue;
        }
        if Uuid::parse_str(&name).is_err() {
            warn!(path = %path.display(), "unexpected file in category directory, skipping");
            continue;
        }

        if let Some(record) = codec::read_record::<T>(&path)? {
            if !index.insert(record) {
                warn!(path = %path.display(), "duplicate record key, keeping first");
            }
        }
    }

    Ok(index)
}

/// Mutex acquisition with poison recovery: a panicking writer cannot
/// leave a sorted index half-mutated because mutations are single
/// `upsert`/`insert`/`remove` calls.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
