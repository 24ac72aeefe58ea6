//! Level upload, listing, retrieval, removal and rating.
//!
//! The in-memory index holds lightweight [`LevelInfo`] descriptors; the
//! playable content lives only in the per-level file and is read on
//! demand.

use std::io;

use tracing::info;

use sapphire_shared::constants::{MAX_LEVEL_AUTHOR_LEN, MAX_LEVEL_TITLE_LEN, MAX_RATING};
use sapphire_shared::{LevelId, UserId};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::events::{LevelChange, LevelEvent};
use crate::models::{Level, LevelInfo};
use crate::storage::{lock, DataStorage};

impl DataStorage {
    /// A window of level descriptors in identifier order, plus the true
    /// total. `max_count = 0` returns no records but still reports the
    /// total.
    pub fn query_levels(&self, first: usize, max_count: usize) -> Result<(Vec<LevelInfo>, usize)> {
        let levels = lock(&self.levels);
        let total = levels.len();
        if first > total {
            return Err(StoreError::OutOfBounds);
        }
        let window = levels
            .iter()
            .skip(first)
            .take(max_count)
            .cloned()
            .collect();
        Ok((window, total))
    }

    /// Retrieve a full level, content included.
    ///
    /// Errors: `LevelNotFound`, `StorageUnavailable`.
    pub fn get_level(&self, id: LevelId) -> Result<Level> {
        let info = lock(&self.levels)
            .get(id)
            .cloned()
            .ok_or(StoreError::LevelNotFound)?;

        let mut level: Level =
            codec::read_record(&self.level_path(id))?.ok_or_else(level_file_missing)?;
        // The index holds the live descriptor (ratings change without
        // the content file being the source of truth for them).
        level.info = info;
        Ok(level)
    }

    /// Store a newly uploaded level.
    ///
    /// Errors: `UserNotFound` (uploader), `LevelAlreadyExists`,
    /// `FieldTooLong`, `StorageUnavailable`.
    pub fn save_level(&self, uploader: UserId, level: Level) -> Result<()> {
        if level.info.title.chars().count() > MAX_LEVEL_TITLE_LEN {
            return Err(StoreError::FieldTooLong("level title"));
        }
        if level.info.author.chars().count() > MAX_LEVEL_AUTHOR_LEN {
            return Err(StoreError::FieldTooLong("level author"));
        }

        let id = level.info.id;
        let _user_guard = self.user_locks.guard(&uploader.0);
        let _level_guard = self.level_locks.guard(&id.0);

        let mut user = lock(&self.users)
            .get(uploader)
            .cloned()
            .ok_or(StoreError::UserNotFound)?;
        if lock(&self.levels).contains(id) {
            return Err(StoreError::LevelAlreadyExists);
        }

        let mut level = level;
        level.info.uploader = uploader;
        level.info.rating_sum = 0;
        level.info.rating_count = 0;

        codec::write_record(&self.level_path(id), &level)?;

        if let Err(pos) = user.uploaded_levels.binary_search(&id) {
            user.uploaded_levels.insert(pos, id);
        }
        if let Err(e) = codec::write_record(&self.user_path(uploader), &user) {
            // Keep disk and index consistent: drop the half-saved level.
            let _ = std::fs::remove_file(self.level_path(id));
            return Err(e);
        }

        lock(&self.users).upsert(user);
        lock(&self.levels).insert(level.info.clone());

        info!(level = %id, uploader = %uploader, "level saved");
        self.listeners.level.notify(&LevelEvent {
            level: id,
            change: LevelChange::Added,
        });
        Ok(())
    }

    /// Remove a level. Only its uploader may do so. Statistics and demos
    /// are append-only history and stay on disk.
    ///
    /// Errors: `UserNotFound`, `LevelNotFound`, `NotLevelAuthor`,
    /// `StorageUnavailable`.
    pub fn remove_level(&self, user_id: UserId, id: LevelId) -> Result<()> {
        let _user_guard = self.user_locks.guard(&user_id.0);
        let _level_guard = self.level_locks.guard(&id.0);

        let mut user = lock(&self.users)
            .get(user_id)
            .cloned()
            .ok_or(StoreError::UserNotFound)?;
        let info = lock(&self.levels)
            .get(id)
            .cloned()
            .ok_or(StoreError::LevelNotFound)?;
        if info.uploader != user_id {
            return Err(StoreError::NotLevelAuthor);
        }

        if let Ok(pos) = user.uploaded_levels.binary_search(&id) {
            user.uploaded_levels.remove(pos);
        }
        codec::write_record(&self.user_path(user_id), &user)?;
        std::fs::remove_file(self.level_path(id))?;

        lock(&self.users).upsert(user);
        lock(&self.levels).remove(id);

        info!(level = %id, "level removed");
        self.listeners.level.notify(&LevelEvent {
            level: id,
            change: LevelChange::Removed,
        });
        Ok(())
    }

    /// Rate a level. A user holds at most one rating per level; rating
    /// again replaces the old value, and re-sending the same value is an
    /// idempotent no-op that fires no event.
    ///
    /// Errors: `InvalidRating`, `UserNotFound`, `LevelNotFound`,
    /// `StorageUnavailable`.
    pub fn rate_level(&self, user_id: UserId, id: LevelId, rating: u8) -> Result<()> {
        if rating == 0 || rating > MAX_RATING {
            return Err(StoreError::InvalidRating(rating));
        }

        let _user_guard = self.user_locks.guard(&user_id.0);
        let _level_guard = self.level_locks.guard(&id.0);

        let mut user = lock(&self.users)
            .get(user_id)
            .cloned()
            .ok_or(StoreError::UserNotFound)?;
        let mut info = lock(&self.levels)
            .get(id)
            .cloned()
            .ok_or(StoreError::LevelNotFound)?;

        match user
            .level_ratings
            .binary_search_by_key(&id, |(level, _)| *level)
        {
            Ok(pos) => {
                let old = user.level_ratings[pos].1;
                if old == rating {
                    return Ok(());
                }
                user.level_ratings[pos].1 = rating;
                info.rating_sum = info.rating_sum - u32::from(old) + u32::from(rating);
            }
            Err(pos) => {
                user.level_ratings.insert(pos, (id, rating));
                info.rating_sum += u32::from(rating);
                info.rating_count += 1;
            }
        }

        // The level content file carries a stale descriptor copy; the
        // index entry is authoritative, so only user and descriptor
        // persistence matter here.
        let mut level: Level =
            codec::read_record(&self.level_path(id))?.ok_or_else(level_file_missing)?;
        level.info = info.clone();
        codec::write_record(&self.level_path(id), &level)?;
        codec::write_record(&self.user_path(user_id), &user)?;

        lock(&self.users).upsert(user);
        lock(&self.levels).upsert(info);

        self.listeners.level.notify(&LevelEvent {
            level: id,
            change: LevelChange::Rated,
        });
        Ok(())
    }
}

fn level_file_missing() -> StoreError {
    StoreError::StorageUnavailable(io::Error::new(
        io::ErrorKind::NotFound,
        "level content file missing or unreadable",
    ))
}
