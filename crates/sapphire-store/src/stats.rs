//! Per-level play statistics and leaderboard queries.

use tracing::debug;

use sapphire_shared::{LeaderboardKind, LevelId, UserId};

use crate::codec;
use crate::demos;
use crate::error::{Result, StoreError};
use crate::leaderboard::{Leaderboard, LeaderboardEntry, LeaderboardStanding};
use crate::models::LevelStats;
use crate::storage::{lock, DataStorage};

/// One completed playthrough, as reported by the network layer.
#[derive(Debug, Clone)]
pub struct PlayResult {
    /// Gems collected (more is better).
    pub gems: u32,
    /// Completion time in milliseconds (less is better).
    pub time_ms: u32,
    /// Steps taken (less is better).
    pub steps: u32,
    /// Recorded input sequence plus random seed, replayable.
    pub demo: Vec<u8>,
}

impl DataStorage {
    /// The statistics record for a level.
    ///
    /// Errors: `StatsNotFound` when the level was never finished.
    pub fn get_level_statistics(&self, level: LevelId) -> Result<LevelStats> {
        lock(&self.stats)
            .get(level)
            .cloned()
            .ok_or(StoreError::StatsNotFound)
    }

    /// Record a completed playthrough: bump play counters, append the
    /// demo to the level's demo file and feed all three leaderboards.
    /// The statistics record is created lazily on the first report.
    ///
    /// Errors: `LevelNotFound`, `UserNotFound`, `StorageUnavailable`.
    pub fn append_level_statistics(
        &self,
        user: UserId,
        level: LevelId,
        result: PlayResult,
    ) -> Result<()> {
        if !lock(&self.users).contains(user) {
            return Err(StoreError::UserNotFound);
        }
        if !lock(&self.levels).contains(level) {
            return Err(StoreError::LevelNotFound);
        }

        let _guard = self.level_locks.guard(&level.0);

        let mut stats = lock(&self.stats)
            .get(level)
            .cloned()
            .unwrap_or_else(|| new_stats(level));

        let demo_path = self.demo_path(level);
        let (demo_id, file_len_before) = demos::append_demo(
            &demo_path,
            &result.demo,
            self.config.demo_index_stride,
            &mut stats,
        )?;

        stats.play_count += 1;
        for board in &mut stats.leaderboards {
            let score = match board.kind {
                LeaderboardKind::MostGems => result.gems,
                LeaderboardKind::LeastTime => result.time_ms,
                LeaderboardKind::LeastSteps => result.steps,
            };
            board.add_entry(user, score, demo_id);
        }

        if let Err(e) = codec::write_record(&self.stats_path(level), &stats) {
            // The demo frame was already appended; trim it so demo
            // numbering and the offset index stay aligned.
            if let Ok(file) = std::fs::OpenOptions::new().write(true).open(&demo_path) {
                let _ = file.set_len(file_len_before);
            }
            return Err(e);
        }
        lock(&self.stats).upsert(stats);

        debug!(%level, %user, demo_id, "playthrough recorded");
        Ok(())
    }

    /// The top window of a level's leaderboard plus, when the querying
    /// user ranks below the window, their own true standing.
    ///
    /// Errors: `StatsNotFound`, `LeaderboardNotFound`.
    pub fn get_leaderboard(
        &self,
        level: LevelId,
        kind: LeaderboardKind,
        max_count: usize,
        user: Option<UserId>,
    ) -> Result<(Vec<LeaderboardEntry>, Option<LeaderboardStanding>)> {
        let stats_index = lock(&self.stats);
        let stats = stats_index.get(level).ok_or(StoreError::StatsNotFound)?;
        let board = stats
            .leaderboards
            .iter()
            .find(|b| b.kind == kind)
            .ok_or(StoreError::LeaderboardNotFound)?;
        Ok(board.top(max_count, user))
    }
}

fn new_stats(level: LevelId) -> LevelStats {
    LevelStats {
        level,
        play_count: 0,
        demo_count: 0,
        demo_offsets: Vec::new(),
        leaderboards: LeaderboardKind::ALL
            .iter()
            .map(|kind| Leaderboard::new(*kind))
            .collect(),
    }
}
