//! Per-level ranked score lists.
//!
//! Each leaderboard keeps two mutually consistent arrays: the entries in
//! score order (best first) and a user-sorted position index mapping each
//! user to their entry's array index. A user holds at most one entry;
//! only a strictly better score replaces it.

use serde::{Deserialize, Serialize};

use sapphire_shared::{LeaderboardKind, UserId};

/// One user's best result on a leaderboard, linked to the demo that
/// produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user: UserId,
    pub score: u32,
    /// Demo number in the level's demo file that replays this result.
    pub demo_id: u32,
}

/// A ranked standing returned by queries: true rank (0-based) plus the
/// entry itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardStanding {
    pub rank: u32,
    pub entry: LeaderboardEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Leaderboard {
    pub kind: LeaderboardKind,
    /// Entries in score order, best first.
    entries: Vec<LeaderboardEntry>,
    /// `(user, index into entries)`, sorted by user.
    positions: Vec<(UserId, u32)>,
}

impl Leaderboard {
    pub fn new(kind: LeaderboardKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            positions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `candidate` beats `incumbent` on this board. Equal scores
    /// never replace.
    fn better(&self, candidate: u32, incumbent: u32) -> bool {
        match self.kind {
            LeaderboardKind::MostGems => candidate > incumbent,
            LeaderboardKind::LeastTime | LeaderboardKind::LeastSteps => candidate < incumbent,
        }
    }

    /// Ranking order: best score first, ties broken by ascending user
    /// identifier for determinism.
    fn rank_cmp(&self, a: &LeaderboardEntry, b: &LeaderboardEntry) -> std::cmp::Ordering {
        let by_score = match self.kind {
            LeaderboardKind::MostGems => b.score.cmp(&a.score),
            LeaderboardKind::LeastTime | LeaderboardKind::LeastSteps => a.score.cmp(&b.score),
        };
        by_score.then(a.user.cmp(&b.user))
    }

    fn user_pos(&self, user: UserId) -> Option<usize> {
        self.positions
            .binary_search_by_key(&user, |(u, _)| *u)
            .ok()
            .map(|i| self.positions[i].1 as usize)
    }

    fn set_user_pos(&mut self, user: UserId, index: u32) {
        match self.positions.binary_search_by_key(&user, |(u, _)| *u) {
            Ok(i) => self.positions[i].1 = index,
            Err(i) => self.positions.insert(i, (user, index)),
        }
    }

    /// Rewrite the stored position of every entry in `range` to its
    /// actual array index. Called after inserts/removes shift entries.
    fn reindex(&mut self, range: std::ops::Range<usize>) {
        for i in range {
            let user = self.entries[i].user;
            self.set_user_pos(user, i as u32);
        }
    }

    /// Record a result. Returns `true` if the board changed: a first
    /// entry for the user, or a strictly better score replacing the old
    /// one. A not-better score is a no-op.
    pub fn add_entry(&mut self, user: UserId, score: u32, demo_id: u32) -> bool {
        let entry = LeaderboardEntry {
            user,
            score,
            demo_id,
        };

        match self.user_pos(user) {
            Some(old) => {
                if !self.better(score, self.entries[old].score) {
                    return false;
                }
                self.entries.remove(old);
                let at = self
                    .entries
                    .partition_point(|e| self.rank_cmp(e, &entry).is_lt());
                self.entries.insert(at, entry);
                // Every entry between the old and new slots shifted.
                let (lo, hi) = if at <= old { (at, old) } else { (old, at) };
                self.reindex(lo..hi + 1);
                true
            }
            None => {
                let at = self
                    .entries
                    .partition_point(|e| self.rank_cmp(e, &entry).is_lt());
                self.entries.insert(at, entry);
                self.reindex(at..self.entries.len());
                true
            }
        }
    }

    /// The top `max_count` entries plus, when the querying user ranks
    /// below the window, their own standing so a UI can always show
    /// "you are rank X".
    pub fn top(
        &self,
        max_count: usize,
        user: Option<UserId>,
    ) -> (Vec<LeaderboardEntry>, Option<LeaderboardStanding>) {
        let window: Vec<LeaderboardEntry> =
            self.entries.iter().take(max_count).copied().collect();

        let own = user.and_then(|u| self.user_pos(u)).and_then(|pos| {
            if pos < max_count {
                None
            } else {
                Some(LeaderboardStanding {
                    rank: pos as u32,
                    entry: self.entries[pos],
                })
            }
        });

        (window, own)
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        for window in self.entries.windows(2) {
            assert!(self.rank_cmp(&window[0], &window[1]).is_lt());
        }
        assert_eq!(self.entries.len(), self.positions.len());
        for (user, index) in &self.positions {
            assert_eq!(self.entries[*index as usize].user, *user);
        }
    }
}
