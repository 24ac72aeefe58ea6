//! Per-level demo (replay) storage.
//!
//! All demos for a level are appended to one growing file. The level's
//! statistics record keeps a sparse offset index (one entry every
//! `demo_index_stride` demos), so retrieving demo `n` seeks to the
//! nearest indexed offset and reads forward instead of scanning from the
//! start.

use std::fs::{File, OpenOptions};
use std::path::Path;

use sapphire_shared::LevelId;

use crate::codec;
use crate::error::{Result, StoreError};
use crate::models::LevelStats;
use crate::storage::{lock, DataStorage};

/// Append one demo frame and record its offset in the sparse index when
/// it falls on a stride boundary. Returns the new demo's number and the
/// file length before the append (for rollback on a later failure).
pub(crate) fn append_demo(
    path: &Path,
    payload: &[u8],
    stride: u32,
    stats: &mut LevelStats,
) -> Result<(u32, u64)> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let offset = file.metadata()?.len();

    if stats.demo_count % stride == 0 {
        stats.demo_offsets.push(offset);
    }
    codec::write_frame(&mut file, payload)?;
    file.sync_data()?;

    let demo_id = stats.demo_count;
    stats.demo_count += 1;
    Ok((demo_id, offset))
}

/// Read demo `demo_id` by seeking to the nearest indexed offset and
/// skipping forward.
pub(crate) fn read_demo(
    path: &Path,
    stats: &LevelStats,
    demo_id: u32,
    stride: u32,
) -> Result<Vec<u8>> {
    use std::io::{Seek, SeekFrom};

    if demo_id >= stats.demo_count {
        return Err(StoreError::DemoNotFound);
    }
    let slot = (demo_id / stride) as usize;
    let offset = *stats.demo_offsets.get(slot).ok_or(StoreError::DemoNotFound)?;

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    for _ in 0..(demo_id % stride) {
        if codec::skip_frame(&mut file)?.is_none() {
            return Err(StoreError::DemoNotFound);
        }
    }

    let mut reader = std::io::BufReader::new(file);
    codec::read_frame(&mut reader)?.ok_or(StoreError::DemoNotFound)
}

impl DataStorage {
    /// Retrieve the `demo_id`-th demo recorded for a level.
    ///
    /// Errors: `DemoNotFound`, `StorageUnavailable`.
    pub fn get_player_demo(&self, level: LevelId, demo_id: u32) -> Result<Vec<u8>> {
        let stats = lock(&self.stats)
            .get(level)
            .cloned()
            .ok_or(StoreError::DemoNotFound)?;
        read_demo(
            &self.demo_path(level),
            &stats,
            demo_id,
            self.config.demo_index_stride,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn empty_stats() -> LevelStats {
        LevelStats {
            level: LevelId(Uuid::from_bytes([9; 16])),
            play_count: 0,
            demo_count: 0,
            demo_offsets: Vec::new(),
            leaderboards: Vec::new(),
        }
    }

    #[test]
    fn demos_read_back_across_stride_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demos");
        let mut stats = empty_stats();

        // Stride 3 over 10 demos: offsets indexed at 0, 3, 6, 9.
        for n in 0u32..10 {
            let payload = format!("demo-{n}").into_bytes();
            let (id, _) = append_demo(&path, &payload, 3, &mut stats).unwrap();
            assert_eq!(id, n);
        }
        assert_eq!(stats.demo_offsets.len(), 4);

        for n in 0u32..10 {
            let payload = read_demo(&path, &stats, n, 3).unwrap();
            assert_eq!(payload, format!("demo-{n}").into_bytes());
        }
    }

    #[test]
    fn missing_demo_number_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demos");
        let mut stats = empty_stats();
        append_demo(&path, b"only", 4, &mut stats).unwrap();

        assert!(matches!(
            read_demo(&path, &stats, 1, 4),
            Err(StoreError::DemoNotFound)
        ));
    }
}
