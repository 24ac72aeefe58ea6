//! Per-device progress tracking and cross-device synchronization.
//!
//! Each device owns a strictly monotonic progress counter, incremented on
//! every accepted progress write. Associations between devices are
//! symmetric; each side tracks the counter value of its own record that
//! the peer last synchronized against, so a sync pass can ask "anything
//! new since I last looked" without re-sending known updates.

use tracing::{debug, info};

use sapphire_shared::{HardwareId, LevelId, LevelProgress};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::events::{AssociationEvent, ProgressEvent};
use crate::models::{AssociatedHardware, HardwareRecord};
use crate::storage::{lock, DataStorage};

impl DataStorage {
    /// Record that a device has seen or finished a level.
    ///
    /// State machine per (device, level): UNKNOWN -> SEEN -> FINISHED,
    /// forward-only. An accepted write increments the device's progress
    /// counter exactly once and fires the progress listener; re-reporting
    /// known state returns `ProgressUnchanged` with no side effects, so
    /// linked devices cannot trigger notification storms.
    ///
    /// The first report from an unknown device creates its record.
    ///
    /// Errors: `ProgressUnchanged`, `StorageUnavailable`.
    pub fn set_level_progress(
        &self,
        hardware: HardwareId,
        level: LevelId,
        progress: LevelProgress,
    ) -> Result<u64> {
        let _guard = self.hardware_locks.guard(&hardware.0);
        let mut record = self.hardware_record_or_new(hardware);

        let mut changed = false;
        match progress {
            // Writing "unknown" would be a regression; never accepted.
            LevelProgress::Unknown => {}
            LevelProgress::Seen => {
                if record.finished_levels.binary_search(&level).is_err() {
                    changed = insert_sorted(&mut record.seen_levels, level);
                }
            }
            LevelProgress::Finished => {
                changed = insert_sorted(&mut record.finished_levels, level);
                // Finishing implies having seen the level.
                insert_sorted(&mut record.seen_levels, level);
            }
        }
        if !changed {
            return Err(StoreError::ProgressUnchanged);
        }

        record.progress_id += 1;
        let progress_id = record.progress_id;

        codec::write_record(&self.hardware_path(hardware), &record)?;
        lock(&self.hardware).upsert(record);

        debug!(%hardware, %level, ?progress, progress_id, "progress recorded");
        self.listeners.progress.notify(&ProgressEvent {
            hardware,
            level,
            progress,
            progress_id,
        });
        Ok(progress_id)
    }

    /// The device's current progress counter. Unknown devices report 0:
    /// their first progress write creates the record.
    pub fn get_progress_id(&self, hardware: HardwareId) -> Result<u64> {
        Ok(lock(&self.hardware)
            .get(hardware)
            .map(|record| record.progress_id)
            .unwrap_or(0))
    }

    /// The seen and finished level lists for a device, both in identifier
    /// order. Unknown devices report empty lists.
    pub fn query_level_progress(
        &self,
        hardware: HardwareId,
    ) -> Result<(Vec<LevelId>, Vec<LevelId>)> {
        let index = lock(&self.hardware);
        Ok(match index.get(hardware) {
            Some(record) => (record.seen_levels.clone(), record.finished_levels.clone()),
            None => (Vec::new(), Vec::new()),
        })
    }

    /// Link two devices. Symmetric: an association entry is inserted into
    /// both records; missing records are created.
    ///
    /// Errors: `HardwareAlreadyAssociated`, `StorageUnavailable`.
    pub fn create_hardware_association(&self, a: HardwareId, b: HardwareId) -> Result<()> {
        if a == b {
            return Err(StoreError::HardwareAlreadyAssociated);
        }

        let _guards = self.hardware_locks.guard_pair(&a.0, &b.0);

        let mut record_a = self.hardware_record_or_new(a);
        let mut record_b = self.hardware_record_or_new(b);
        if record_a.association(b).is_some() {
            return Err(StoreError::HardwareAlreadyAssociated);
        }

        insert_association(&mut record_a, b);
        insert_association(&mut record_b, a);

        codec::write_record(&self.hardware_path(a), &record_a)?;
        if let Err(e) = codec::write_record(&self.hardware_path(b), &record_b) {
            // Undo the first write so the symmetry invariant holds on disk.
            let mut rollback = record_a.clone();
            if let Some(pos) = rollback.association(b) {
                rollback.associated.remove(pos);
            }
            let _ = codec::write_record(&self.hardware_path(a), &rollback);
            return Err(e);
        }

        {
            let mut index = lock(&self.hardware);
            index.upsert(record_a);
            index.upsert(record_b);
        }

        info!(hardware = %a, peer = %b, "hardware associated");
        self.listeners
            .association
            .notify(&AssociationEvent { hardware: a, peer: b });
        Ok(())
    }

    /// The peer devices linked to `hardware`, with the counter value of
    /// `hardware` each peer last synchronized against.
    pub fn query_associated_hardwares(
        &self,
        hardware: HardwareId,
    ) -> Result<Vec<AssociatedHardware>> {
        Ok(lock(&self.hardware)
            .get(hardware)
            .map(|record| record.associated.clone())
            .unwrap_or_default())
    }

    /// The counter value of `hardware` that `peer` last synchronized
    /// against.
    ///
    /// Errors: `HardwareNotAssociated`.
    pub fn get_associated_hardware_progress_id(
        &self,
        hardware: HardwareId,
        peer: HardwareId,
    ) -> Result<u64> {
        let index = lock(&self.hardware);
        let record = index
            .get(hardware)
            .ok_or(StoreError::HardwareNotAssociated)?;
        let pos = record
            .association(peer)
            .ok_or(StoreError::HardwareNotAssociated)?;
        Ok(record.associated[pos].last_synced_progress_id)
    }

    /// Advance the peer's last-synchronized marker on `hardware`'s record
    /// by one step and return the new value. Called by the sync pass after
    /// the peer consumed one update. Fires no listener: this is
    /// bookkeeping of an already-broadcast change.
    ///
    /// Errors: `HardwareNotAssociated`, `StorageUnavailable`.
    pub fn increase_associated_hardware_progress_id(
        &self,
        hardware: HardwareId,
        peer: HardwareId,
    ) -> Result<u64> {
        let _guard = self.hardware_locks.guard(&hardware.0);

        let mut record = lock(&self.hardware)
            .get(hardware)
            .cloned()
            .ok_or(StoreError::HardwareNotAssociated)?;
        let pos = record
            .association(peer)
            .ok_or(StoreError::HardwareNotAssociated)?;

        record.associated[pos].last_synced_progress_id += 1;
        let new_value = record.associated[pos].last_synced_progress_id;

        codec::write_record(&self.hardware_path(hardware), &record)?;
        lock(&self.hardware).upsert(record);
        Ok(new_value)
    }

    /// Copy the existing record or start a fresh one. Caller holds the
    /// lock-pool guard for this identifier.
    fn hardware_record_or_new(&self, hardware: HardwareId) -> HardwareRecord {
        lock(&self.hardware)
            .get(hardware)
            .cloned()
            .unwrap_or_else(|| HardwareRecord::new(hardware))
    }
}

fn insert_sorted(levels: &mut Vec<LevelId>, level: LevelId) -> bool {
    match levels.binary_search(&level) {
        Ok(_) => false,
        Err(pos) => {
            levels.insert(pos, level);
            true
        }
    }
}

fn insert_association(record: &mut HardwareRecord, peer: HardwareId) {
    if let Err(pos) = record.associated.binary_search_by_key(&peer, |a| a.peer) {
        record.associated.insert(
            pos,
            AssociatedHardware {
                peer,
                last_synced_progress_id: 0,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn open() -> (DataStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = DataStorage::open(StoreConfig::new(dir.path())).unwrap();
        (storage, dir)
    }

    fn hid(b: u8) -> HardwareId {
        HardwareId(Uuid::from_bytes([b; 16]))
    }

    fn lid(b: u8) -> LevelId {
        LevelId(Uuid::from_bytes([b; 16]))
    }

    #[test]
    fn first_report_creates_record() {
        let (storage, _dir) = open();
        let hw = hid(1);

        assert_eq!(storage.get_progress_id(hw).unwrap(), 0);
        let id = storage
            .set_level_progress(hw, lid(10), LevelProgress::Seen)
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(storage.get_progress_id(hw).unwrap(), 1);
    }

    #[test]
    fn finished_twice_increments_once() {
        let (storage, _dir) = open();
        let hw = hid(1);
        let level = lid(10);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        storage.add_progress_listener(Box::new(move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));

        storage
            .set_level_progress(hw, level, LevelProgress::Finished)
            .unwrap();
        assert!(matches!(
            storage.set_level_progress(hw, level, LevelProgress::Finished),
            Err(StoreError::ProgressUnchanged)
        ));

        assert_eq!(storage.get_progress_id(hw).unwrap(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn seen_then_finished_moves_forward() {
        let (storage, _dir) = open();
        let hw = hid(1);
        let level = lid(10);

        storage
            .set_level_progress(hw, level, LevelProgress::Seen)
            .unwrap();
        storage
            .set_level_progress(hw, level, LevelProgress::Finished)
            .unwrap();
        // Seen after finished is a regression attempt: no-op.
        assert!(matches!(
            storage.set_level_progress(hw, level, LevelProgress::Seen),
            Err(StoreError::ProgressUnchanged)
        ));

        let (seen, finished) = storage.query_level_progress(hw).unwrap();
        assert_eq!(seen, vec![level]);
        assert_eq!(finished, vec![level]);
        assert_eq!(storage.get_progress_id(hw).unwrap(), 2);
    }

    #[test]
    fn association_is_symmetric() {
        let (storage, _dir) = open();
        let (a, b) = (hid(1), hid(2));

        storage.create_hardware_association(a, b).unwrap();

        let of_a = storage.query_associated_hardwares(a).unwrap();
        let of_b = storage.query_associated_hardwares(b).unwrap();
        assert_eq!(of_a.len(), 1);
        assert_eq!(of_a[0].peer, b);
        assert_eq!(of_b.len(), 1);
        assert_eq!(of_b[0].peer, a);

        assert!(matches!(
            storage.create_hardware_association(b, a),
            Err(StoreError::HardwareAlreadyAssociated)
        ));
    }

    #[test]
    fn self_association_is_rejected() {
        let (storage, _dir) = open();
        assert!(matches!(
            storage.create_hardware_association(hid(1), hid(1)),
            Err(StoreError::HardwareAlreadyAssociated)
        ));
    }

    #[test]
    fn sync_marker_advances_independently_per_side() {
        let (storage, _dir) = open();
        let (a, b) = (hid(1), hid(2));
        storage.create_hardware_association(a, b).unwrap();

        assert_eq!(
            storage.get_associated_hardware_progress_id(a, b).unwrap(),
            0
        );
        assert_eq!(
            storage
                .increase_associated_hardware_progress_id(a, b)
                .unwrap(),
            1
        );
        assert_eq!(
            storage.get_associated_hardware_progress_id(a, b).unwrap(),
            1
        );
        // The reverse direction has its own marker.
        assert_eq!(
            storage.get_associated_hardware_progress_id(b, a).unwrap(),
            0
        );
    }

    #[test]
    fn unassociated_peer_is_an_error() {
        let (storage, _dir) = open();
        assert!(matches!(
            storage.get_associated_hardware_progress_id(hid(1), hid(2)),
            Err(StoreError::HardwareNotAssociated)
        ));
    }

    #[test]
    fn progress_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hw = hid(3);
        {
            let storage = DataStorage::open(StoreConfig::new(dir.path())).unwrap();
            storage
                .set_level_progress(hw, lid(10), LevelProgress::Finished)
                .unwrap();
            storage
                .set_level_progress(hw, lid(11), LevelProgress::Seen)
                .unwrap();
            storage.close().unwrap();
        }

        let storage = DataStorage::open(StoreConfig::new(dir.path())).unwrap();
        assert_eq!(storage.get_progress_id(hw).unwrap(), 2);
        let (seen, finished) = storage.query_level_progress(hw).unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(finished, vec![lid(10)]);
    }
}
