//! Sorted in-memory index over entity records.
//!
//! A dynamically growing vector kept sorted by primary key: binary search
//! for lookup and insertion-point computation, O(n) shifting on
//! insert/remove. Used for users, level descriptors, hardware records and
//! per-level statistics.

/// Record types stored in a [`SortedIndex`] expose their primary key.
pub trait Keyed {
    type Key: Ord + Copy;

    fn key(&self) -> Self::Key;
}

/// A duplicate-free vector of records sorted by key.
#[derive(Debug, Clone)]
pub struct SortedIndex<T: Keyed> {
    records: Vec<T>,
}

impl<T: Keyed> SortedIndex<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, key: T::Key) -> std::result::Result<usize, usize> {
        self.records.binary_search_by_key(&key, |r| r.key())
    }

    /// Binary-search lookup. Missing keys are an expected case, not an
    /// error; callers decide.
    pub fn get(&self, key: T::Key) -> Option<&T> {
        self.position(key).ok().map(|pos| &self.records[pos])
    }

    pub fn get_mut(&mut self, key: T::Key) -> Option<&mut T> {
        match self.position(key) {
            Ok(pos) => Some(&mut self.records[pos]),
            Err(_) => None,
        }
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.position(key).is_ok()
    }

    /// Insert a record at its sorted position. Returns `false` (and leaves
    /// the index untouched) if a record with the same key already exists.
    pub fn insert(&mut self, record: T) -> bool {
        match self.position(record.key()) {
            Ok(_) => false,
            Err(pos) => {
                self.records.insert(pos, record);
                true
            }
        }
    }

    /// Insert or overwrite the record with this key.
    pub fn upsert(&mut self, record: T) {
        match self.position(record.key()) {
            Ok(pos) => self.records[pos] = record,
            Err(pos) => self.records.insert(pos, record),
        }
    }

    /// Remove and return the record with this key, if present.
    pub fn remove(&mut self, key: T::Key) -> Option<T> {
        match self.position(key) {
            Ok(pos) => Some(self.records.remove(pos)),
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }
}

impl<T: Keyed> Default for SortedIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
