//! Approximate per-entity locking.
//!
//! A fixed-size array of mutexes indexed by a hash of the entity
//! identifier. Identifiers in different buckets never contend; colliding
//! identifiers serialize, which is acceptable false contention bounded by
//! 1/N. The pool owns no entity data.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

pub struct LockPool {
    locks: Vec<Mutex<()>>,
}

impl LockPool {
    pub fn new(size: usize) -> Self {
        let mut locks = Vec::with_capacity(size);
        for _ in 0..size {
            locks.push(Mutex::new(()));
        }
        Self { locks }
    }

    fn bucket(&self, id: &Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % self.locks.len()
    }

    /// Acquire the lock guarding this identifier. The guard releases on
    /// every exit path, error returns included.
    pub fn guard(&self, id: &Uuid) -> MutexGuard<'_, ()> {
        acquire(&self.locks[self.bucket(id)])
    }

    /// Acquire the locks guarding two identifiers in a fixed global order
    /// (bucket index), so concurrent cross-entity operations cannot
    /// deadlock. Identifiers sharing a bucket yield a single guard.
    pub fn guard_pair(
        &self,
        a: &Uuid,
        b: &Uuid,
    ) -> (MutexGuard<'_, ()>, Option<MutexGuard<'_, ()>>) {
        let (first, second) = {
            let ba = self.bucket(a);
            let bb = self.bucket(b);
            if ba <= bb {
                (ba, bb)
            } else {
                (bb, ba)
            }
        };
        let first_guard = acquire(&self.locks[first]);
        if first == second {
            (first_guard, None)
        } else {
            (first_guard, Some(acquire(&self.locks[second])))
        }
    }
}

// A poisoned bucket only means another thread panicked while holding it;
// the () payload cannot be left inconsistent, so recover the guard.
fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn same_id_maps_to_same_bucket() {
        let pool = LockPool::new(64);
        let id = Uuid::new_v4();
        assert_eq!(pool.bucket(&id), pool.bucket(&id));
    }

    #[test]
    fn guard_releases_on_drop() {
        let pool = LockPool::new(8);
        let id = Uuid::new_v4();
        drop(pool.guard(&id));
        // Re-acquiring must not block.
        drop(pool.guard(&id));
    }

    #[test]
    fn pair_guard_handles_shared_bucket() {
        let pool = LockPool::new(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (_g, second) = pool.guard_pair(&a, &b);
        assert!(second.is_none());
    }

    #[test]
    fn pair_guard_orders_consistently() {
        let pool = Arc::new(LockPool::new(64));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // Opposite argument orders from two threads must not deadlock.
        let pool2 = Arc::clone(&pool);
        let (a2, b2) = (a, b);
        let handle = std::thread::spawn(move || {
            for _ in 0..1000 {
                let _guards = pool2.guard_pair(&b2, &a2);
            }
        });
        for _ in 0..1000 {
            let _guards = pool.guard_pair(&a, &b);
        }
        handle.join().unwrap();
    }
}
