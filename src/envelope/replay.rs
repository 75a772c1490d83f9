//! Bounded tracking of recently-seen message ids, used to admit messages
//! whose timestamp falls outside the replay window but which genuinely
//! have not been seen before (e.g. a peer with a skewed clock).

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Instant;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 4096;

pub struct ReplayGuard {
    seen: Mutex<LruCache<Uuid, Instant>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    /// Returns `true` if `id` had not been recorded before (and records it
    /// now); `false` if it was already seen.
    pub fn check_and_record(&self, id: Uuid) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(&id) {
            false
        } else {
            seen.put(id, Instant::now());
            true
        }
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}
