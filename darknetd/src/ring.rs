//! Fixed-capacity store of the most recent detection results.
//!
//! [`DetectionRing`] keeps the last N completed [`DetectionResult`]s.
//! There is exactly one writer (the detection job) and many readers
//! (API handlers), so the ring sits behind a read-write lock: snapshots
//! never block each other and the writer only contends briefly on push.

use crate::detector::DetectionResult;
use std::collections::VecDeque;
use std::sync::RwLock;

/// Thread-safe ring buffer of detection results.
///
/// Capacity is fixed at construction. Pushing beyond capacity evicts the
/// oldest entry.
#[derive(Debug)]
pub struct DetectionRing {
    capacity: usize,
    inner: RwLock<VecDeque<DetectionResult>>,
}

impl DetectionRing {
    /// Creates a ring holding at most `capacity` results.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Inserts a result, evicting the oldest entry when full.
    pub fn push(&self, result: DetectionResult) {
        let mut ring = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(result);
    }

    /// Returns an ordered copy of the current contents, oldest first
    /// (most recent last).
    ///
    /// This ordering is stable and part of the API contract: `/objects`
    /// serializes the snapshot as-is.
    pub fn snapshot(&self) -> Vec<DetectionResult> {
        let ring = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ring.iter().cloned().collect()
    }

    /// Returns the number of stored results.
    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Returns true if no results have been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
