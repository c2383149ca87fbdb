use super::Replacer;
use crate::buffer::FrameId;
use crate::error::{BucketDBError, BucketDBResult};
use std::collections::{HashMap, VecDeque};

/// Access history of one frame: up to k timestamps, newest at the back.
#[derive(Debug)]
struct FrameHistory {
    samples: VecDeque<u64>,
    evictable: bool,
}

impl FrameHistory {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            evictable: false,
        }
    }

    fn push(&mut self, timestamp: u64, k: usize) {
        if self.samples.len() == k {
            self.samples.pop_front();
        }
        self.samples.push_back(timestamp);
    }
}

/// LRU-K replacement. A frame's priority is the age of its k-th most recent
/// access; frames that have not yet been touched k times outrank every
/// fully-sampled frame and fall back to plain LRU among themselves.
#[derive(Debug)]
pub struct LRUKReplacer {
    k: usize,
    capacity: usize,
    // logical clock, bumped once per recorded access
    clock: u64,
    evictable_count: usize,
    frames: HashMap<FrameId, FrameHistory>,
}

impl LRUKReplacer {
    pub fn with_k(capacity: usize, k: usize) -> Self {
        Self {
            k,
            capacity,
            clock: 0,
            evictable_count: 0,
            frames: HashMap::with_capacity(capacity),
        }
    }
}

impl Replacer for LRUKReplacer {
    fn new(capacity: usize) -> Self {
        const DEFAULT_K: usize = 2;
        Self::with_k(capacity, DEFAULT_K)
    }

    // Ranking victims by (has k samples, oldest retained sample) is the whole
    // algorithm: under-sampled frames sort first, and within each class the
    // smallest front timestamp is exactly the largest backward k-distance.
    fn evict(&mut self) -> Option<FrameId> {
        let victim = self
            .frames
            .iter()
            .filter(|(_, history)| history.evictable)
            .min_by_key(|(_, history)| {
                (
                    history.samples.len() >= self.k,
                    *history.samples.front().unwrap(),
                )
            })
            .map(|(frame_id, _)| *frame_id)?;

        self.frames.remove(&victim);
        self.evictable_count -= 1;
        Some(victim)
    }

    fn record_access(&mut self, frame_id: FrameId) -> BucketDBResult<()> {
        let now = self.clock;
        self.clock += 1;

        match self.frames.get_mut(&frame_id) {
            Some(history) => history.push(now, self.k),
            None => {
                if self.frames.len() == self.capacity {
                    return Err(BucketDBError::Internal(format!(
                        "replacer already tracks {} frames",
                        self.capacity
                    )));
                }
                let mut history = FrameHistory::new();
                history.push(now, self.k);
                self.frames.insert(frame_id, history);
            }
        }
        Ok(())
    }

    fn set_evictable(&mut self, frame_id: FrameId, set_evictable: bool) -> BucketDBResult<()> {
        let history = self.frames.get_mut(&frame_id).ok_or_else(|| {
            BucketDBError::Internal(format!("frame {} is not tracked by the replacer", frame_id))
        })?;
        if history.evictable != set_evictable {
            history.evictable = set_evictable;
            if set_evictable {
                self.evictable_count += 1;
            } else {
                self.evictable_count -= 1;
            }
        }
        Ok(())
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(history) = self.frames.remove(&frame_id) {
            assert!(history.evictable, "removing a pinned frame");
            self.evictable_count -= 1;
        }
    }

    fn size(&self) -> usize {
        self.evictable_count
    }
}
