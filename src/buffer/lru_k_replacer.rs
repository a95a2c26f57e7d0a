use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{FrameId, Result, StrataError, Timestamp};

/// What kind of page access produced a replacer notification.
/// Currently ignored by the policy; kept so future policies can weight
/// scans differently from point lookups without an API break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Access history for a single tracked frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// Access timestamps, oldest at the front, at most `k` entries
    history: VecDeque<Timestamp>,
    /// Whether this frame may currently be evicted
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance at `now`: None stands for +inf (fewer than
    /// `k` recorded accesses).
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

/// LRU-K replacement policy.
///
/// Evicts the evictable frame with the greatest backward k-distance, the
/// time since its k-th most recent access. A frame with fewer than `k`
/// recorded accesses ranks as +inf; ties among +inf frames fall back to
/// classical LRU on the earliest recorded access.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Number of frames the pool owns; valid ids are `[0, num_frames)`
    num_frames: usize,
    /// Monotonically increasing logical clock, bumped per recorded access
    current_timestamp: AtomicU64,
    /// Access information for each tracked frame
    frame_info: Mutex<HashMap<FrameId, FrameAccessInfo>>,
    /// Number of evictable frames
    num_evictable: Mutex<usize>,
}

impl LruKReplacer {
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            k,
            num_frames,
            current_timestamp: AtomicU64::new(0),
            frame_info: Mutex::new(HashMap::new()),
            num_evictable: Mutex::new(0),
        }
    }

    /// Records an access to `frame_id` at the next logical timestamp.
    pub fn record_access(&self, frame_id: FrameId, _access_type: AccessType) -> Result<()> {
        self.check_frame_id(frame_id)?;

        let timestamp = self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        let mut frame_info = self.frame_info.lock();

        frame_info
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new)
            .record_access(timestamp, self.k);

        Ok(())
    }

    /// Marks a tracked frame evictable or pinned-in-place.
    /// Fails for out-of-range or untracked frames.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) -> Result<()> {
        self.check_frame_id(frame_id)?;

        let mut frame_info = self.frame_info.lock();
        let mut num_evictable = self.num_evictable.lock();

        let info = frame_info
            .get_mut(&frame_id)
            .ok_or(StrataError::FrameNotTracked(frame_id))?;

        if info.is_evictable != is_evictable {
            if is_evictable {
                *num_evictable += 1;
            } else {
                *num_evictable -= 1;
            }
            info.is_evictable = is_evictable;
        }

        Ok(())
    }

    /// Drops a frame from the replacer along with its history.
    /// Untracked frames are a no-op; a tracked but non-evictable frame
    /// is a caller bug and fails.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut frame_info = self.frame_info.lock();
        let mut num_evictable = self.num_evictable.lock();

        let Some(info) = frame_info.get(&frame_id) else {
            return Ok(());
        };
        if !info.is_evictable {
            return Err(StrataError::FrameNotEvictable(frame_id));
        }

        frame_info.remove(&frame_id);
        *num_evictable -= 1;
        Ok(())
    }

    /// Evicts the frame with the greatest backward k-distance, removing
    /// its history. Returns None when no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut frame_info = self.frame_info.lock();
        let mut num_evictable = self.num_evictable.lock();

        if *num_evictable == 0 {
            return None;
        }

        let now = self.current_timestamp.load(Ordering::Relaxed);

        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest: Option<Timestamp> = None;

        for (&frame_id, info) in frame_info.iter() {
            if !info.is_evictable {
                continue;
            }

            let k_dist = info.k_distance(now, self.k);
            let earliest = info.earliest_timestamp();

            let replaces = match (victim_k_dist, k_dist) {
                // +inf beats any finite distance
                (Some(_), None) => true,
                (None, Some(_)) => false,
                // both +inf: earliest first access wins
                (None, None) => match (victim_earliest, earliest) {
                    (Some(v), Some(c)) => c < v,
                    (None, Some(_)) => true,
                    _ => false,
                },
                (Some(v), Some(c)) => c > v,
            };

            if victim.is_none() || replaces {
                victim = Some(frame_id);
                victim_k_dist = k_dist;
                victim_earliest = earliest;
            }
        }

        if let Some(frame_id) = victim {
            frame_info.remove(&frame_id);
            *num_evictable -= 1;
        }

        victim
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        *self.num_evictable.lock()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn check_frame_id(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.as_usize() >= self.num_frames {
            return Err(StrataError::InvalidFrameId(frame_id));
        }
        Ok(())
    }
}
