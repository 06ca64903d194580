//! Start timestamps keyed by frame identity.
//!
//! An entry lives from a frame's `call` event to its first `return`. The
//! return removes it, so an identity the host later reuses for an unrelated
//! frame can never pick up a stale start time. Frames that never return leave
//! their entry behind until the table itself is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use crate::frame::FrameId;

#[derive(Debug, Default)]
pub struct TimingTable {
    starts: Mutex<HashMap<FrameId, Duration>>,
}

impl TimingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of `id`. Overwrites any leftover entry for the same
    /// identity.
    pub fn start(&self, id: FrameId, now: Duration) {
        self.starts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, now);
    }

    /// Remove the entry for `id` and return the time since its start.
    /// `None` when no call was recorded for this identity.
    pub fn finish(&self, id: FrameId, now: Duration) -> Option<Duration> {
        let start = self
            .starts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)?;
        Some(now.saturating_sub(start))
    }

    pub fn len(&self) -> usize {
        self.starts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Elapsed time annotation, shown as `time_sec=[S.SSSS]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingProbe(pub Duration);

impl fmt::Display for TimingProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "time_sec=[{:.4}]", self.0.as_secs_f64())
    }
}
