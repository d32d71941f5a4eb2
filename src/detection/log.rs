//! Pose log
//!
//! Append-only, time-ordered list of metric snapshots for one session.

use crate::metrics::MetricSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct PoseLog {
    entries: Arc<RwLock<Vec<MetricSnapshot>>>,
}

impl PoseLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot. A timestamp earlier than the last entry is clamped
    /// to it so the log stays non-decreasing.
    pub fn append(&self, mut snapshot: MetricSnapshot) {
        let mut entries = self.entries.write();
        if let Some(last) = entries.last() {
            if snapshot.t < last.t {
                tracing::debug!(
                    "Source time went backwards ({:.3}s < {:.3}s), clamping",
                    snapshot.t,
                    last.t
                );
                snapshot.t = last.t;
            }
        }
        entries.push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Time of the newest entry
    pub fn last_timestamp(&self) -> Option<f64> {
        self.entries.read().last().map(|s| s.t)
    }

    /// Copy of all entries
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.entries.read().clone()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
