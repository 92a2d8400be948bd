//! Per-part progress reporting

use crate::retry::OperationKind;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A completed part
#[derive(Clone, Debug)]
pub struct PartProgress {
    pub operation: OperationKind,
    /// URI of the object being transferred
    pub object: String,
    /// Unique across all parts of all transfers
    pub part_id: String,
    /// Bytes moved by this part
    pub bytes: u64,
    /// Size of the whole object
    pub total_bytes: u64,
}

/// Observer notified once per completed part
pub trait ProgressListener: Send + Sync {
    fn on_part_complete(&self, progress: &PartProgress);
}

impl<F> ProgressListener for F
where
    F: Fn(&PartProgress) + Send + Sync,
{
    fn on_part_complete(&self, progress: &PartProgress) {
        self(progress)
    }
}

/// Listener that totals progress, counting each part id once
#[derive(Debug, Default)]
pub struct ProgressTracker {
    parts: DashMap<String, u64>,
    bytes: AtomicU64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn parts_completed(&self) -> usize {
        self.parts.len()
    }
}

impl ProgressListener for ProgressTracker {
    fn on_part_complete(&self, progress: &PartProgress) {
        if self
            .parts
            .insert(progress.part_id.clone(), progress.bytes)
            .is_none()
        {
            self.bytes.fetch_add(progress.bytes, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(id: &str, bytes: u64) -> PartProgress {
        PartProgress {
            operation: OperationKind::Upload,
            object: "s3://b/k".to_string(),
            part_id: id.to_string(),
            bytes,
            total_bytes: 30,
        }
    }

    #[test]
    fn test_tracker_counts_each_part_once() {
        let tracker = ProgressTracker::new();
        tracker.on_part_complete(&part("u#1", 10));
        tracker.on_part_complete(&part("u#2", 10));
        tracker.on_part_complete(&part("u#1", 10));
        assert_eq!(tracker.parts_completed(), 2);
        assert_eq!(tracker.bytes_transferred(), 20);
    }

    #[test]
    fn test_closure_listener() {
        let seen = AtomicU64::new(0);
        let listener = |p: &PartProgress| {
            seen.fetch_add(p.bytes, Ordering::SeqCst);
        };
        listener.on_part_complete(&part("x", 5));
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
