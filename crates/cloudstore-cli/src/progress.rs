//! Console progress output

use cloudstore_core::{PartProgress, ProgressListener, ProgressTracker};

/// Prints one line per completed part to stderr
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    tracker: ProgressTracker,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressListener for ConsoleProgress {
    fn on_part_complete(&self, progress: &PartProgress) {
        self.tracker.on_part_complete(progress);
        eprintln!(
            "{} {}: part done, {} of {} bytes ({} parts, {} bytes total)",
            progress.operation,
            progress.object,
            progress.bytes,
            progress.total_bytes,
            self.tracker.parts_completed(),
            self.tracker.bytes_transferred()
        );
    }
}
