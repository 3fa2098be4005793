//! Shared application state.

use std::sync::Arc;

use coursetrack_progress::EnrollmentTracker;
use coursetrack_storage::Storage;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Enrollment progress tracker, which also owns the storage handle
    pub tracker: EnrollmentTracker,
}

impl AppState {
    /// Wrap a tracker.
    pub fn new(tracker: EnrollmentTracker) -> Self {
        Self { tracker }
    }

    /// Record store behind the tracker.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.tracker.storage()
    }
}
