//! Enrollment progress tracking.
//!
//! Enrollment creation, lesson completion with progress recomputation,
//! lesson navigation for an enrolled learner and the instructor's student
//! roster.

#![warn(missing_docs)]

pub mod tracker;
pub mod navigation;
pub mod roster;

pub use tracker::{EnrollmentTracker, MembershipPolicy, TrackerConfig, TrackerError};
pub use navigation::{CourseOutline, OutlineEntry};
pub use roster::{build_roster, CourseProgress, ProgressFilter, StudentProgress};
pub use coursetrack_core::progress_percent;
