//! Coursetrack core data models.
//!
//! This crate defines the records shared by the storage backends, the
//! enrollment progress tracker and the HTTP surface.

#![warn(missing_docs)]

// Core identities
mod id;

// Course content
mod course;
mod lesson;

// Learner state
mod enrollment;

mod error;

// Re-exports
pub use id::*;

pub use course::{slugify, Course};
pub use lesson::{Lesson, LessonUpdate};
pub use enrollment::{progress_percent, Enrollment, EnrollmentState};
pub use error::ModelError;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
