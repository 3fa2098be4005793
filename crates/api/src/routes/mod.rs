//! Request handlers.

pub mod courses;
pub mod enrollments;
pub mod instructor;
