//! Storage trait abstraction.

use async_trait::async_trait;
use coursetrack_core::{Course, CourseId, Enrollment, EnrollmentId, Lesson, LessonId, UserId};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// The stored version no longer matches the one the caller read
    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Record id
        id: String,
        /// Version the caller read
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Record store for courses, lessons and enrollments.
///
/// One handle is shared by every request, so all methods take `&self` and
/// implementations do their own locking.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Course operations ===

    /// Save a course (create or update).
    async fn save_course(&self, course: &Course) -> Result<()>;

    /// Load a course by ID.
    async fn load_course(&self, id: CourseId) -> Result<Option<Course>>;

    /// List all courses.
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Delete a course together with its lessons and enrollments.
    async fn delete_course(&self, id: CourseId) -> Result<()>;

    // === Lesson operations ===

    /// Save a lesson (create or update).
    async fn save_lesson(&self, lesson: &Lesson) -> Result<()>;

    /// Load a lesson by ID.
    async fn load_lesson(&self, id: LessonId) -> Result<Option<Lesson>>;

    /// Lessons of a course, sorted by order then id.
    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>>;

    /// Delete a lesson. Enrollments referencing it are left untouched.
    async fn delete_lesson(&self, id: LessonId) -> Result<()>;

    // === Enrollment operations ===

    /// Insert a new enrollment.
    ///
    /// Fails with [`StorageError::Duplicate`] when the (user, course) pair is
    /// already enrolled. The check and the insert are atomic.
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<()>;

    /// Load an enrollment by ID.
    async fn load_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>>;

    /// Find the enrollment of `user_id` in `course_id`.
    async fn find_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>>;

    /// Enrollments of a user, newest first.
    async fn list_enrollments(&self, user_id: UserId) -> Result<Vec<Enrollment>>;

    /// Enrollments in a course, newest first.
    async fn list_course_enrollments(&self, course_id: CourseId) -> Result<Vec<Enrollment>>;

    /// Compare-and-swap update.
    ///
    /// Succeeds only while the stored version equals `enrollment.version`; the
    /// record is written with the version incremented and returned. Otherwise
    /// fails with [`StorageError::VersionConflict`].
    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<Enrollment>;
}

pub(crate) fn sort_lessons(lessons: &mut [Lesson]) {
    lessons.sort_by_key(Lesson::sort_key);
}

pub(crate) fn sort_enrollments(enrollments: &mut [Enrollment]) {
    enrollments.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
}
