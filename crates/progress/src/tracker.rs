//! Enrollment progress tracker.
//!
//! Owns the relationship between a learner, a course and the learner's
//! completed lessons. Every mutation recomputes `progress` and
//! `completed_at` from the completed set and is written back with a
//! compare-and-swap, so concurrent completions of the same enrollment never
//! overwrite each other.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use coursetrack_core::{
    progress_percent, CourseId, Enrollment, EnrollmentId, Lesson, LessonId, Time, UserId,
};
use coursetrack_storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::navigation::CourseOutline;
use crate::roster::{build_roster, ProgressFilter, StudentProgress};

/// Error type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors returned by the tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The referenced course does not exist
    #[error("Course not found: {0}")]
    CourseNotFound(CourseId),

    /// The referenced enrollment does not exist
    #[error("Enrollment not found: {0}")]
    EnrollmentNotFound(EnrollmentId),

    /// The user is already enrolled in the course
    #[error("Already enrolled in course {course_id}")]
    DuplicateEnrollment {
        /// Enrolled user
        user_id: UserId,
        /// Course of the existing enrollment
        course_id: CourseId,
    },

    /// The caller does not own the enrollment
    #[error("Unauthorized")]
    Unauthorized,

    /// The lesson is not part of the enrollment's course
    #[error("Lesson {lesson_id} does not belong to course {course_id}")]
    LessonNotInCourse {
        /// Rejected lesson
        lesson_id: LessonId,
        /// Course of the enrollment
        course_id: CourseId,
    },

    /// Concurrent writers kept winning the version check
    #[error("Enrollment {id} is being updated concurrently, gave up after {attempts} attempts")]
    Conflict {
        /// Contended enrollment
        id: EnrollmentId,
        /// Attempts made
        attempts: u32,
    },

    /// Storage layer failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// How lesson ids that are not part of the course are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipPolicy {
    /// Reject foreign ids when marking and prune ids of removed lessons, so
    /// the completed set is always a subset of the course's lessons.
    #[default]
    Enforce,
    /// Accept any id; progress is clamped at 100.
    Tolerate,
}

impl FromStr for MembershipPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enforce" => Ok(MembershipPolicy::Enforce),
            "tolerate" => Ok(MembershipPolicy::Tolerate),
            other => Err(format!("unknown membership policy `{other}`, expected enforce or tolerate")),
        }
    }
}

/// Tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Lesson membership handling
    pub membership: MembershipPolicy,

    /// Read-modify-write attempts before giving up on a contended enrollment
    pub max_update_attempts: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            membership: MembershipPolicy::Enforce,
            max_update_attempts: 5,
        }
    }
}

/// Enrollment progress tracker.
#[derive(Clone)]
pub struct EnrollmentTracker {
    storage: Arc<dyn Storage>,
    config: TrackerConfig,
}

impl EnrollmentTracker {
    /// Create a tracker over `storage` with the default config.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            config: TrackerConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Underlying record store.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Progress of `enrollment` in a course of `total_lessons`.
    pub fn progress_percent(enrollment: &Enrollment, total_lessons: usize) -> u8 {
        progress_percent(enrollment.completed_lessons.len(), total_lessons)
    }

    /// Enroll `user_id` in `course_id`.
    #[instrument(skip(self))]
    pub async fn create_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Enrollment> {
        if self.storage.load_course(course_id).await?.is_none() {
            return Err(TrackerError::CourseNotFound(course_id));
        }

        let enrollment = Enrollment::new(user_id, course_id);
        match self.storage.insert_enrollment(&enrollment).await {
            Ok(()) => {}
            Err(StorageError::Duplicate(_)) => {
                return Err(TrackerError::DuplicateEnrollment { user_id, course_id });
            }
            Err(e) => return Err(e.into()),
        }

        info!(enrollment = %enrollment.id, "enrolled");
        Ok(enrollment)
    }

    /// Mark (`completed == true`) or unmark a lesson and recompute progress.
    ///
    /// `caller` must own the enrollment. The whole read-modify-write is
    /// retried when another writer updated the enrollment in between.
    #[instrument(skip(self))]
    pub async fn set_lesson_completion(
        &self,
        caller: UserId,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        completed: bool,
    ) -> Result<Enrollment> {
        let attempts = self.config.max_update_attempts.max(1);

        for attempt in 1..=attempts {
            let mut enrollment = self.load_owned(caller, enrollment_id).await?;

            let lessons = self.storage.list_lessons(enrollment.course_id).await?;
            let total = lessons.len();

            if self.config.membership == MembershipPolicy::Enforce {
                let lesson_ids: HashSet<LessonId> = lessons.iter().map(|l| l.id).collect();
                if completed && !lesson_ids.contains(&lesson_id) {
                    return Err(TrackerError::LessonNotInCourse {
                        lesson_id,
                        course_id: enrollment.course_id,
                    });
                }
                let pruned = enrollment.retain_lessons(&lesson_ids);
                if pruned > 0 {
                    debug!(pruned, "dropped completed ids of removed lessons");
                }
            }

            let before = enrollment.state();
            enrollment.apply_completion(lesson_id, completed, total, Utc::now());

            match self.storage.update_enrollment(&enrollment).await {
                Ok(stored) => {
                    if stored.state() != before {
                        info!(from = ?before, to = ?stored.state(), progress = stored.progress, "enrollment state changed");
                    }
                    return Ok(stored);
                }
                Err(StorageError::VersionConflict { expected, found, .. }) => {
                    warn!(attempt, expected, found, "concurrent update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TrackerError::Conflict {
            id: enrollment_id,
            attempts,
        })
    }

    /// Load an enrollment owned by `caller`, with progress reflecting the
    /// course's current lessons.
    pub async fn get_enrollment(
        &self,
        caller: UserId,
        enrollment_id: EnrollmentId,
    ) -> Result<Enrollment> {
        let mut enrollment = self.load_owned(caller, enrollment_id).await?;
        let lessons = self.storage.list_lessons(enrollment.course_id).await?;
        self.refresh(&mut enrollment, &lessons, Utc::now());
        Ok(enrollment)
    }

    /// All enrollments of `user_id`, newest first.
    pub async fn list_enrollments(&self, user_id: UserId) -> Result<Vec<Enrollment>> {
        let mut enrollments = self.storage.list_enrollments(user_id).await?;
        let mut lessons: HashMap<CourseId, Vec<Lesson>> = HashMap::new();
        let now = Utc::now();
        for enrollment in &mut enrollments {
            if !lessons.contains_key(&enrollment.course_id) {
                let course_lessons = self.storage.list_lessons(enrollment.course_id).await?;
                lessons.insert(enrollment.course_id, course_lessons);
            }
            if let Some(course_lessons) = lessons.get(&enrollment.course_id) {
                self.refresh(enrollment, course_lessons, now);
            }
        }
        Ok(enrollments)
    }

    /// The enrollment of `user_id` in `course_id`, if any.
    pub async fn enrollment_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>> {
        let Some(mut enrollment) = self.storage.find_enrollment(user_id, course_id).await? else {
            return Ok(None);
        };
        let lessons = self.storage.list_lessons(course_id).await?;
        self.refresh(&mut enrollment, &lessons, Utc::now());
        Ok(Some(enrollment))
    }

    /// Lesson outline of an enrollment owned by `caller`.
    pub async fn course_outline(
        &self,
        caller: UserId,
        enrollment_id: EnrollmentId,
    ) -> Result<CourseOutline> {
        let enrollment = self.load_owned(caller, enrollment_id).await?;
        let lessons = self.storage.list_lessons(enrollment.course_id).await?;
        Ok(CourseOutline::new(&enrollment, lessons))
    }

    /// Rewrite the stored progress of every enrollment in `course_id` after
    /// its lesson set changed. Returns how many enrollments were updated.
    #[instrument(skip(self))]
    pub async fn resync_course(&self, course_id: CourseId) -> Result<usize> {
        let lessons = self.storage.list_lessons(course_id).await?;
        let mut updated = 0;
        for enrollment in self.storage.list_course_enrollments(course_id).await? {
            if self.resync_enrollment(enrollment, &lessons).await? {
                updated += 1;
            }
        }
        debug!(lessons = lessons.len(), updated, "course enrollments resynced");
        Ok(updated)
    }

    /// Students enrolled in the courses `instructor` teaches, optionally
    /// narrowed to one course.
    pub async fn student_roster(
        &self,
        instructor: UserId,
        course_id: Option<CourseId>,
        filter: ProgressFilter,
    ) -> Result<Vec<StudentProgress>> {
        let courses = self
            .storage
            .list_courses()
            .await?
            .into_iter()
            .filter(|c| c.instructor_id == instructor)
            .filter(|c| course_id.map_or(true, |id| c.id == id));

        let now = Utc::now();
        let mut entries = Vec::new();
        for course in courses {
            let lessons = self.storage.list_lessons(course.id).await?;
            for mut enrollment in self.storage.list_course_enrollments(course.id).await? {
                self.refresh(&mut enrollment, &lessons, now);
                entries.push((course.clone(), enrollment));
            }
        }
        Ok(build_roster(entries, filter))
    }

    async fn resync_enrollment(&self, mut enrollment: Enrollment, lessons: &[Lesson]) -> Result<bool> {
        let attempts = self.config.max_update_attempts.max(1);

        for attempt in 1..=attempts {
            if !self.refresh(&mut enrollment, lessons, Utc::now()) {
                return Ok(false);
            }
            match self.storage.update_enrollment(&enrollment).await {
                Ok(_) => return Ok(true),
                Err(StorageError::VersionConflict { expected, found, .. }) => {
                    warn!(attempt, expected, found, "concurrent update during resync, retrying");
                    match self.storage.load_enrollment(enrollment.id).await? {
                        Some(current) => enrollment = current,
                        None => return Ok(false),
                    }
                }
                // Removed together with its course.
                Err(StorageError::NotFound(_)) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }

        Err(TrackerError::Conflict {
            id: enrollment.id,
            attempts,
        })
    }

    /// Align `enrollment` with `lessons` without a completion change.
    /// Returns whether anything changed.
    fn refresh(&self, enrollment: &mut Enrollment, lessons: &[Lesson], now: Time) -> bool {
        let mut pruned = 0;
        if self.config.membership == MembershipPolicy::Enforce {
            let lesson_ids: HashSet<LessonId> = lessons.iter().map(|l| l.id).collect();
            pruned = enrollment.retain_lessons(&lesson_ids);
        }
        let synced = enrollment.sync_progress(lessons.len(), now);
        pruned > 0 || synced
    }

    async fn load_owned(&self, caller: UserId, enrollment_id: EnrollmentId) -> Result<Enrollment> {
        let enrollment = self
            .storage
            .load_enrollment(enrollment_id)
            .await?
            .ok_or(TrackerError::EnrollmentNotFound(enrollment_id))?;

        if enrollment.user_id != caller {
            warn!(enrollment = %enrollment_id, caller = %caller, "caller does not own enrollment");
            return Err(TrackerError::Unauthorized);
        }
        Ok(enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursetrack_core::{Course, EnrollmentState, Lesson};
    use coursetrack_storage::JsonStorage;

    struct Fixture {
        _dir: tempfile::TempDir,
        tracker: EnrollmentTracker,
        course: Course,
        lessons: Vec<Lesson>,
    }

    async fn fixture(lesson_count: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());

        let course = Course::new("Rust Basics", "", UserId::new()).unwrap();
        storage.save_course(&course).await.unwrap();

        let mut lessons = Vec::new();
        for order in 1..=lesson_count {
            let lesson = Lesson::new(course.id, format!("Lesson {order}"), "v.mp4", order).unwrap();
            storage.save_lesson(&lesson).await.unwrap();
            lessons.push(lesson);
        }

        Fixture {
            _dir: dir,
            tracker: EnrollmentTracker::new(storage),
            course,
            lessons,
        }
    }

    #[tokio::test]
    async fn test_create_enrollment() {
        let f = fixture(2).await;
        let user = UserId::new();
        let enrollment = f.tracker.create_enrollment(user, f.course.id).await.unwrap();

        assert_eq!(enrollment.progress, 0);
        assert!(enrollment.completed_lessons.is_empty());
        assert!(enrollment.completed_at.is_none());
        assert_eq!(enrollment.state(), EnrollmentState::NotStarted);

        let found = f.tracker.enrollment_for_course(user, f.course.id).await.unwrap();
        assert_eq!(found, Some(enrollment));
    }

    #[tokio::test]
    async fn test_create_enrollment_unknown_course() {
        let f = fixture(0).await;
        let missing = CourseId::new();
        let err = f.tracker.create_enrollment(UserId::new(), missing).await.unwrap_err();
        assert!(matches!(err, TrackerError::CourseNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_keeps_first() {
        let f = fixture(2).await;
        let user = UserId::new();
        let first = f.tracker.create_enrollment(user, f.course.id).await.unwrap();
        f.tracker
            .set_lesson_completion(user, first.id, f.lessons[0].id, true)
            .await
            .unwrap();
        let before = f.tracker.get_enrollment(user, first.id).await.unwrap();

        let err = f.tracker.create_enrollment(user, f.course.id).await.unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateEnrollment { .. }));

        let after = f.tracker.get_enrollment(user, first.id).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(f.tracker.list_enrollments(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_four_lesson_scenario() {
        let f = fixture(4).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;
        let [a, b, c, d] = [0, 1, 2, 3].map(|i| f.lessons[i].id);

        f.tracker.set_lesson_completion(user, id, a, true).await.unwrap();
        let e = f.tracker.set_lesson_completion(user, id, b, true).await.unwrap();
        assert_eq!(e.progress, 50);
        assert!(e.completed_at.is_none());

        let e = f.tracker.set_lesson_completion(user, id, c, true).await.unwrap();
        assert_eq!(e.progress, 75);

        let e = f.tracker.set_lesson_completion(user, id, d, true).await.unwrap();
        assert_eq!(e.progress, 100);
        let completed_at = e.completed_at.expect("completed_at set at 100");
        assert!(Utc::now() - completed_at < chrono::Duration::seconds(5));

        let e = f.tracker.set_lesson_completion(user, id, d, false).await.unwrap();
        assert_eq!(e.progress, 75);
        assert!(e.completed_at.is_none());
        assert_eq!(e.state(), EnrollmentState::InProgress);
    }

    #[tokio::test]
    async fn test_mark_twice_and_unmark_absent() {
        let f = fixture(3).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;

        let once = f.tracker.set_lesson_completion(user, id, f.lessons[0].id, true).await.unwrap();
        let twice = f.tracker.set_lesson_completion(user, id, f.lessons[0].id, true).await.unwrap();
        assert_eq!(once.completed_lessons, twice.completed_lessons);
        assert_eq!(once.progress, twice.progress);

        let unmarked = f.tracker.set_lesson_completion(user, id, f.lessons[1].id, false).await.unwrap();
        assert_eq!(unmarked.completed_lessons, twice.completed_lessons);
        assert_eq!(unmarked.progress, 33);
    }

    #[tokio::test]
    async fn test_any_order_reaches_completion() {
        let f = fixture(3).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;

        for i in [2, 0, 1] {
            f.tracker.set_lesson_completion(user, id, f.lessons[i].id, true).await.unwrap();
        }
        let e = f.tracker.get_enrollment(user, id).await.unwrap();
        assert_eq!(e.progress, 100);
        assert!(e.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_completions_all_land() {
        let f = fixture(3).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;
        let tracker = f.tracker.clone().with_config(TrackerConfig {
            max_update_attempts: 10,
            ..TrackerConfig::default()
        });

        let handles: Vec<_> = f
            .lessons
            .iter()
            .map(|lesson| {
                let tracker = tracker.clone();
                let lesson_id = lesson.id;
                tokio::spawn(async move {
                    tracker.set_lesson_completion(user, id, lesson_id, true).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let e = tracker.get_enrollment(user, id).await.unwrap();
        assert_eq!(e.completed_lessons.len(), 3);
        assert_eq!(e.progress, 100);
        assert!(e.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_not_found_and_unauthorized() {
        let f = fixture(1).await;
        let owner = UserId::new();
        let id = f.tracker.create_enrollment(owner, f.course.id).await.unwrap().id;

        let missing = EnrollmentId::new();
        let err = f
            .tracker
            .set_lesson_completion(owner, missing, f.lessons[0].id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::EnrollmentNotFound(e) if e == missing));

        let err = f
            .tracker
            .set_lesson_completion(UserId::new(), id, f.lessons[0].id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Unauthorized));

        let untouched = f.tracker.get_enrollment(owner, id).await.unwrap();
        assert_eq!(untouched.progress, 0);
    }

    #[tokio::test]
    async fn test_enforce_rejects_foreign_lesson() {
        let f = fixture(2).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;

        let err = f
            .tracker
            .set_lesson_completion(user, id, LessonId::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::LessonNotInCourse { .. }));

        // Unmarking an unknown id is still a harmless no-op.
        let e = f.tracker.set_lesson_completion(user, id, LessonId::new(), false).await.unwrap();
        assert_eq!(e.progress, 0);
    }

    #[tokio::test]
    async fn test_enforce_prunes_deleted_lessons() {
        let f = fixture(2).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;
        f.tracker.set_lesson_completion(user, id, f.lessons[0].id, true).await.unwrap();
        f.tracker.set_lesson_completion(user, id, f.lessons[1].id, true).await.unwrap();

        f.tracker.storage().delete_lesson(f.lessons[1].id).await.unwrap();
        let extra = Lesson::new(f.course.id, "Bonus", "v.mp4", 3).unwrap();
        f.tracker.storage().save_lesson(&extra).await.unwrap();

        let e = f.tracker.set_lesson_completion(user, id, extra.id, false).await.unwrap();
        assert!(!e.completed_lessons.contains(&f.lessons[1].id));
        assert_eq!(e.completed_lessons.len(), 1);
        assert_eq!(e.progress, 50);
    }

    #[tokio::test]
    async fn test_tolerate_clamps_progress() {
        let f = fixture(1).await;
        let tracker = f.tracker.clone().with_config(TrackerConfig {
            membership: MembershipPolicy::Tolerate,
            ..TrackerConfig::default()
        });
        let user = UserId::new();
        let id = tracker.create_enrollment(user, f.course.id).await.unwrap().id;

        tracker.set_lesson_completion(user, id, LessonId::new(), true).await.unwrap();
        let e = tracker.set_lesson_completion(user, id, f.lessons[0].id, true).await.unwrap();
        assert_eq!(e.completed_lessons.len(), 2);
        assert_eq!(e.progress, 100);
        assert!(e.completed_at.is_some());
        assert_eq!(EnrollmentTracker::progress_percent(&e, 1), 100);
    }

    #[tokio::test]
    async fn test_course_outline() {
        let f = fixture(3).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;
        f.tracker.set_lesson_completion(user, id, f.lessons[0].id, true).await.unwrap();

        let outline = f.tracker.course_outline(user, id).await.unwrap();
        assert_eq!(outline.total(), 3);
        assert_eq!(outline.resume_lesson_id, Some(f.lessons[1].id));

        let err = f.tracker.course_outline(UserId::new(), id).await.unwrap_err();
        assert!(matches!(err, TrackerError::Unauthorized));
    }

    #[tokio::test]
    async fn test_lesson_added_after_completion() {
        let f = fixture(1).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;
        let done = f.tracker.set_lesson_completion(user, id, f.lessons[0].id, true).await.unwrap();
        assert_eq!(done.state(), EnrollmentState::Completed);

        let extra = Lesson::new(f.course.id, "Bonus", "v.mp4", 2).unwrap();
        f.tracker.storage().save_lesson(&extra).await.unwrap();

        let e = f.tracker.get_enrollment(user, id).await.unwrap();
        assert_eq!(e.progress, 50);
        assert_eq!(e.state(), EnrollmentState::InProgress);
        assert!(e.completed_at.is_none());

        let listed = f.tracker.list_enrollments(user).await.unwrap();
        assert_eq!(listed[0].progress, 50);
        let found = f.tracker.enrollment_for_course(user, f.course.id).await.unwrap().unwrap();
        assert!(found.completed_at.is_none());

        // Persisted once the course is resynced.
        assert_eq!(f.tracker.resync_course(f.course.id).await.unwrap(), 1);
        let stored = f.tracker.storage().load_enrollment(id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 50);
        assert!(stored.completed_at.is_none());
        assert_eq!(f.tracker.resync_course(f.course.id).await.unwrap(), 0);

        f.tracker.storage().delete_lesson(extra.id).await.unwrap();
        f.tracker.resync_course(f.course.id).await.unwrap();
        let stored = f.tracker.storage().load_enrollment(id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 100);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_zero_lesson_course() {
        let f = fixture(0).await;
        let user = UserId::new();
        let id = f.tracker.create_enrollment(user, f.course.id).await.unwrap().id;

        let err = f
            .tracker
            .set_lesson_completion(user, id, LessonId::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::LessonNotInCourse { .. }));

        let tracker = f.tracker.clone().with_config(TrackerConfig {
            membership: MembershipPolicy::Tolerate,
            ..TrackerConfig::default()
        });
        for _ in 0..3 {
            let e = tracker.set_lesson_completion(user, id, LessonId::new(), true).await.unwrap();
            assert_eq!(e.progress, 0);
            assert!(e.completed_at.is_none());
        }
        let e = tracker.get_enrollment(user, id).await.unwrap();
        assert_eq!(e.completed_lessons.len(), 3);
        assert_eq!(e.state(), EnrollmentState::NotStarted);
    }

    /// Storage whose enrollment updates always lose the race.
    struct AlwaysStale(JsonStorage);

    #[async_trait::async_trait]
    impl Storage for AlwaysStale {
        async fn save_course(&self, course: &Course) -> coursetrack_storage::Result<()> {
            self.0.save_course(course).await
        }
        async fn load_course(&self, id: CourseId) -> coursetrack_storage::Result<Option<Course>> {
            self.0.load_course(id).await
        }
        async fn list_courses(&self) -> coursetrack_storage::Result<Vec<Course>> {
            self.0.list_courses().await
        }
        async fn delete_course(&self, id: CourseId) -> coursetrack_storage::Result<()> {
            self.0.delete_course(id).await
        }
        async fn save_lesson(&self, lesson: &Lesson) -> coursetrack_storage::Result<()> {
            self.0.save_lesson(lesson).await
        }
        async fn load_lesson(&self, id: LessonId) -> coursetrack_storage::Result<Option<Lesson>> {
            self.0.load_lesson(id).await
        }
        async fn list_lessons(&self, course_id: CourseId) -> coursetrack_storage::Result<Vec<Lesson>> {
            self.0.list_lessons(course_id).await
        }
        async fn delete_lesson(&self, id: LessonId) -> coursetrack_storage::Result<()> {
            self.0.delete_lesson(id).await
        }
        async fn insert_enrollment(&self, enrollment: &Enrollment) -> coursetrack_storage::Result<()> {
            self.0.insert_enrollment(enrollment).await
        }
        async fn load_enrollment(&self, id: EnrollmentId) -> coursetrack_storage::Result<Option<Enrollment>> {
            self.0.load_enrollment(id).await
        }
        async fn find_enrollment(
            &self,
            user_id: UserId,
            course_id: CourseId,
        ) -> coursetrack_storage::Result<Option<Enrollment>> {
            self.0.find_enrollment(user_id, course_id).await
        }
        async fn list_enrollments(&self, user_id: UserId) -> coursetrack_storage::Result<Vec<Enrollment>> {
            self.0.list_enrollments(user_id).await
        }
        async fn list_course_enrollments(
            &self,
            course_id: CourseId,
        ) -> coursetrack_storage::Result<Vec<Enrollment>> {
            self.0.list_course_enrollments(course_id).await
        }
        async fn update_enrollment(&self, enrollment: &Enrollment) -> coursetrack_storage::Result<Enrollment> {
            Err(StorageError::VersionConflict {
                id: enrollment.id.to_string(),
                expected: enrollment.version,
                found: enrollment.version + 1,
            })
        }
    }

    #[tokio::test]
    async fn test_conflict_after_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(AlwaysStale(JsonStorage::new(dir.path()).await.unwrap()));
        let course = Course::new("Rust Basics", "", UserId::new()).unwrap();
        storage.save_course(&course).await.unwrap();
        let lesson = Lesson::new(course.id, "Intro", "v.mp4", 1).unwrap();
        storage.save_lesson(&lesson).await.unwrap();

        let tracker = EnrollmentTracker::new(storage).with_config(TrackerConfig {
            max_update_attempts: 3,
            ..TrackerConfig::default()
        });
        let user = UserId::new();
        let id = tracker.create_enrollment(user, course.id).await.unwrap().id;

        let err = tracker.set_lesson_completion(user, id, lesson.id, true).await.unwrap_err();
        assert!(matches!(err, TrackerError::Conflict { id: e, attempts: 3 } if e == id));

        let untouched = tracker.get_enrollment(user, id).await.unwrap();
        assert!(untouched.completed_lessons.is_empty());
    }

    #[tokio::test]
    async fn test_student_roster() {
        let f = fixture(2).await;
        let instructor = f.course.instructor_id;
        let other_course = Course::new("Go Basics", "", instructor).unwrap();
        f.tracker.storage().save_course(&other_course).await.unwrap();

        let alice = UserId::new();
        let bob = UserId::new();
        let a = f.tracker.create_enrollment(alice, f.course.id).await.unwrap().id;
        f.tracker.create_enrollment(alice, other_course.id).await.unwrap();
        f.tracker.create_enrollment(bob, f.course.id).await.unwrap();
        f.tracker.set_lesson_completion(alice, a, f.lessons[0].id, true).await.unwrap();
        f.tracker.set_lesson_completion(alice, a, f.lessons[1].id, true).await.unwrap();

        let roster = f.tracker.student_roster(instructor, None, ProgressFilter::All).await.unwrap();
        assert_eq!(roster.len(), 2);
        let alice_row = roster.iter().find(|s| s.user_id == alice).unwrap();
        assert_eq!(alice_row.total_enrollments, 2);
        assert_eq!(alice_row.average_progress, 50);
        assert_eq!(alice_row.completed_courses, 1);

        let finished = f
            .tracker
            .student_roster(instructor, Some(f.course.id), ProgressFilter::Completed)
            .await
            .unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].user_id, alice);
        assert_eq!(finished[0].total_enrollments, 1);

        let strangers = f.tracker.student_roster(UserId::new(), None, ProgressFilter::All).await.unwrap();
        assert!(strangers.is_empty());
    }

    #[test]
    fn test_membership_policy_parse() {
        assert_eq!("Enforce".parse::<MembershipPolicy>().unwrap(), MembershipPolicy::Enforce);
        assert_eq!("tolerate".parse::<MembershipPolicy>().unwrap(), MembershipPolicy::Tolerate);
        assert!("strict".parse::<MembershipPolicy>().is_err());
    }
}
