//! Enrollment model - one learner's progress through one course.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use crate::id::{CourseId, EnrollmentId, LessonId, UserId};
use crate::Time;

/// Links one user to one course and tracks lesson completion.
///
/// `progress` and `completed_at` are derived from `completed_lessons`; only
/// [`Enrollment::apply_completion`], [`Enrollment::recompute`] and
/// [`Enrollment::sync_progress`] change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    /// Unique identifier
    pub id: EnrollmentId,

    /// Enrolled learner
    pub user_id: UserId,

    /// Enrolled course
    pub course_id: CourseId,

    /// Percentage complete (0-100)
    pub progress: u8,

    /// Lessons marked complete
    pub completed_lessons: BTreeSet<LessonId>,

    /// When enrolled, never changes
    pub enrolled_at: Time,

    /// Set while progress is 100
    pub completed_at: Option<Time>,

    /// Optimistic concurrency counter, bumped by storage on every update
    #[serde(default)]
    pub version: u64,
}

/// Where an enrollment stands, derived from its progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentState {
    /// progress == 0
    NotStarted,
    /// 0 < progress < 100
    InProgress,
    /// progress == 100
    Completed,
}

impl EnrollmentState {
    /// State for a given progress percentage.
    pub fn from_progress(progress: u8) -> Self {
        match progress {
            0 => EnrollmentState::NotStarted,
            p if p >= 100 => EnrollmentState::Completed,
            _ => EnrollmentState::InProgress,
        }
    }
}

/// Percentage of `total` lessons covered by `completed`, rounded half up and
/// clamped to 100. Zero when the course has no lessons.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed as u128;
    let total = total as u128;
    let rounded = (200 * completed + total) / (2 * total);
    rounded.min(100) as u8
}

impl Enrollment {
    /// Create a fresh enrollment in the `NotStarted` state.
    pub fn new(user_id: UserId, course_id: CourseId) -> Self {
        Self {
            id: EnrollmentId::new(),
            user_id,
            course_id,
            progress: 0,
            completed_lessons: BTreeSet::new(),
            enrolled_at: chrono::Utc::now(),
            completed_at: None,
            version: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> EnrollmentState {
        EnrollmentState::from_progress(self.progress)
    }

    /// Whether a lesson is marked complete.
    pub fn is_lesson_completed(&self, lesson_id: &LessonId) -> bool {
        self.completed_lessons.contains(lesson_id)
    }

    /// Progress this enrollment would have for a course of `total` lessons.
    pub fn progress_for(&self, total: usize) -> u8 {
        progress_percent(self.completed_lessons.len(), total)
    }

    /// Mark or unmark `lesson_id`, then recompute progress against `total`.
    ///
    /// Returns whether the completed set changed. Progress is recomputed
    /// either way.
    pub fn apply_completion(
        &mut self,
        lesson_id: LessonId,
        completed: bool,
        total: usize,
        now: Time,
    ) -> bool {
        let changed = if completed {
            self.completed_lessons.insert(lesson_id)
        } else {
            self.completed_lessons.remove(&lesson_id)
        };
        self.recompute(total, now);
        changed
    }

    /// Drop completed ids that are not in `lessons`. Returns how many were dropped.
    pub fn retain_lessons(&mut self, lessons: &HashSet<LessonId>) -> usize {
        let before = self.completed_lessons.len();
        self.completed_lessons.retain(|id| lessons.contains(id));
        before - self.completed_lessons.len()
    }

    /// Recompute `progress` and `completed_at` after a completion change.
    ///
    /// Every change that leaves the enrollment at 100 stamps `completed_at`
    /// with `now`; anything below 100 clears it.
    pub fn recompute(&mut self, total: usize, now: Time) {
        self.progress = self.progress_for(total);
        self.completed_at = (self.progress == 100).then_some(now);
    }

    /// Bring `progress` and `completed_at` in line with a course that now has
    /// `total` lessons, without a completion change.
    ///
    /// An existing completion timestamp survives while progress stays at 100.
    /// Returns whether anything changed.
    pub fn sync_progress(&mut self, total: usize, now: Time) -> bool {
        let progress = self.progress_for(total);
        let completed_at = match (progress == 100, self.completed_at) {
            (true, Some(at)) => Some(at),
            (true, None) => Some(now),
            (false, _) => None,
        };
        let changed = progress != self.progress || completed_at != self.completed_at;
        self.progress = progress;
        self.completed_at = completed_at;
        changed
    }
}
