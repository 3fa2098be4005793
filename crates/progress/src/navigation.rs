//! Lesson navigation for an enrolled learner.

use coursetrack_core::{progress_percent, Enrollment, EnrollmentId, EnrollmentState, Lesson, LessonId};
use serde::Serialize;

/// One lesson of the outline with its completion flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineEntry {
    /// The lesson
    pub lesson: Lesson,
    /// Whether the learner marked it complete
    pub completed: bool,
}

/// A course's lessons in display order, annotated for one enrollment.
///
/// Progress here counts only completed ids that are still lessons of the
/// course, so it always agrees with the `completed` flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    /// Enrollment the outline was built for
    pub enrollment_id: EnrollmentId,
    /// Lessons sorted by order
    pub lessons: Vec<OutlineEntry>,
    /// Completed lessons that belong to the course
    pub completed_count: usize,
    /// Percentage complete
    pub progress: u8,
    /// State derived from `progress`
    pub state: EnrollmentState,
    /// Where the learner should pick up
    pub resume_lesson_id: Option<LessonId>,
}

impl CourseOutline {
    /// Build the outline of `lessons` for `enrollment`.
    pub fn new(enrollment: &Enrollment, mut lessons: Vec<Lesson>) -> Self {
        lessons.sort_by_key(Lesson::sort_key);

        let entries: Vec<OutlineEntry> = lessons
            .into_iter()
            .map(|lesson| OutlineEntry {
                completed: enrollment.is_lesson_completed(&lesson.id),
                lesson,
            })
            .collect();

        let completed_count = entries.iter().filter(|e| e.completed).count();
        let progress = progress_percent(completed_count, entries.len());

        let mut outline = Self {
            enrollment_id: enrollment.id,
            lessons: entries,
            completed_count,
            progress,
            state: EnrollmentState::from_progress(progress),
            resume_lesson_id: None,
        };
        outline.resume_lesson_id = outline.resume().map(|l| l.id);
        outline
    }

    /// Total lessons in the course.
    pub fn total(&self) -> usize {
        self.lessons.len()
    }

    fn position(&self, lesson_id: LessonId) -> Option<usize> {
        self.lessons.iter().position(|e| e.lesson.id == lesson_id)
    }

    /// Lesson following `lesson_id`, if any.
    pub fn next_after(&self, lesson_id: LessonId) -> Option<&Lesson> {
        let pos = self.position(lesson_id)?;
        self.lessons.get(pos + 1).map(|e| &e.lesson)
    }

    /// Lesson preceding `lesson_id`, if any.
    pub fn previous_before(&self, lesson_id: LessonId) -> Option<&Lesson> {
        let pos = self.position(lesson_id)?;
        pos.checked_sub(1)
            .and_then(|p| self.lessons.get(p))
            .map(|e| &e.lesson)
    }

    /// First incomplete lesson, or the first lesson once everything is done.
    pub fn resume(&self) -> Option<&Lesson> {
        self.lessons
            .iter()
            .find(|e| !e.completed)
            .or_else(|| self.lessons.first())
            .map(|e| &e.lesson)
    }
}
