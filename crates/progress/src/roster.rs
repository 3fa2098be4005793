//! Per-student progress across an instructor's courses.

use std::collections::BTreeMap;
use std::str::FromStr;

use coursetrack_core::{Course, CourseId, Enrollment, Time, UserId};
use serde::{Deserialize, Serialize};

/// Which students a roster keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressFilter {
    /// Everyone
    #[default]
    All,
    /// Average progress is 0
    NotStarted,
    /// Average progress strictly between 0 and 100
    InProgress,
    /// At least one course finished
    Completed,
}

impl ProgressFilter {
    /// Whether `student` passes the filter.
    pub fn matches(&self, student: &StudentProgress) -> bool {
        match self {
            ProgressFilter::All => true,
            ProgressFilter::NotStarted => student.average_progress == 0,
            ProgressFilter::InProgress => {
                student.average_progress > 0 && student.average_progress < 100
            }
            ProgressFilter::Completed => student.completed_courses > 0,
        }
    }
}

impl FromStr for ProgressFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ProgressFilter::All),
            "not-started" => Ok(ProgressFilter::NotStarted),
            "in-progress" => Ok(ProgressFilter::InProgress),
            "completed" => Ok(ProgressFilter::Completed),
            other => Err(format!(
                "unknown progress filter `{other}`, expected all, not-started, in-progress or completed"
            )),
        }
    }
}

/// One enrollment as the instructor sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    /// Course
    pub course_id: CourseId,
    /// Course title
    pub title: String,
    /// Course slug
    pub slug: String,
    /// Percentage complete
    pub progress: u8,
    /// Lessons marked complete
    pub completed_lessons: usize,
    /// When enrolled
    pub enrolled_at: Time,
    /// When completed, if at 100
    pub completed_at: Option<Time>,
}

/// A student with their enrollments in the instructor's courses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    /// The student
    pub user_id: UserId,
    /// Newest enrollment first
    pub enrolled_courses: Vec<CourseProgress>,
    /// Number of enrollments listed
    pub total_enrollments: usize,
    /// Mean progress, rounded half up
    pub average_progress: u8,
    /// Enrollments at 100
    pub completed_courses: usize,
}

impl StudentProgress {
    fn new(user_id: UserId, mut enrolled_courses: Vec<CourseProgress>) -> Self {
        enrolled_courses.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));

        let total = enrolled_courses.len();
        let sum: usize = enrolled_courses.iter().map(|c| usize::from(c.progress)).sum();
        let average_progress = if total == 0 {
            0
        } else {
            ((2 * sum + total) / (2 * total)).min(100) as u8
        };

        Self {
            user_id,
            total_enrollments: total,
            average_progress,
            completed_courses: enrolled_courses.iter().filter(|c| c.progress == 100).count(),
            enrolled_courses,
        }
    }

    /// Most recent enrollment time.
    pub fn latest_enrollment(&self) -> Option<Time> {
        self.enrolled_courses.iter().map(|c| c.enrolled_at).max()
    }
}

/// Group `(course, enrollment)` pairs by student, apply `filter` and order
/// students by their most recent enrollment.
pub fn build_roster(
    entries: impl IntoIterator<Item = (Course, Enrollment)>,
    filter: ProgressFilter,
) -> Vec<StudentProgress> {
    let mut by_student: BTreeMap<UserId, Vec<CourseProgress>> = BTreeMap::new();
    for (course, enrollment) in entries {
        by_student.entry(enrollment.user_id).or_default().push(CourseProgress {
            course_id: course.id,
            title: course.title,
            slug: course.slug,
            progress: enrollment.progress,
            completed_lessons: enrollment.completed_lessons.len(),
            enrolled_at: enrollment.enrolled_at,
            completed_at: enrollment.completed_at,
        });
    }

    let mut students: Vec<StudentProgress> = by_student
        .into_iter()
        .map(|(user_id, courses)| StudentProgress::new(user_id, courses))
        .filter(|s| filter.matches(s))
        .collect();
    students.sort_by(|a, b| b.latest_enrollment().cmp(&a.latest_enrollment()));
    students
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn enrolled(course: &Course, user: UserId, progress: u8, days_ago: i64) -> (Course, Enrollment) {
        let mut enrollment = Enrollment::new(user, course.id);
        enrollment.progress = progress;
        enrollment.enrolled_at = enrollment.enrolled_at - Duration::days(days_ago);
        (course.clone(), enrollment)
    }

    #[test]
    fn test_roster_statistics() {
        let instructor = UserId::new();
        let rust = Course::new("Rust", "", instructor).unwrap();
        let go = Course::new("Go", "", instructor).unwrap();
        let alice = UserId::new();
        let bob = UserId::new();

        let roster = build_roster(
            [
                enrolled(&rust, alice, 100, 3),
                enrolled(&go, alice, 25, 2),
                enrolled(&rust, bob, 0, 1),
            ],
            ProgressFilter::All,
        );

        assert_eq!(roster.len(), 2);
        // bob enrolled most recently
        assert_eq!(roster[0].user_id, bob);
        assert_eq!(roster[0].average_progress, 0);

        let alice_row = &roster[1];
        assert_eq!(alice_row.total_enrollments, 2);
        assert_eq!(alice_row.average_progress, 63);
        assert_eq!(alice_row.completed_courses, 1);
        assert_eq!(alice_row.enrolled_courses[0].title, "Go");
    }

    #[test]
    fn test_roster_filters() {
        let course = Course::new("Rust", "", UserId::new()).unwrap();
        let idle = UserId::new();
        let busy = UserId::new();
        let done = UserId::new();
        let entries = vec![
            enrolled(&course, idle, 0, 1),
            enrolled(&course, busy, 40, 1),
            enrolled(&course, done, 100, 1),
        ];

        let only = |filter: ProgressFilter| -> Vec<UserId> {
            build_roster(entries.clone(), filter).into_iter().map(|s| s.user_id).collect()
        };
        assert_eq!(only(ProgressFilter::NotStarted), [idle]);
        assert_eq!(only(ProgressFilter::InProgress), [busy]);
        assert_eq!(only(ProgressFilter::Completed), [done]);
        assert_eq!(only(ProgressFilter::All).len(), 3);
    }

    #[test]
    fn test_progress_filter_parse() {
        assert_eq!("in-progress".parse::<ProgressFilter>().unwrap(), ProgressFilter::InProgress);
        assert_eq!("all".parse::<ProgressFilter>().unwrap(), ProgressFilter::All);
        assert!("halfway".parse::<ProgressFilter>().is_err());
    }
}
