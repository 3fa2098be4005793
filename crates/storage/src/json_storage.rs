//! JSON file storage implementation.
//!
//! Stores each record as a JSON file under a data directory. The record's own
//! `version` field is the compare-and-swap token. All writes go through one
//! async mutex, which is what makes the enrollment uniqueness check and the
//! compare-and-swap update atomic within a process.

use std::path::{Path, PathBuf};

use coursetrack_core::{Course, CourseId, Enrollment, EnrollmentId, Lesson, LessonId, UserId};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::trait_::{sort_enrollments, sort_lessons};
use super::{Result, Storage, StorageError};

const COURSES: &str = "courses";
const LESSONS: &str = "lessons";
const ENROLLMENTS: &str = "enrollments";

/// What a directory scan does with a record it cannot read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unreadable {
    /// Log and leave it out of the result
    Skip,
    /// Fail the scan
    Fail,
}

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the record directories if
    /// needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for kind in [COURSES, LESSONS, ENROLLMENTS] {
            fs::create_dir_all(root.join(kind)).await?;
        }

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: &str, id: impl std::fmt::Display) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", id))
    }

    async fn all_enrollments(&self) -> Result<Vec<Enrollment>> {
        list_dir(&self.root.join(ENROLLMENTS), Unreadable::Skip).await
    }

    async fn enrollments_where(&self, keep: impl Fn(&Enrollment) -> bool) -> Result<Vec<Enrollment>> {
        let mut enrollments: Vec<Enrollment> =
            self.all_enrollments().await?.into_iter().filter(|e| keep(e)).collect();
        sort_enrollments(&mut enrollments);
        Ok(enrollments)
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_course(&self, course: &Course) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.record_path(COURSES, course.id), course).await
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        read_json(&self.record_path(COURSES, id)).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let mut courses: Vec<Course> = list_dir(&self.root.join(COURSES), Unreadable::Skip).await?;
        courses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(courses)
    }

    async fn delete_course(&self, id: CourseId) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let lessons: Vec<Lesson> = list_dir(&self.root.join(LESSONS), Unreadable::Skip).await?;
        for lesson in lessons.into_iter().filter(|l| l.course_id == id) {
            remove_if_exists(&self.record_path(LESSONS, lesson.id)).await?;
        }

        for enrollment in self.all_enrollments().await?.into_iter().filter(|e| e.course_id == id) {
            remove_if_exists(&self.record_path(ENROLLMENTS, enrollment.id)).await?;
        }

        remove_if_exists(&self.record_path(COURSES, id)).await?;
        debug!(course = %id, "deleted course with its lessons and enrollments");
        Ok(())
    }

    async fn save_lesson(&self, lesson: &Lesson) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.record_path(LESSONS, lesson.id), lesson).await
    }

    async fn load_lesson(&self, id: LessonId) -> Result<Option<Lesson>> {
        read_json(&self.record_path(LESSONS, id)).await
    }

    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>> {
        let all: Vec<Lesson> = list_dir(&self.root.join(LESSONS), Unreadable::Skip).await?;
        let mut lessons: Vec<Lesson> = all.into_iter().filter(|l| l.course_id == course_id).collect();
        sort_lessons(&mut lessons);
        Ok(lessons)
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        remove_if_exists(&self.record_path(LESSONS, id)).await
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        // An unreadable record may be the pair's existing enrollment.
        let existing: Vec<Enrollment> =
            list_dir(&self.root.join(ENROLLMENTS), Unreadable::Fail).await?;
        let exists = existing
            .iter()
            .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id);
        if exists {
            return Err(StorageError::Duplicate(format!(
                "enrollment for user {} in course {}",
                enrollment.user_id, enrollment.course_id
            )));
        }

        write_json(&self.record_path(ENROLLMENTS, enrollment.id), enrollment).await
    }

    async fn load_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        read_json(&self.record_path(ENROLLMENTS, id)).await
    }

    async fn find_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>> {
        Ok(self
            .all_enrollments()
            .await?
            .into_iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id))
    }

    async fn list_enrollments(&self, user_id: UserId) -> Result<Vec<Enrollment>> {
        self.enrollments_where(|e| e.user_id == user_id).await
    }

    async fn list_course_enrollments(&self, course_id: CourseId) -> Result<Vec<Enrollment>> {
        self.enrollments_where(|e| e.course_id == course_id).await
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<Enrollment> {
        let _guard = self.write_lock.lock().await;

        let path = self.record_path(ENROLLMENTS, enrollment.id);
        let stored: Enrollment = read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("enrollment {}", enrollment.id)))?;

        if stored.version != enrollment.version {
            return Err(StorageError::VersionConflict {
                id: enrollment.id.to_string(),
                expected: enrollment.version,
                found: stored.version,
            });
        }

        let mut updated = enrollment.clone();
        updated.version += 1;
        write_json(&path, &updated).await?;
        Ok(updated)
    }
}

/// Write via a temp file and rename so readers never see a partial record.
async fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    fs::remove_file(path).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
    })?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path, unreadable: Unreadable) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            // Removed between listing and reading.
            Ok(None) => {}
            Err(e) if unreadable == Unreadable::Skip => {
                warn!(path = %path.display(), error = %e, "skipping unreadable record");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(items)
}
