//! SQLite storage backend for coursetrack.
//!
//! Records are stored as JSON documents next to the columns that need
//! indexing. The `(user_id, course_id)` uniqueness of enrollments and the
//! version check of updates are enforced by SQL, so several processes can
//! share one database file.

use std::str::FromStr;

use async_trait::async_trait;
use coursetrack_core::{Course, CourseId, Enrollment, EnrollmentId, Lesson, LessonId, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use super::trait_::{Result, Storage, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `db_path`.
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    ///
    /// Limited to one connection so every query sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS lessons (
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                sort_order INTEGER NOT NULL,
                data TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS enrollments (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                enrolled_at TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (user_id, course_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_lessons_course ON lessons(course_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> Result<T> {
        let data: String = row.try_get("data")?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    // === Course operations ===

    async fn save_course(&self, course: &Course) -> Result<()> {
        let data = serde_json::to_string(course)?;
        sqlx::query("INSERT OR REPLACE INTO courses (id, data, created_at) VALUES (?, ?, ?)")
            .bind(course.id.to_string())
            .bind(data)
            .bind(course.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT data FROM courses WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query("SELECT data FROM courses ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn delete_course(&self, id: CourseId) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM enrollments WHERE course_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM lessons WHERE course_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(course = %id, "deleted course with its lessons and enrollments");
        Ok(())
    }

    // === Lesson operations ===

    async fn save_lesson(&self, lesson: &Lesson) -> Result<()> {
        let data = serde_json::to_string(lesson)?;
        sqlx::query(
            "INSERT OR REPLACE INTO lessons (id, course_id, sort_order, data) VALUES (?, ?, ?, ?)",
        )
        .bind(lesson.id.to_string())
        .bind(lesson.course_id.to_string())
        .bind(i64::from(lesson.order))
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_lesson(&self, id: LessonId) -> Result<Option<Lesson>> {
        let row = sqlx::query("SELECT data FROM lessons WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>> {
        let rows = sqlx::query("SELECT data FROM lessons WHERE course_id = ? ORDER BY sort_order, id")
            .bind(course_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<()> {
        sqlx::query("DELETE FROM lessons WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // === Enrollment operations ===

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let data = serde_json::to_string(enrollment)?;
        let result = sqlx::query(
            "INSERT INTO enrollments (id, user_id, course_id, version, enrolled_at, data)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(enrollment.id.to_string())
        .bind(enrollment.user_id.to_string())
        .bind(enrollment.course_id.to_string())
        .bind(enrollment.version as i64)
        .bind(enrollment.enrolled_at.to_rfc3339())
        .bind(data)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::Duplicate(format!(
                    "enrollment for user {} in course {}",
                    enrollment.user_id, enrollment.course_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        let row = sqlx::query("SELECT data FROM enrollments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>> {
        let row = sqlx::query("SELECT data FROM enrollments WHERE user_id = ? AND course_id = ?")
            .bind(user_id.to_string())
            .bind(course_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_enrollments(&self, user_id: UserId) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(
            "SELECT data FROM enrollments WHERE user_id = ? ORDER BY enrolled_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn list_course_enrollments(&self, course_id: CourseId) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(
            "SELECT data FROM enrollments WHERE course_id = ? ORDER BY enrolled_at DESC",
        )
        .bind(course_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<Enrollment> {
        let mut updated = enrollment.clone();
        updated.version += 1;
        let data = serde_json::to_string(&updated)?;

        let result = sqlx::query(
            "UPDATE enrollments SET version = ?, data = ? WHERE id = ? AND version = ?",
        )
        .bind(updated.version as i64)
        .bind(data)
        .bind(enrollment.id.to_string())
        .bind(enrollment.version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(updated);
        }

        let found: Option<i64> = sqlx::query_scalar("SELECT version FROM enrollments WHERE id = ?")
            .bind(enrollment.id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match found {
            Some(found) => Err(StorageError::VersionConflict {
                id: enrollment.id.to_string(),
                expected: enrollment.version,
                found: found as u64,
            }),
            None => Err(StorageError::NotFound(format!("enrollment {}", enrollment.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let course = Course::new("Test Course", "Test description", UserId::new()).unwrap();

        storage.save_course(&course).await.unwrap();
        let loaded = storage.load_course(course.id).await.unwrap().unwrap();

        assert_eq!(loaded.title, course.title);
        assert_eq!(loaded.id, course.id);
    }

    #[tokio::test]
    async fn test_lesson_operations() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let course_id = CourseId::new();
        let second = Lesson::new(course_id, "Second", "b.mp4", 2).unwrap();
        let first = Lesson::new(course_id, "First", "a.mp4", 1).unwrap();
        storage.save_lesson(&second).await.unwrap();
        storage.save_lesson(&first).await.unwrap();

        let lessons = storage.list_lessons(course_id).await.unwrap();
        assert_eq!(lessons, vec![first.clone(), second]);

        storage.delete_lesson(first.id).await.unwrap();
        assert_eq!(storage.list_lessons(course_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unique_enrollment() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let user = UserId::new();
        let course = CourseId::new();
        storage.insert_enrollment(&Enrollment::new(user, course)).await.unwrap();

        let err = storage.insert_enrollment(&Enrollment::new(user, course)).await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));

        storage.insert_enrollment(&Enrollment::new(UserId::new(), course)).await.unwrap();
        assert_eq!(storage.list_course_enrollments(course).await.unwrap().len(), 2);
        assert_eq!(storage.list_enrollments(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_enrollment_version_check() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let enrollment = Enrollment::new(UserId::new(), CourseId::new());
        storage.insert_enrollment(&enrollment).await.unwrap();

        let stored = storage.update_enrollment(&enrollment).await.unwrap();
        assert_eq!(stored.version, 1);
        let reloaded = storage.load_enrollment(enrollment.id).await.unwrap().unwrap();
        assert_eq!(reloaded.version, 1);

        let err = storage.update_enrollment(&enrollment).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { found: 1, .. }));
    }
}
