//! Lesson model - ordered content inside a course.

use serde::{Deserialize, Serialize};
use crate::id::{CourseId, LessonId};
use crate::error::ModelError;
use crate::Time;

/// A lesson belongs to exactly one course.
///
/// `order` drives display and next/previous navigation. It is not required to
/// be unique; ties are broken by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Unique identifier
    pub id: LessonId,

    /// Owning course
    pub course_id: CourseId,

    /// Lesson title
    pub title: String,

    /// Video location
    pub video_url: String,

    /// Optional notes location
    pub notes_url: Option<String>,

    /// Position within the course (>= 1)
    pub order: u32,

    /// Duration in seconds
    pub duration_secs: Option<u32>,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Lesson {
    /// Create a new lesson for `course_id`.
    pub fn new(
        course_id: CourseId,
        title: impl Into<String>,
        video_url: impl Into<String>,
        order: u32,
    ) -> Result<Self, ModelError> {
        let title = title.into().trim().to_string();
        let video_url = video_url.into().trim().to_string();
        if title.is_empty() {
            return Err(ModelError::Missing("lesson title"));
        }
        if video_url.is_empty() {
            return Err(ModelError::Missing("video URL"));
        }
        if order == 0 {
            return Err(ModelError::InvalidOrder(order));
        }
        let now = chrono::Utc::now();
        Ok(Self {
            id: LessonId::new(),
            course_id,
            title,
            video_url,
            notes_url: None,
            order,
            duration_secs: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sort key used everywhere lessons are listed.
    pub fn sort_key(&self) -> (u32, LessonId) {
        (self.order, self.id)
    }

    /// Apply an edit. Nothing changes unless every given field is valid.
    pub fn apply_update(&mut self, update: LessonUpdate, now: Time) -> Result<(), ModelError> {
        let title = update.title.map(|t| t.trim().to_string());
        let video_url = update.video_url.map(|u| u.trim().to_string());
        if title.as_deref() == Some("") {
            return Err(ModelError::Missing("lesson title"));
        }
        if video_url.as_deref() == Some("") {
            return Err(ModelError::Missing("video URL"));
        }
        if update.order == Some(0) {
            return Err(ModelError::InvalidOrder(0));
        }

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(video_url) = video_url {
            self.video_url = video_url;
        }
        if let Some(notes_url) = update.notes_url {
            let notes_url = notes_url.trim().to_string();
            self.notes_url = (!notes_url.is_empty()).then_some(notes_url);
        }
        if let Some(order) = update.order {
            self.order = order;
        }
        if let Some(duration) = update.duration_secs {
            self.duration_secs = Some(duration);
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Partial edit of a lesson; `None` leaves a field as it is. The owning
/// course cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonUpdate {
    /// New title
    pub title: Option<String>,
    /// New video location
    pub video_url: Option<String>,
    /// New notes location; empty clears it
    pub notes_url: Option<String>,
    /// New position
    pub order: Option<u32>,
    /// New duration in seconds
    #[serde(alias = "duration")]
    pub duration_secs: Option<u32>,
}
