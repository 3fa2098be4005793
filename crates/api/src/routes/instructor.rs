//! Instructor views over enrollment progress.

use axum::extract::{Query, State};
use axum::Json;
use coursetrack_core::CourseId;
use coursetrack_progress::{ProgressFilter, StudentProgress};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StudentsQuery {
    /// Course id, or `all`
    pub course: Option<String>,
    /// `all`, `not-started`, `in-progress` or `completed`
    pub progress: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StudentsResponse {
    pub students: Vec<StudentProgress>,
}

/// `GET /instructor/students`: students of the caller's courses.
pub async fn students(
    State(state): State<AppState>,
    Caller(instructor): Caller,
    Query(query): Query<StudentsQuery>,
) -> Result<Json<StudentsResponse>, ApiError> {
    let course_id = match query.course.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            raw.parse::<CourseId>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid course ID `{raw}`")))?,
        ),
    };
    let filter = match query.progress.as_deref().map(str::trim) {
        None | Some("") => ProgressFilter::All,
        Some(raw) => raw.parse().map_err(ApiError::BadRequest)?,
    };

    let students = state
        .tracker
        .student_roster(instructor, course_id, filter)
        .await?;
    Ok(Json(StudentsResponse { students }))
}
