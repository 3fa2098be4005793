//! Enrollment routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use coursetrack_core::{CourseId, Enrollment, EnrollmentId, EnrollmentState, LessonId};
use coursetrack_progress::CourseOutline;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{parse_id, ApiError};
use crate::identity::Caller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnrollmentRequest {
    pub course_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentResponse {
    pub enrollment: Enrollment,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentStateResponse {
    pub enrollment: Enrollment,
    pub state: EnrollmentState,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentsResponse {
    pub enrollments: Vec<Enrollment>,
}

/// `POST /enrollments`
#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    payload: Result<Json<CreateEnrollmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), ApiError> {
    let Json(req) = payload?;
    let raw = req
        .course_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Course ID is required".into()))?;
    let course_id: CourseId = parse_id(raw.trim(), "Course")?;

    let enrollment = state.tracker.create_enrollment(user_id, course_id).await?;
    Ok((StatusCode::CREATED, Json(EnrollmentResponse { enrollment })))
}

/// `GET /enrollments`
pub async fn list(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> Result<Json<EnrollmentsResponse>, ApiError> {
    let enrollments = state.tracker.list_enrollments(user_id).await?;
    Ok(Json(EnrollmentsResponse { enrollments }))
}

/// `GET /enrollments/{id}`
pub async fn show(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<EnrollmentStateResponse>, ApiError> {
    let id: EnrollmentId = parse_id(&id, "Enrollment")?;
    let enrollment = state.tracker.get_enrollment(user_id, id).await?;
    Ok(Json(EnrollmentStateResponse {
        state: enrollment.state(),
        enrollment,
    }))
}

/// `GET /enrollments/{id}/outline`
pub async fn outline(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<CourseOutline>, ApiError> {
    let id: EnrollmentId = parse_id(&id, "Enrollment")?;
    Ok(Json(state.tracker.course_outline(user_id, id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressRequest {
    pub lesson_id: Option<String>,
    pub completed: Option<bool>,
}

/// `PUT /enrollments/{id}/progress`
#[instrument(skip(state, payload))]
pub async fn update_progress(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProgressRequest>, JsonRejection>,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    let Json(req) = payload?;
    let (Some(lesson_id), Some(completed)) = (req.lesson_id, req.completed) else {
        return Err(ApiError::BadRequest(
            "Lesson ID and completion status are required".into(),
        ));
    };
    let id: EnrollmentId = parse_id(&id, "Enrollment")?;
    let lesson_id: LessonId = lesson_id
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid lesson ID `{lesson_id}`")))?;

    let enrollment = state
        .tracker
        .set_lesson_completion(user_id, id, lesson_id, completed)
        .await?;
    Ok(Json(EnrollmentResponse { enrollment }))
}
