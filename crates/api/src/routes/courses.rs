//! Course authoring routes. Only the course's instructor may change the
//! course or its lessons; lesson changes resync the course's enrollments.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use coursetrack_core::{CategoryId, Course, CourseId, Lesson, LessonId, LessonUpdate, UserId};
use coursetrack_storage::Storage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::error::{parse_id, ApiError};
use crate::identity::Caller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub price: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub course: Course,
}

/// `POST /courses`; the caller becomes the instructor.
pub async fn create(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    payload: Result<Json<CreateCourseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CourseResponse>), ApiError> {
    let Json(req) = payload?;
    let mut course = Course::new(req.title, req.description, user_id)?;
    if let Some(category_id) = req.category_id {
        course = course.with_category(category_id);
    }
    if let Some(price) = req.price {
        course = course.with_price(price)?;
    }

    state.storage().save_course(&course).await?;
    info!(course = %course.id, slug = %course.slug, "course created");
    Ok((StatusCode::CREATED, Json(CourseResponse { course })))
}

#[derive(Debug, Serialize)]
pub struct CourseDetailResponse {
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

/// `GET /courses/{id}`; `id` may also be the course slug.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let course = match id.parse::<CourseId>() {
        Ok(course_id) => state.storage().load_course(course_id).await?,
        Err(_) => state
            .storage()
            .list_courses()
            .await?
            .into_iter()
            .find(|c| c.slug == id),
    }
    .ok_or_else(|| ApiError::NotFound("Course not found".into()))?;

    let lessons = state.storage().list_lessons(course.id).await?;
    Ok(Json(CourseDetailResponse { course, lessons }))
}

/// `DELETE /courses/{id}`; removes the course's lessons and enrollments too.
#[instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let course = load_course(&state, &id).await?;
    require_instructor(&course, user_id)?;

    state.storage().delete_course(course.id).await?;
    info!(course = %course.id, "course deleted");
    Ok(Json(json!({ "message": "Course deleted successfully" })))
}

#[derive(Debug, Serialize)]
pub struct LessonsResponse {
    pub lessons: Vec<Lesson>,
}

/// `GET /courses/{id}/lessons`
pub async fn list_lessons(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LessonsResponse>, ApiError> {
    let course = load_course(&state, &id).await?;
    let lessons = state.storage().list_lessons(course.id).await?;
    Ok(Json(LessonsResponse { lessons }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLessonRequest {
    pub title: String,
    pub video_url: String,
    pub notes_url: Option<String>,
    pub order: u32,
    pub duration: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LessonResponse {
    pub lesson: Lesson,
}

/// `POST /courses/{id}/lessons`
pub async fn add_lesson(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
    payload: Result<Json<AddLessonRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LessonResponse>), ApiError> {
    let course = load_course(&state, &id).await?;
    require_instructor(&course, user_id)?;
    let Json(req) = payload?;

    let mut lesson = Lesson::new(course.id, req.title, req.video_url, req.order)?;
    lesson.notes_url = req.notes_url.filter(|u| !u.trim().is_empty());
    lesson.duration_secs = req.duration;

    state.storage().save_lesson(&lesson).await?;
    state.tracker.resync_course(course.id).await?;
    info!(course = %course.id, lesson = %lesson.id, order = lesson.order, "lesson added");
    Ok((StatusCode::CREATED, Json(LessonResponse { lesson })))
}

/// `PUT /lessons/{id}`
pub async fn update_lesson(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
    payload: Result<Json<LessonUpdate>, JsonRejection>,
) -> Result<Json<LessonResponse>, ApiError> {
    let (mut lesson, course) = load_lesson(&state, &id).await?;
    require_instructor(&course, user_id)?;
    let Json(update) = payload?;

    lesson.apply_update(update, chrono::Utc::now())?;
    state.storage().save_lesson(&lesson).await?;
    info!(course = %course.id, lesson = %lesson.id, order = lesson.order, "lesson updated");
    Ok(Json(LessonResponse { lesson }))
}

/// `DELETE /lessons/{id}`
pub async fn delete_lesson(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (lesson, course) = load_lesson(&state, &id).await?;
    require_instructor(&course, user_id)?;

    state.storage().delete_lesson(lesson.id).await?;
    state.tracker.resync_course(course.id).await?;
    info!(course = %course.id, lesson = %lesson.id, "lesson deleted");
    Ok(Json(json!({ "message": "Lesson deleted successfully" })))
}

async fn load_lesson(state: &AppState, raw_id: &str) -> Result<(Lesson, Course), ApiError> {
    let id: LessonId = parse_id(raw_id, "Lesson")?;
    let lesson = state
        .storage()
        .load_lesson(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lesson not found".into()))?;
    let course = state
        .storage()
        .load_course(lesson.course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".into()))?;
    Ok((lesson, course))
}

async fn load_course(state: &AppState, raw_id: &str) -> Result<Course, ApiError> {
    let id: CourseId = parse_id(raw_id, "Course")?;
    state
        .storage()
        .load_course(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".into()))
}

fn require_instructor(course: &Course, user_id: UserId) -> Result<(), ApiError> {
    if course.instructor_id == user_id {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
