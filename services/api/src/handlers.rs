//! Axum Handlers for the REST API
//!
//! Health, explicit assessment refresh, and printable worksheet/test sheets.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::{error, info};
use tutor_core::config::TargetOverrides;
use tutor_core::lesson::{Lesson, LessonError};
use tutor_core::printable::render_sheet;
use tutor_core::supply::{AssessmentKey, SupplyError};

use crate::{
    models::{AssessmentSummary, ErrorResponse, HealthResponse, RefreshAssessmentsPayload, Sheet, SheetKind},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn lesson_error(err: LessonError) -> ApiError {
    match err {
        LessonError::NotFound(id) => ApiError::NotFound(format!("Lesson '{}' not found", id)),
        LessonError::Invalid(message) => ApiError::BadRequest(message),
        other => ApiError::InternalServerError(other.into()),
    }
}

fn supply_error(err: SupplyError) -> ApiError {
    match err {
        SupplyError::NoContent => {
            ApiError::BadRequest("The lesson has no questions to build assessments from".to_string())
        }
    }
}

async fn load_lesson(state: &AppState, lesson_id: &str) -> Result<Lesson, ApiError> {
    state.lessons.load(lesson_id).await.map_err(lesson_error)
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Discard the cached worksheet and test for a learner and generate new ones.
#[utoipa::path(
    post,
    path = "/assessments/refresh",
    request_body = RefreshAssessmentsPayload,
    responses(
        (status = 200, description = "Assessment sets regenerated", body = AssessmentSummary),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn refresh_assessments(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshAssessmentsPayload>,
) -> Result<Json<AssessmentSummary>, ApiError> {
    if payload.learner_id.trim().is_empty() {
        return Err(ApiError::BadRequest("learner_id is required".to_string()));
    }
    let lesson = load_lesson(&state, &payload.lesson_id).await?;
    let session = state.config.session_config(&payload.overrides());
    let key = AssessmentKey::new(
        lesson.id.clone(),
        payload.learner_id.clone(),
        session.targets.worksheet_length,
        session.targets.test_length,
    );

    let mut rng = StdRng::from_os_rng();
    let sets = state
        .assessments(&session)
        .refresh(&lesson, &key, &mut rng)
        .await
        .map_err(supply_error)?;

    info!(lesson_id = %lesson.id, learner = %payload.learner_id, "Assessment sets refreshed");
    Ok(Json(AssessmentSummary::new(&lesson.id, &payload.learner_id, &sets)))
}

/// Get the printable worksheet or test for a learner.
#[utoipa::path(
    get,
    path = "/assessments/{lesson_id}/{learner_id}/{kind}",
    responses(
        (status = 200, description = "Numbered printable sheet", body = Sheet),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("lesson_id" = String, Path, description = "Lesson ID"),
        ("learner_id" = String, Path, description = "Learner ID"),
        ("kind" = String, Path, description = "worksheet or test")
    )
)]
pub async fn printable_sheet(
    State(state): State<Arc<AppState>>,
    Path((lesson_id, learner_id, kind)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: SheetKind = kind.parse().map_err(ApiError::BadRequest)?;
    let lesson = load_lesson(&state, &lesson_id).await?;
    let session = state.config.session_config(&TargetOverrides::default());
    let key = AssessmentKey::new(
        lesson.id.clone(),
        learner_id,
        session.targets.worksheet_length,
        session.targets.test_length,
    );

    let mut rng = StdRng::from_os_rng();
    let sets = state
        .assessments(&session)
        .ensure(&lesson, &key, &mut rng)
        .await
        .map_err(supply_error)?;

    let title = format!("{} - {}", lesson.title, kind);
    let sheet = render_sheet(&title, sets.set(kind.into()));
    Ok((StatusCode::OK, Json(Sheet::from(sheet))))
}
