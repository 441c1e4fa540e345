//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AssessmentSummary, ErrorResponse, HealthResponse, RefreshAssessmentsPayload, Sheet,
        SheetItem, SheetKind,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::refresh_assessments,
        handlers::printable_sheet,
    ),
    components(
        schemas(AssessmentSummary, RefreshAssessmentsPayload, Sheet, SheetItem, SheetKind, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "Tutor API", description = "Tutoring sessions, assessment sets and printable sheets")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/assessments/refresh", post(handlers::refresh_assessments))
        .route(
            "/assessments/{lesson_id}/{learner_id}/{kind}",
            get(handlers::printable_sheet),
        )
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
