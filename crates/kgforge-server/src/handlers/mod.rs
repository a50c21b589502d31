pub mod graph;
pub mod health;
pub mod jobs;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};

use kgforge_core::KgError;

/// Map a pipeline error onto an HTTP status with a JSON `error` body.
pub(crate) fn error_response(context: &str, err: &KgError) -> Response {
    let status = match err {
        KgError::NotFound(_) => StatusCode::NOT_FOUND,
        KgError::Input(_) | KgError::Config(_) => StatusCode::BAD_REQUEST,
        KgError::InvalidTransition { .. } | KgError::Busy(_) => StatusCode::CONFLICT,
        KgError::Graph(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({ "error": format!("{context}: {err}") })),
    )
        .into_response()
}
