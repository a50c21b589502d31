use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;

use kgforge_core::api_types::{JobStatusResponse, TriggerJobRequest, TriggerJobResponse};
use kgforge_core::{JobKind, JobSpec, JobStatusStore, JobUnit, KgError, TriggerOutcome};

use super::error_response;
use crate::state::AppState;

pub async fn trigger_document(
    State(state): State<AppState>,
    Json(request): Json<TriggerJobRequest>,
) -> impl IntoResponse {
    trigger(state, JobSpec::document(request.id, request.path)).await
}

pub async fn trigger_dataset(
    State(state): State<AppState>,
    Json(request): Json<TriggerJobRequest>,
) -> impl IntoResponse {
    trigger(state, JobSpec::dataset(request.id, request.path)).await
}

async fn trigger(state: AppState, job: JobSpec) -> axum::response::Response {
    info!(job_id = %job.unit, path = %job.path.display(), "Job trigger requested");

    if job.unit.id.trim().is_empty() {
        return error_response("Invalid job", &KgError::Input("id must not be empty".into()));
    }

    let unit = job.unit.clone();
    match state.orchestrator.trigger(job).await {
        Ok(outcome) => {
            let (status, message) = match &outcome {
                TriggerOutcome::Started { .. } => (StatusCode::ACCEPTED, "Job started".to_string()),
                TriggerOutcome::AlreadyRunning { state: current } => {
                    (StatusCode::OK, format!("Job already running ({current})"))
                }
                TriggerOutcome::AlreadyCompleted => {
                    (StatusCode::OK, "Job already completed".to_string())
                }
            };
            let response = TriggerJobResponse {
                kind: unit.kind,
                id: unit.id,
                outcome,
                message,
            };
            (status, Json(response)).into_response()
        }
        Err(e) => {
            tracing::error!(job_id = %unit, "Failed to trigger job: {e}");
            error_response("Failed to trigger job", &e)
        }
    }
}

pub async fn job_status(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> impl IntoResponse {
    let kind: JobKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return error_response("Unknown job kind", &e),
    };
    let unit = JobUnit { kind, id };

    match state.status().get_status(&unit).await {
        Ok(Some(status)) => {
            let response = JobStatusResponse {
                kind: status.unit.kind,
                id: status.unit.id.clone(),
                error: status.is_error(),
                state: status.state,
                updated_at: status.updated_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => error_response(
            "Job status unavailable",
            &KgError::NotFound(format!("No job recorded for {unit}")),
        ),
        Err(e) => {
            tracing::error!(job_id = %unit, "Failed to read job status: {e}");
            error_response("Failed to read job status", &e)
        }
    }
}
