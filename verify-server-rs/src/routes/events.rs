use crate::error::AppError;
use crate::models::TriggerEvent;
use crate::services::runs::spawn_run;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().route("/", post(receive_event))
}

async fn receive_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let completion = match TriggerEvent::parse(&body, state.monitored_resource_id()) {
        TriggerEvent::BackupCompleted(completion) => completion,
        TriggerEvent::Ignored(reason) => {
            tracing::info!("Ignoring event: {}", reason);
            return Ok((
                StatusCode::OK,
                Json(json!({ "status": "ignored", "reason": reason.to_string() })),
            ));
        }
    };

    match spawn_run(
        state.runs.clone(),
        state.orchestrator.clone(),
        completion.clone(),
        state.cancel.child_token(),
    ) {
        Ok(run_id) => {
            tracing::info!(
                run_id = %run_id,
                resource = %completion.resource_id(),
                "Accepted backup completion {}",
                completion.backup_job_id
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "status": "started", "run_id": run_id })),
            ))
        }
        Err(active) => Err(AppError::Conflict(format!(
            "verification run {} is already active for {}",
            active,
            completion.resource_id()
        ))),
    }
}
