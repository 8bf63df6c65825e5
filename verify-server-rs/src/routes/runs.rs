use crate::error::AppError;
use crate::services::runs::RunRecord;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use uuid::Uuid;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_runs))
        .route("/{id}", get(get_run))
}

async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunRecord>> {
    Json(state.runs.list())
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunRecord>, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::BadRequest("invalid run id".into()))?;
    match state.runs.get(&id) {
        Some(run) => Ok(Json(run)),
        None => Err(AppError::NotFound("Run not found".into())),
    }
}
