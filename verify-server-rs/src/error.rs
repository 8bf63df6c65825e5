use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

/// Why a verification run failed. Every variant ends the run, gets reported
/// through the failure alert, and still goes through cleanup.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Trigger or input did not pass validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A collaborator call failed or reported a failed terminal state.
    #[error("{service}: {message}")]
    ExternalService { service: &'static str, message: String },

    /// A manifest was missing fields or unparseable.
    #[error("manifest data integrity: {0}")]
    DataIntegrity(String),

    /// A wait or the whole run exceeded its time budget.
    #[error("timed out after {waited_secs}s waiting for {what}")]
    Timeout { what: String, waited_secs: u64 },

    /// The service is shutting down and stopped the run early.
    #[error("run cancelled: {0}")]
    Cancelled(String),
}

impl WorkflowError {
    pub fn external(service: &'static str, message: impl std::fmt::Display) -> Self {
        WorkflowError::ExternalService {
            service,
            message: message.to_string(),
        }
    }
}

impl From<manifest_agent::AgentError> for WorkflowError {
    fn from(e: manifest_agent::AgentError) -> Self {
        use manifest_agent::AgentError;
        match e {
            AgentError::DataIntegrity(msg) => WorkflowError::DataIntegrity(msg),
            AgentError::Serialization(e) => WorkflowError::DataIntegrity(e.to_string()),
            other => WorkflowError::external("object store", other),
        }
    }
}
