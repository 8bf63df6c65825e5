pub mod events;
pub mod runs;

use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/events", events::router(state.clone()))
        .nest("/api/runs", runs::router(state.clone()))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "project": state.config.project_name,
        "monitored_resource_id": state.monitored_resource_id(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::WorkflowError;
    use crate::services::collaborators::{
        AccessPointRequest, BackupService, CallResult, ExecutionService, ExposureService, RestoreRequest,
        RestoreStatus, TaskRequest, TaskStatus,
    };
    use crate::services::orchestrator::{Collaborators, Orchestrator};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use manifest_agent::manifest::store::MemoryObjectStore;
    use manifest_agent::ManifestStore;
    use std::collections::HashMap;
    use tower::ServiceExt;

    /// Accepts a restore and then never finishes it.
    struct StalledCloud;

    #[async_trait]
    impl BackupService for StalledCloud {
        async fn start_restore(&self, _request: &RestoreRequest) -> CallResult<String> {
            std::future::pending().await
        }

        async fn restore_status(&self, _restore_job_id: &str) -> CallResult<RestoreStatus> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl ExposureService for StalledCloud {
        async fn create_access_point(&self, _request: &AccessPointRequest) -> CallResult<String> {
            Err(WorkflowError::external("fake", "unused"))
        }

        async fn delete_access_point(&self, _access_point_id: &str) -> CallResult<()> {
            Ok(())
        }

        async fn delete_storage(&self, _storage_id: &str) -> CallResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ExecutionService for StalledCloud {
        async fn run_task(&self, _request: &TaskRequest) -> CallResult<String> {
            Err(WorkflowError::external("fake", "unused"))
        }

        async fn task_status(&self, _task_ref: &str) -> CallResult<TaskStatus> {
            Err(WorkflowError::external("fake", "unused"))
        }

        async fn stop_task(&self, _task_ref: &str, _reason: &str) -> CallResult<()> {
            Ok(())
        }
    }

    fn test_app() -> (Router, Arc<AppState>) {
        let env: HashMap<&str, &str> = [
            ("MONITORED_RESOURCE_ID", "fs-0123"),
            ("TASK_DEFINITION", "manifest-task:1"),
        ]
        .into_iter()
        .collect();
        let config = AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        let cloud = Arc::new(StalledCloud);
        let orchestrator = Orchestrator::new(
            config.verify_config(),
            Collaborators {
                backup: cloud.clone(),
                exposure: cloud.clone(),
                execution: cloud,
                manifests: ManifestStore::new(Arc::new(MemoryObjectStore::new()), config.bucket.clone()),
                notifier: None,
            },
        );
        let state = Arc::new(AppState::new(config, orchestrator));
        (create_router(state.clone()), state)
    }

    fn event(resource: &str, status: &str) -> Value {
        json!({
            "detail-type": "Backup Job State Change",
            "detail": {
                "state": status,
                "backupJobId": "job-1",
                "resourceArn": format!("arn:aws:elasticfilesystem:eu-west-1:123:file-system/{}", resource),
                "recoveryPointArn": "rp-1"
            }
        })
    }

    fn post_event(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/events")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_irrelevant_events_are_ignored() {
        let (app, state) = test_app();

        let resp = app.clone().oneshot(post_event(&event("fs-0123", "RUNNING"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ignored");

        let resp = app.oneshot(post_event(&event("fs-9999", "COMPLETED"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.runs.list().is_empty());
    }

    #[tokio::test]
    async fn test_second_trigger_for_same_resource_conflicts() {
        let (app, state) = test_app();

        let resp = app.clone().oneshot(post_event(&event("fs-0123", "COMPLETED"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "started");
        let run_id = body["run_id"].as_str().unwrap().to_string();

        let resp = app.clone().oneshot(post_event(&event("fs-0123", "COMPLETED"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(state.runs.list().len(), 1);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/runs/{}", run_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let run = json_body(resp).await;
        assert_eq!(run["resource_id"], "fs-0123");
        assert!(run["finished_at"].is_null());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_drains_active_runs() {
        let (app, state) = test_app();

        let resp = app.clone().oneshot(post_event(&event("fs-0123", "COMPLETED"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let run_id: uuid::Uuid = json_body(resp).await["run_id"].as_str().unwrap().parse().unwrap();

        state.cancel.cancel();
        assert!(state.runs.drain(std::time::Duration::from_secs(5)).await);

        let record = state.runs.get(&run_id).unwrap();
        assert_eq!(record.verdict, Some("failed"));
        assert!(record.error.as_deref().unwrap().contains("cancelled"));
        assert!(record.finished_at.is_some());

        // The resource lock was released with the run
        let resp = app.oneshot(post_event(&event("fs-0123", "COMPLETED"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let (app, _) = test_app();
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/runs/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(Request::builder().uri("/api/runs/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
