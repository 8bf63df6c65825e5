//! JSON-over-HTTP client for the infrastructure gateway.
//!
//! Routes:
//! - `POST {base}/restore-jobs`, `GET {base}/restore-jobs/{id}`
//! - `POST {base}/file-systems/{id}/access-points`, `DELETE {base}/access-points/{id}`
//! - `DELETE {base}/file-systems/{id}`
//! - `POST {base}/tasks`, `GET {base}/tasks/{ref}`, `POST {base}/tasks/{ref}/stop`
//!
//! Deletes treat `404` as already gone.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::collaborators::{
    AccessPointRequest, BackupService, CallResult, ExecutionService, ExposureService, RestoreRequest,
    RestoreStatus, TaskRequest, TaskStatus,
};
use crate::error::WorkflowError;

pub struct ControlPlaneClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

impl ControlPlaneClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid control plane url {:?}: {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("control plane url cannot be a base: {}", base_url);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        service: &'static str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> CallResult<reqwest::Response> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        tracing::debug!("{} {}", method, url);
        request
            .send()
            .await
            .map_err(|e| WorkflowError::external(service, format!("{} {}: {}", method, url, e)))
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> CallResult<T> {
        let resp = self.send(service, method.clone(), url.clone(), body).await?;
        let resp = check_status(service, &method, &url, resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| WorkflowError::external(service, format!("unreadable response from {}: {}", url, e)))
    }

    async fn delete(&self, service: &'static str, url: Url) -> CallResult<()> {
        let resp = self.send(service, Method::DELETE, url.clone(), None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!("{} already gone", url);
            return Ok(());
        }
        check_status(service, &Method::DELETE, &url, resp).await?;
        Ok(())
    }
}

async fn check_status(
    service: &'static str,
    method: &Method,
    url: &Url,
    resp: reqwest::Response,
) -> CallResult<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let error_text = resp.text().await.unwrap_or_default();
    Err(WorkflowError::external(
        service,
        format!("{} {} returned {}: {}", method, url, status, error_text),
    ))
}

#[async_trait]
impl BackupService for ControlPlaneClient {
    async fn start_restore(&self, request: &RestoreRequest) -> CallResult<String> {
        let body = json!({
            "recovery_point": request.recovery_point,
            "metadata": request.metadata,
        });
        let created: IdResponse = self
            .call_json("backup", Method::POST, self.url(&["restore-jobs"]), Some(body))
            .await?;
        Ok(created.id)
    }

    async fn restore_status(&self, restore_job_id: &str) -> CallResult<RestoreStatus> {
        self.call_json("backup", Method::GET, self.url(&["restore-jobs", restore_job_id]), None)
            .await
    }
}

#[async_trait]
impl ExposureService for ControlPlaneClient {
    async fn create_access_point(&self, request: &AccessPointRequest) -> CallResult<String> {
        let body = json!({
            "posix_user": request.identity,
            "root_path": request.root_path,
            "tags": request.tags,
        });
        let url = self.url(&["file-systems", &request.storage_id, "access-points"]);
        let created: IdResponse = self.call_json("file system", Method::POST, url, Some(body)).await?;
        Ok(created.id)
    }

    async fn delete_access_point(&self, access_point_id: &str) -> CallResult<()> {
        self.delete("file system", self.url(&["access-points", access_point_id]))
            .await
    }

    async fn delete_storage(&self, storage_id: &str) -> CallResult<()> {
        self.delete("file system", self.url(&["file-systems", storage_id]))
            .await
    }
}

#[async_trait]
impl ExecutionService for ControlPlaneClient {
    async fn run_task(&self, request: &TaskRequest) -> CallResult<String> {
        let body = serde_json::to_value(request).map_err(|e| WorkflowError::external("execution", e))?;
        let created: IdResponse = self
            .call_json("execution", Method::POST, self.url(&["tasks"]), Some(body))
            .await?;
        Ok(created.id)
    }

    async fn task_status(&self, task_ref: &str) -> CallResult<TaskStatus> {
        self.call_json("execution", Method::GET, self.url(&["tasks", task_ref]), None)
            .await
    }

    async fn stop_task(&self, task_ref: &str, reason: &str) -> CallResult<()> {
        let url = self.url(&["tasks", task_ref, "stop"]);
        let resp = self
            .send("execution", Method::POST, url.clone(), Some(json!({ "reason": reason })))
            .await?;
        check_status("execution", &Method::POST, &url, resp).await?;
        Ok(())
    }
}
