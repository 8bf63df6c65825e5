//! Seams to the external services a run drives.
//!
//! Each trait is small and async so the orchestrator can be exercised with
//! in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::WorkflowError;
use crate::services::notifier::Notification;

pub type CallResult<T> = Result<T, WorkflowError>;

/// Settings applied to the file system created by a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreMetadata {
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub permissions: String,
    pub encrypted: bool,
    pub performance_mode: String,
    pub throughput_mode: String,
    pub automatic_backups: bool,
    /// File system the recovery point was taken from
    pub source_resource_id: String,
}

impl Default for RestoreMetadata {
    fn default() -> Self {
        Self {
            owner_uid: 0,
            owner_gid: 0,
            permissions: "0755".into(),
            encrypted: false,
            performance_mode: "generalPurpose".into(),
            throughput_mode: "bursting".into(),
            automatic_backups: false,
            source_resource_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreRequest {
    pub recovery_point: String,
    pub metadata: RestoreMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreState {
    #[serde(alias = "PENDING", alias = "CREATED")]
    Pending,
    #[serde(alias = "RUNNING")]
    Running,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "FAILED")]
    Failed,
    #[serde(alias = "ABORTED")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStatus {
    pub state: RestoreState,
    #[serde(default)]
    pub created_resource_ref: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PosixIdentity {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessPointRequest {
    pub storage_id: String,
    pub identity: PosixIdentity,
    pub root_path: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRequest {
    pub template: String,
    pub cluster: String,
    pub container_name: String,
    pub command: Vec<String>,
    pub storage_id: String,
    pub access_point_id: String,
    pub mount_point: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[serde(alias = "PENDING", alias = "PROVISIONING")]
    Pending,
    #[serde(alias = "RUNNING")]
    Running,
    #[serde(alias = "STOPPED")]
    Stopped,
    #[serde(alias = "FAILED")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Starts restores from recovery points.
#[async_trait]
pub trait BackupService: Send + Sync {
    async fn start_restore(&self, request: &RestoreRequest) -> CallResult<String>;
    async fn restore_status(&self, restore_job_id: &str) -> CallResult<RestoreStatus>;
}

/// Makes a restored file system mountable, and tears it down again.
#[async_trait]
pub trait ExposureService: Send + Sync {
    async fn create_access_point(&self, request: &AccessPointRequest) -> CallResult<String>;
    async fn delete_access_point(&self, access_point_id: &str) -> CallResult<()>;
    async fn delete_storage(&self, storage_id: &str) -> CallResult<()>;
}

/// Runs the manifest agent as a one-off container task.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn run_task(&self, request: &TaskRequest) -> CallResult<String>;
    async fn task_status(&self, task_ref: &str) -> CallResult<TaskStatus>;
    async fn stop_task(&self, task_ref: &str, reason: &str) -> CallResult<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> CallResult<()>;
}
