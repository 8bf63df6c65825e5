//! One restore-and-verify run, start to finish.
//!
//! ```text
//! Idle → RestoreRequested → RestoreCompleted → AccessExposed → ScanTaskRunning
//!      → ScanTaskCompleted → ManifestsFetched → Reconciled → Notified → Done
//! ```
//!
//! Any step may fail the run. Failed or not, the outcome is published once
//! and every resource the run created is torn down.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use manifest_agent::manifest::store::object_key;
use manifest_agent::{reconcile, DiscrepancyReport, ManifestStore};

use super::collaborators::{
    AccessPointRequest, BackupService, ExecutionService, ExposureService, Notifier, PosixIdentity,
    RestoreMetadata, RestoreRequest, RestoreState, TaskRequest, TaskState,
};
use super::notifier::Notification;
use super::poller::{poll_until, Poll, PollPolicy};
use crate::error::WorkflowError;
use crate::models::{resource_id, BackupCompletion, RestoreSession, RunState};

/// Where manifests live in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestKeys {
    pub original_prefix: String,
    pub restored_prefix: String,
    pub restored_file_name: String,
}

impl Default for ManifestKeys {
    fn default() -> Self {
        Self {
            original_prefix: "original_manifests".into(),
            restored_prefix: "restored_manifests".into(),
            restored_file_name: "restored_manifest.json".into(),
        }
    }
}

impl ManifestKeys {
    pub fn original_key(&self, resource: &str) -> String {
        object_key(&self.original_prefix, &format!("original_manifest_{}.json", resource))
    }

    /// Each run's scan task uploads under its own prefix, so a run only ever
    /// reads the candidate it produced.
    pub fn restored_prefix_for(&self, run_id: Uuid) -> String {
        object_key(&self.restored_prefix, &run_id.to_string())
    }

    pub fn candidate_key(&self, run_id: Uuid) -> String {
        object_key(&self.restored_prefix_for(run_id), &self.restored_file_name)
    }
}

/// How the scan task is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    /// Where the restored file system is mounted inside the container
    pub mount_point: String,
    /// Scratch directory for the manifest inside the container
    pub output_dir: String,
    /// Object store the agent uploads to, when the container has no config file
    pub store_url: Option<String>,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            cluster: "default".into(),
            task_definition: String::new(),
            container_name: "manifest-agent".into(),
            subnet_ids: Vec::new(),
            security_group_ids: Vec::new(),
            mount_point: "/mnt/restore".into(),
            output_dir: "/tmp".into(),
            store_url: None,
        }
    }
}

/// Everything a run needs to know, passed in explicitly.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub monitored_resource_id: String,
    pub project_name: String,
    pub bucket: String,
    pub keys: ManifestKeys,
    pub task: TaskSettings,
    pub restore_poll: PollPolicy,
    pub scan_poll: PollPolicy,
    /// Wall-clock limit for everything before notification
    pub run_budget: Option<Duration>,
}

/// The external services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub backup: Arc<dyn BackupService>,
    pub exposure: Arc<dyn ExposureService>,
    pub execution: Arc<dyn ExecutionService>,
    pub manifests: ManifestStore,
    pub notifier: Option<Arc<dyn Notifier>>,
}

/// A teardown action cleanup attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    StopTask(String),
    DeleteAccessPoint(String),
    DeleteStorage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub attempted: Vec<Teardown>,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session: RestoreSession,
    pub result: Result<DiscrepancyReport, WorkflowError>,
    /// What was published, if a notifier is configured and accepted it
    pub notification: Option<Notification>,
    pub cleanup: CleanupReport,
}

impl RunOutcome {
    pub fn verdict(&self) -> &'static str {
        match &self.result {
            Ok(report) if report.is_consistent() => "consistent",
            Ok(_) => "discrepancies",
            Err(_) => "failed",
        }
    }
}

pub struct Orchestrator {
    config: VerifyConfig,
    services: Collaborators,
}

impl Orchestrator {
    pub fn new(config: VerifyConfig, services: Collaborators) -> Self {
        Self { config, services }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Drive one run to completion. `on_state` sees every transition.
    ///
    /// Cancelling `cancel` ends the run as failed; the alert and cleanup
    /// still happen.
    pub async fn run<F>(
        &self,
        run_id: Uuid,
        completion: BackupCompletion,
        cancel: &CancellationToken,
        on_state: F,
    ) -> RunOutcome
    where
        F: Fn(RunState) + Send + Sync,
    {
        let mut session = RestoreSession::new(run_id, completion);
        tracing::info!(
            run_id = %run_id,
            resource = %session.completion.resource_id(),
            backup_job = %session.completion.backup_job_id,
            "Starting backup verification"
        );

        let budgeted = async {
            match self.config.run_budget {
                Some(budget) => {
                    match tokio::time::timeout(budget, self.execute(&mut session, &on_state)).await {
                        Ok(result) => result,
                        Err(_) => Err(WorkflowError::Timeout {
                            what: "verification run".into(),
                            waited_secs: budget.as_secs(),
                        }),
                    }
                }
                None => self.execute(&mut session, &on_state).await,
            }
        };

        let result = tokio::select! {
            result = budgeted => result,
            _ = cancel.cancelled() => Err(WorkflowError::Cancelled("verify server is shutting down".into())),
        };

        if let Err(e) = &result {
            tracing::error!(run_id = %run_id, state = %session.state, "Verification failed: {}", e);
            transition(&mut session, RunState::Failed, &on_state);
        }

        let notification = self.notify(&session, &result).await;
        if result.is_ok() {
            transition(&mut session, RunState::Notified, &on_state);
        }

        let cleanup = self.cleanup(&session).await;

        if result.is_ok() {
            transition(&mut session, RunState::Done, &on_state);
        }

        RunOutcome {
            session,
            result,
            notification,
            cleanup,
        }
    }

    async fn execute<F>(&self, session: &mut RestoreSession, on_state: &F) -> Result<DiscrepancyReport, WorkflowError>
    where
        F: Fn(RunState) + Send + Sync,
    {
        if self.config.task.task_definition.is_empty() {
            return Err(WorkflowError::Validation("no scan task definition configured".into()));
        }

        // Restore
        let request = RestoreRequest {
            recovery_point: session.completion.recovery_point_arn.clone(),
            metadata: RestoreMetadata {
                source_resource_id: session.completion.resource_id().to_string(),
                ..RestoreMetadata::default()
            },
        };
        let restore_job_id = self.services.backup.start_restore(&request).await?;
        session.restore_job_id = Some(restore_job_id.clone());
        transition(session, RunState::RestoreRequested, on_state);

        let created_ref = self.wait_for_restore(&restore_job_id).await?;
        if resource_id(&created_ref).is_empty() {
            return Err(WorkflowError::external(
                "backup",
                format!("restore job {} reported unusable resource {:?}", restore_job_id, created_ref),
            ));
        }
        session.set_created_resource(created_ref);
        let storage_id = session.storage_id.clone().unwrap_or_default();
        transition(session, RunState::RestoreCompleted, on_state);

        // Expose
        let access_point_id = self
            .services
            .exposure
            .create_access_point(&self.access_point_request(&storage_id))
            .await?;
        session.access_point_id = Some(access_point_id.clone());
        transition(session, RunState::AccessExposed, on_state);

        // Scan
        let task_ref = self
            .services
            .execution
            .run_task(&self.task_request(session.run_id, &storage_id, &access_point_id))
            .await?;
        session.task_ref = Some(task_ref.clone());
        transition(session, RunState::ScanTaskRunning, on_state);

        self.wait_for_task(&task_ref).await?;
        transition(session, RunState::ScanTaskCompleted, on_state);

        // Compare
        let keys = &self.config.keys;
        let original = self
            .services
            .manifests
            .load(&keys.original_key(session.completion.resource_id()))
            .await?;
        let candidate = self
            .services
            .manifests
            .load(&keys.candidate_key(session.run_id))
            .await?;
        transition(session, RunState::ManifestsFetched, on_state);

        let report = reconcile(&original, &candidate);
        tracing::info!(
            run_id = %session.run_id,
            original_files = original.len(),
            candidate_files = candidate.len(),
            discrepancies = report.discrepancy_count(),
            "Manifests reconciled"
        );
        transition(session, RunState::Reconciled, on_state);

        Ok(report)
    }

    async fn wait_for_restore(&self, restore_job_id: &str) -> Result<String, WorkflowError> {
        let backup = &*self.services.backup;
        poll_until(self.config.restore_poll, "restore job", move || async move {
            let status = backup.restore_status(restore_job_id).await?;
            tracing::info!(restore_job = %restore_job_id, "Restore job status: {:?}", status.state);
            match status.state {
                RestoreState::Pending | RestoreState::Running => Ok(Poll::Pending),
                RestoreState::Completed => match status.created_resource_ref {
                    Some(reference) => Ok(Poll::Ready(reference)),
                    None => Err(WorkflowError::external(
                        "backup",
                        format!("restore job {} completed without a created resource", restore_job_id),
                    )),
                },
                RestoreState::Failed | RestoreState::Aborted => Err(WorkflowError::external(
                    "backup",
                    format!(
                        "restore job {} ended {:?}: {}",
                        restore_job_id,
                        status.state,
                        status.message.as_deref().unwrap_or("no detail")
                    ),
                )),
            }
        })
        .await
    }

    async fn wait_for_task(&self, task_ref: &str) -> Result<(), WorkflowError> {
        let execution = &*self.services.execution;
        poll_until(self.config.scan_poll, "scan task", move || async move {
            let status = execution.task_status(task_ref).await?;
            tracing::info!(task = %task_ref, "Scan task status: {:?}", status.state);
            let reason = status.stop_reason.as_deref().unwrap_or("no stop reason");
            match status.state {
                TaskState::Pending | TaskState::Running => Ok(Poll::Pending),
                TaskState::Stopped => match status.exit_code {
                    Some(code) if code != 0 => Err(WorkflowError::external(
                        "execution",
                        format!("scan task {} exited with code {}: {}", task_ref, code, reason),
                    )),
                    _ => Ok(Poll::Ready(())),
                },
                TaskState::Failed => Err(WorkflowError::external(
                    "execution",
                    format!("scan task {} failed: {}", task_ref, reason),
                )),
            }
        })
        .await
    }

    fn access_point_request(&self, storage_id: &str) -> AccessPointRequest {
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), format!("{}-temp-ap", self.config.project_name));
        tags.insert("Temporary".to_string(), "true".to_string());
        tags.insert("Purpose".to_string(), "BackupVerification".to_string());

        AccessPointRequest {
            storage_id: storage_id.to_string(),
            identity: PosixIdentity { uid: 0, gid: 0 },
            root_path: "/".into(),
            tags,
        }
    }

    fn task_request(&self, run_id: Uuid, storage_id: &str, access_point_id: &str) -> TaskRequest {
        let task = &self.config.task;
        let keys = &self.config.keys;
        let output = format!("{}/{}", task.output_dir.trim_end_matches('/'), keys.restored_file_name);

        let mut command = vec![
            "generate".to_string(),
            "--mount-point".into(),
            task.mount_point.clone(),
            "--output".into(),
            output,
            "--bucket".into(),
            self.config.bucket.clone(),
            "--prefix".into(),
            keys.restored_prefix_for(run_id),
        ];
        if let Some(url) = &task.store_url {
            command.push("--store-url".into());
            command.push(url.clone());
        }

        TaskRequest {
            template: task.task_definition.clone(),
            cluster: task.cluster.clone(),
            container_name: task.container_name.clone(),
            command,
            storage_id: storage_id.to_string(),
            access_point_id: access_point_id.to_string(),
            mount_point: task.mount_point.clone(),
            subnets: task.subnet_ids.clone(),
            security_groups: task.security_group_ids.clone(),
            assign_public_ip: false,
        }
    }

    async fn notify(
        &self,
        session: &RestoreSession,
        result: &Result<DiscrepancyReport, WorkflowError>,
    ) -> Option<Notification> {
        let notifier = match &self.services.notifier {
            Some(n) => n,
            None => {
                tracing::info!(run_id = %session.run_id, "No notifier configured, skipping alert");
                return None;
            }
        };

        let notification = match result {
            Ok(report) if report.is_consistent() => Notification::Consistent,
            Ok(report) => Notification::Discrepancies(report.clone()),
            Err(e) => Notification::Failed(e.to_string()),
        };

        match notifier.publish(&notification).await {
            Ok(()) => {
                tracing::info!(run_id = %session.run_id, "Published {} alert", notification.kind());
                Some(notification)
            }
            Err(e) => {
                tracing::error!(run_id = %session.run_id, "Failed to publish alert: {}", e);
                None
            }
        }
    }

    /// Tear down what the session recorded, newest first. Never fails.
    async fn cleanup(&self, session: &RestoreSession) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Some(task_ref) = &session.task_ref {
            tracing::info!(run_id = %session.run_id, "Stopping scan task {}", task_ref);
            report.attempted.push(Teardown::StopTask(task_ref.clone()));
            if let Err(e) = self
                .services
                .execution
                .stop_task(task_ref, "backup verification cleanup")
                .await
            {
                tracing::warn!(run_id = %session.run_id, "Could not stop scan task {}: {}", task_ref, e);
                report.failures.push(e.to_string());
            }
        }

        if let Some(access_point_id) = &session.access_point_id {
            tracing::info!(run_id = %session.run_id, "Deleting access point {}", access_point_id);
            report.attempted.push(Teardown::DeleteAccessPoint(access_point_id.clone()));
            if let Err(e) = self.services.exposure.delete_access_point(access_point_id).await {
                tracing::warn!(run_id = %session.run_id, "Could not delete access point {}: {}", access_point_id, e);
                report.failures.push(e.to_string());
            }
        }

        if let Some(storage_id) = &session.storage_id {
            tracing::info!(run_id = %session.run_id, "Deleting restored file system {}", storage_id);
            report.attempted.push(Teardown::DeleteStorage(storage_id.clone()));
            if let Err(e) = self.services.exposure.delete_storage(storage_id).await {
                tracing::warn!(run_id = %session.run_id, "Could not delete file system {}: {}", storage_id, e);
                report.failures.push(e.to_string());
            }
        }

        report
    }
}

fn transition<F>(session: &mut RestoreSession, next: RunState, on_state: &F)
where
    F: Fn(RunState) + Send + Sync,
{
    session.advance(next);
    on_state(next);
}
