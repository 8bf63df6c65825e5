use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::event::BackupCompletion;

/// Last `/` segment of a resource reference (`…:file-system/fs-0123` → `fs-0123`).
pub fn resource_id(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Where a verification run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    RestoreRequested,
    RestoreCompleted,
    AccessExposed,
    ScanTaskRunning,
    ScanTaskCompleted,
    ManifestsFetched,
    Reconciled,
    Notified,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::RestoreRequested => "restore_requested",
            RunState::RestoreCompleted => "restore_completed",
            RunState::AccessExposed => "access_exposed",
            RunState::ScanTaskRunning => "scan_task_running",
            RunState::ScanTaskCompleted => "scan_task_completed",
            RunState::ManifestsFetched => "manifests_fetched",
            RunState::Reconciled => "reconciled",
            RunState::Notified => "notified",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one run has created so far.
///
/// Each optional id is set the moment the matching resource exists, which is
/// what cleanup keys off.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreSession {
    pub run_id: Uuid,
    pub completion: BackupCompletion,
    pub state: RunState,
    pub restore_job_id: Option<String>,
    pub created_resource_ref: Option<String>,
    pub storage_id: Option<String>,
    pub access_point_id: Option<String>,
    pub task_ref: Option<String>,
}

impl RestoreSession {
    pub fn new(run_id: Uuid, completion: BackupCompletion) -> Self {
        Self {
            run_id,
            completion,
            state: RunState::Idle,
            restore_job_id: None,
            created_resource_ref: None,
            storage_id: None,
            access_point_id: None,
            task_ref: None,
        }
    }

    /// Record a transition and log it.
    pub fn advance(&mut self, next: RunState) {
        tracing::info!(
            run_id = %self.run_id,
            resource = %self.completion.resource_id(),
            from = %self.state,
            state = %next,
            "Run state changed"
        );
        self.state = next;
    }

    /// Called once the restore reports the created file system.
    pub fn set_created_resource(&mut self, reference: String) {
        self.storage_id = Some(resource_id(&reference).to_string());
        self.created_resource_ref = Some(reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion() -> BackupCompletion {
        BackupCompletion {
            backup_job_id: "job-1".into(),
            resource_arn: "arn:aws:elasticfilesystem:eu-west-1:123:file-system/fs-0123".into(),
            recovery_point_arn: "rp-1".into(),
        }
    }

    #[test]
    fn test_resource_id() {
        assert_eq!(resource_id("arn:aws:elasticfilesystem:eu-west-1:123:file-system/fs-abc"), "fs-abc");
        assert_eq!(resource_id("fs-abc"), "fs-abc");
        assert_eq!(resource_id("a/b/"), "");
    }

    #[test]
    fn test_created_resource_sets_storage_id() {
        let mut session = RestoreSession::new(Uuid::new_v4(), completion());
        assert!(session.storage_id.is_none());
        session.set_created_resource("arn:aws:elasticfilesystem:eu-west-1:123:file-system/fs-new".into());
        assert_eq!(session.storage_id.as_deref(), Some("fs-new"));
    }

    #[test]
    fn test_advance_and_terminal_states() {
        let mut session = RestoreSession::new(Uuid::new_v4(), completion());
        assert_eq!(session.state, RunState::Idle);
        session.advance(RunState::RestoreRequested);
        assert_eq!(session.state, RunState::RestoreRequested);
        assert!(!session.state.is_terminal());
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert_eq!(
            serde_json::to_value(RunState::ScanTaskRunning).unwrap(),
            serde_json::json!("scan_task_running")
        );
    }
}
