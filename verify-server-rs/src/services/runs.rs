use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use manifest_agent::DiscrepancyReport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::orchestrator::{Orchestrator, RunOutcome};
use crate::models::{BackupCompletion, RunState};

/// What the API reports about a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub resource_id: String,
    pub backup_job_id: String,
    pub recovery_point_arn: String,
    pub state: RunState,
    pub verdict: Option<&'static str>,
    pub error: Option<String>,
    pub report: Option<DiscrepancyReport>,
    pub cleanup_failures: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-memory run history plus the one-active-run-per-resource lock.
#[derive(Default)]
pub struct RunRegistry {
    runs: DashMap<Uuid, RunRecord>,
    active: DashMap<String, Uuid>,
    tasks: TaskTracker,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run unless one is already active for the same resource.
    /// Returns the active run's id on conflict.
    pub fn try_begin(&self, completion: &BackupCompletion) -> Result<Uuid, Uuid> {
        let resource = completion.resource_id().to_string();
        let id = match self.active.entry(resource.clone()) {
            Entry::Occupied(existing) => return Err(*existing.get()),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                slot.insert(id);
                id
            }
        };

        self.runs.insert(
            id,
            RunRecord {
                id,
                resource_id: resource,
                backup_job_id: completion.backup_job_id.clone(),
                recovery_point_arn: completion.recovery_point_arn.clone(),
                state: RunState::Idle,
                verdict: None,
                error: None,
                report: None,
                cleanup_failures: Vec::new(),
                started_at: Utc::now(),
                finished_at: None,
            },
        );
        Ok(id)
    }

    pub fn set_state(&self, id: Uuid, state: RunState) {
        if let Some(mut record) = self.runs.get_mut(&id) {
            record.state = state;
        }
    }

    pub fn finish(&self, id: Uuid, outcome: &RunOutcome) {
        if let Some(mut record) = self.runs.get_mut(&id) {
            record.state = outcome.session.state;
            record.verdict = Some(outcome.verdict());
            match &outcome.result {
                Ok(report) => record.report = Some(report.clone()),
                Err(e) => record.error = Some(e.to_string()),
            }
            record.cleanup_failures = outcome.cleanup.failures.clone();
            record.finished_at = Some(Utc::now());
        }
    }

    /// Mark a run that never produced an outcome (its task died).
    fn abandon(&self, id: Uuid, reason: &str) {
        if let Some(mut record) = self.runs.get_mut(&id) {
            if record.finished_at.is_none() {
                record.state = RunState::Failed;
                record.verdict = Some("failed");
                record.error = Some(reason.to_string());
                record.finished_at = Some(Utc::now());
            }
        }
    }

    fn release(&self, resource: &str, id: Uuid) {
        self.active.remove_if(resource, |_, active| *active == id);
    }

    pub fn get(&self, id: &Uuid) -> Option<RunRecord> {
        self.runs.get(id).map(|r| r.clone())
    }

    /// Newest first.
    pub fn list(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.runs.iter().map(|r| r.value().clone()).collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Wait up to `grace` for every spawned run task to finish.
    /// Returns false if some were still running when the grace period ended.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!("Waiting up to {}s for {} run(s) to clean up", grace.as_secs(), pending);
        }
        tokio::time::timeout(grace, self.tasks.wait()).await.is_ok()
    }
}

/// Frees the resource lock however the run task ends.
struct ActiveRun {
    registry: Arc<RunRegistry>,
    resource: String,
    id: Uuid,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.registry.abandon(self.id, "run task ended without an outcome");
        self.registry.release(&self.resource, self.id);
    }
}

/// Start a run in the background. Returns the conflicting run id if the
/// resource is already being verified.
pub fn spawn_run(
    registry: Arc<RunRegistry>,
    orchestrator: Arc<Orchestrator>,
    completion: BackupCompletion,
    cancel: CancellationToken,
) -> Result<Uuid, Uuid> {
    let id = registry.try_begin(&completion)?;
    let guard = ActiveRun {
        registry: registry.clone(),
        resource: completion.resource_id().to_string(),
        id,
    };

    registry.tasks.spawn(async move {
        let states = guard.registry.clone();
        let outcome = orchestrator
            .run(id, completion, &cancel, move |state| states.set_state(id, state))
            .await;
        guard.registry.finish(id, &outcome);
        tracing::info!(run_id = %id, verdict = outcome.verdict(), "Verification run finished");
        drop(guard);
    });

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(resource: &str) -> BackupCompletion {
        BackupCompletion {
            backup_job_id: "job-1".into(),
            resource_arn: format!("arn:aws:elasticfilesystem:eu-west-1:123:file-system/{}", resource),
            recovery_point_arn: "rp-1".into(),
        }
    }

    #[test]
    fn test_one_active_run_per_resource() {
        let registry = RunRegistry::new();
        let first = registry.try_begin(&completion("fs-1")).unwrap();
        assert_eq!(registry.try_begin(&completion("fs-1")), Err(first));
        assert!(registry.try_begin(&completion("fs-2")).is_ok());

        registry.release("fs-1", first);
        assert!(registry.try_begin(&completion("fs-1")).is_ok());
    }

    #[test]
    fn test_release_ignores_other_run_ids() {
        let registry = RunRegistry::new();
        let id = registry.try_begin(&completion("fs-1")).unwrap();
        registry.release("fs-1", Uuid::new_v4());
        assert_eq!(registry.try_begin(&completion("fs-1")), Err(id));
    }

    #[test]
    fn test_state_updates_and_abandon() {
        let registry = RunRegistry::new();
        let id = registry.try_begin(&completion("fs-1")).unwrap();
        registry.set_state(id, RunState::AccessExposed);
        assert_eq!(registry.get(&id).unwrap().state, RunState::AccessExposed);

        registry.abandon(id, "task panicked");
        let record = registry.get(&id).unwrap();
        assert_eq!(record.state, RunState::Failed);
        assert_eq!(record.verdict, Some("failed"));
        assert!(record.finished_at.is_some());
        assert_eq!(registry.list().len(), 1);
    }
}
