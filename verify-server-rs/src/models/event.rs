//! Inbound trigger events.
//!
//! The backup service announces job state changes as loosely-typed JSON:
//!
//! ```json
//! {
//!   "detail-type": "Backup Job State Change",
//!   "detail": {
//!     "state": "COMPLETED",
//!     "backupJobId": "…",
//!     "resourceArn": "arn:…:file-system/fs-0123",
//!     "recoveryPointArn": "arn:…:recovery-point:…"
//!   }
//! }
//! ```
//!
//! Parsing happens once at the boundary; everything after works on
//! [`BackupCompletion`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::session::resource_id;

const BACKUP_DETAIL_TYPE: &str = "Backup Job State Change";

#[derive(Debug, Default, Deserialize)]
struct RawEvent {
    #[serde(rename = "detail-type", alias = "detailType", default)]
    detail_type: Option<String>,
    #[serde(default)]
    detail: Option<RawDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDetail {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    backup_job_id: Option<String>,
    #[serde(default)]
    resource_arn: Option<String>,
    #[serde(default)]
    recovery_point_arn: Option<String>,
}

/// A successfully completed backup of the monitored resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupCompletion {
    pub backup_job_id: String,
    pub resource_arn: String,
    pub recovery_point_arn: String,
}

impl BackupCompletion {
    /// Identity of the backed-up resource (last `/` segment of its ARN).
    pub fn resource_id(&self) -> &str {
        resource_id(&self.resource_arn)
    }
}

/// Why an event was not acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Not a JSON object carrying a `detail` block
    NotABackupEvent,
    /// A `detail-type` other than a backup job state change
    UnrelatedEventType(String),
    /// Backup job in some state other than completed
    NotCompleted(String),
    /// Completed event without a required field
    MissingField(&'static str),
    /// Completed backup of some other resource
    OtherResource(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::NotABackupEvent => write!(f, "not a backup job event"),
            IgnoreReason::UnrelatedEventType(t) => write!(f, "unrelated event type {:?}", t),
            IgnoreReason::NotCompleted(state) => write!(f, "backup job state is {:?}", state),
            IgnoreReason::MissingField(field) => write!(f, "event is missing detail.{}", field),
            IgnoreReason::OtherResource(arn) => write!(f, "backup is for unmonitored resource {}", arn),
        }
    }
}

/// Recognized shapes of an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    BackupCompleted(BackupCompletion),
    Ignored(IgnoreReason),
}

impl TriggerEvent {
    /// Validate an untyped event.
    ///
    /// `monitored_resource_id` filters on the resource identity; an empty
    /// string accepts any resource.
    pub fn parse(value: &serde_json::Value, monitored_resource_id: &str) -> Self {
        let raw: RawEvent = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(_) => return TriggerEvent::Ignored(IgnoreReason::NotABackupEvent),
        };

        if let Some(detail_type) = raw.detail_type.as_deref() {
            if detail_type != BACKUP_DETAIL_TYPE {
                return TriggerEvent::Ignored(IgnoreReason::UnrelatedEventType(detail_type.to_string()));
            }
        }

        let Some(detail) = raw.detail else {
            return TriggerEvent::Ignored(IgnoreReason::NotABackupEvent);
        };

        let state = detail.state.unwrap_or_default();
        if !state.eq_ignore_ascii_case("COMPLETED") {
            return TriggerEvent::Ignored(IgnoreReason::NotCompleted(state));
        }

        let require = |field: Option<String>, name: &'static str| {
            field
                .filter(|v| !v.trim().is_empty())
                .ok_or(IgnoreReason::MissingField(name))
        };

        let completion = match (
            require(detail.backup_job_id, "backupJobId"),
            require(detail.resource_arn, "resourceArn"),
            require(detail.recovery_point_arn, "recoveryPointArn"),
        ) {
            (Ok(backup_job_id), Ok(resource_arn), Ok(recovery_point_arn)) => BackupCompletion {
                backup_job_id,
                resource_arn,
                recovery_point_arn,
            },
            (Err(reason), _, _) | (_, Err(reason), _) | (_, _, Err(reason)) => {
                return TriggerEvent::Ignored(reason)
            }
        };

        if !monitored_resource_id.is_empty() && completion.resource_id() != monitored_resource_id {
            return TriggerEvent::Ignored(IgnoreReason::OtherResource(completion.resource_arn));
        }

        TriggerEvent::BackupCompleted(completion)
    }
}
