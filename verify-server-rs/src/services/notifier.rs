use async_trait::async_trait;
use manifest_agent::DiscrepancyReport;
use serde_json::json;

use super::collaborators::{CallResult, Notifier};
use crate::error::WorkflowError;

const SUBJECT_PREFIX: &str = "Backup Consistency Alert";

/// The single alert a run emits.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Consistent,
    Discrepancies(DiscrepancyReport),
    Failed(String),
}

impl Notification {
    pub fn subject(&self) -> String {
        match self {
            Notification::Consistent => format!("{}: Success", SUBJECT_PREFIX),
            Notification::Discrepancies(_) => format!("{}: Discrepancies Found!", SUBJECT_PREFIX),
            Notification::Failed(_) => format!("{}: Process Failed", SUBJECT_PREFIX),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::Consistent => {
                "Backup consistency check PASSED: no discrepancies found. The backup is consistent.".to_string()
            }
            Notification::Discrepancies(report) => {
                serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("unrenderable report: {}", e))
            }
            Notification::Failed(detail) => {
                format!("An error occurred during the backup consistency check: {}", detail)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Consistent => "consistent",
            Notification::Discrepancies(_) => "discrepancies",
            Notification::Failed(_) => "failed",
        }
    }
}

/// Posts `{subject, message, kind}` to an alerting webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, notification: &Notification) -> CallResult<()> {
        let body = json!({
            "subject": notification.subject(),
            "message": notification.body(),
            "kind": notification.kind(),
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkflowError::external("notifier", e))?;

        if !resp.status().is_success() {
            return Err(WorkflowError::external(
                "notifier",
                format!("webhook returned {}", resp.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifest_agent::manifest::reconcile::SizeMismatch;

    #[test]
    fn test_subjects_differ_per_outcome() {
        let report = DiscrepancyReport::default();
        let subjects = [
            Notification::Consistent.subject(),
            Notification::Discrepancies(report).subject(),
            Notification::Failed("boom".into()).subject(),
        ];
        assert!(subjects[0].ends_with("Success"));
        assert!(subjects[1].contains("Discrepancies"));
        assert!(subjects[2].ends_with("Process Failed"));
    }

    #[test]
    fn test_discrepancy_body_is_report_json() {
        let mut report = DiscrepancyReport::default();
        report.only_in_original.push("a.txt".into());
        report.size_mismatches.push(SizeMismatch {
            path: "b.txt".into(),
            original_size: 10,
            candidate_size: 5,
        });
        let body = Notification::Discrepancies(report).body();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["only_in_original"], serde_json::json!(["a.txt"]));
        assert_eq!(parsed["size_mismatches"][0]["path"], "b.txt");
    }

    #[test]
    fn test_failure_body_carries_detail() {
        let body = Notification::Failed("restore: job aborted".into()).body();
        assert!(body.contains("restore: job aborted"));
    }
}
