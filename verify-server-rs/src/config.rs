use std::time::Duration;

use crate::services::orchestrator::{ManifestKeys, TaskSettings, VerifyConfig};
use crate::services::poller::PollPolicy;

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    pub project_name: String,

    /// File system whose backups are verified
    pub monitored_resource_id: String,

    /// Base URL of the backup / exposure / execution gateway
    pub control_plane_url: String,
    pub control_plane_token: Option<String>,

    pub bucket: String,
    pub store_url: Option<String>,
    pub store_dir: Option<String>,
    pub store_token: Option<String>,

    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,

    /// Alerting webhook; alerts are skipped when unset
    pub notify_url: Option<String>,

    pub poll_interval_secs: u64,
    pub restore_timeout_secs: u64,
    pub scan_timeout_secs: u64,
    /// Overall wall-clock budget per run (0 = none)
    pub run_budget_secs: u64,
    /// How long shutdown waits for cancelled runs to finish cleanup
    pub shutdown_grace_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let num = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let list = |key: &str| parse_list(lookup(key).as_deref().unwrap_or(""));

        Self {
            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            log_level: var("LOG_LEVEL", "info"),
            project_name: var("PROJECT_NAME", "backup-verify"),
            monitored_resource_id: var("MONITORED_RESOURCE_ID", ""),
            control_plane_url: var("CONTROL_PLANE_URL", "http://localhost:4566"),
            control_plane_token: lookup("CONTROL_PLANE_TOKEN"),
            bucket: var("MANIFEST_BUCKET", "backup-verification"),
            store_url: lookup("STORE_URL"),
            store_dir: lookup("STORE_DIR"),
            store_token: lookup("STORE_TOKEN"),
            cluster: var("TASK_CLUSTER", "default"),
            task_definition: var("TASK_DEFINITION", ""),
            container_name: var("TASK_CONTAINER_NAME", "manifest-agent"),
            subnet_ids: list("SUBNET_IDS"),
            security_group_ids: list("SECURITY_GROUP_IDS"),
            notify_url: lookup("NOTIFY_WEBHOOK_URL").filter(|v| !v.is_empty()),
            poll_interval_secs: num("POLL_INTERVAL_SECS", 30),
            restore_timeout_secs: num("RESTORE_TIMEOUT_SECS", 6 * 3600),
            scan_timeout_secs: num("SCAN_TIMEOUT_SECS", 6 * 3600),
            run_budget_secs: num("RUN_BUDGET_SECS", 0),
            shutdown_grace_secs: num("SHUTDOWN_GRACE_SECS", 120),
        }
    }

    /// The explicit settings handed to the orchestrator.
    pub fn verify_config(&self) -> VerifyConfig {
        let interval = Duration::from_secs(self.poll_interval_secs.max(1));
        VerifyConfig {
            monitored_resource_id: self.monitored_resource_id.clone(),
            project_name: self.project_name.clone(),
            bucket: self.bucket.clone(),
            keys: ManifestKeys::default(),
            task: TaskSettings {
                cluster: self.cluster.clone(),
                task_definition: self.task_definition.clone(),
                container_name: self.container_name.clone(),
                subnet_ids: self.subnet_ids.clone(),
                security_group_ids: self.security_group_ids.clone(),
                store_url: self.store_url.clone(),
                ..TaskSettings::default()
            },
            restore_poll: PollPolicy::new(interval, Duration::from_secs(self.restore_timeout_secs)),
            scan_poll: PollPolicy::new(interval, Duration::from_secs(self.scan_timeout_secs)),
            run_budget: (self.run_budget_secs > 0).then(|| Duration::from_secs(self.run_budget_secs)),
        }
    }
}

/// Accepts a JSON array (`["a","b"]`) or a comma-separated list.
fn parse_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
            return items;
        }
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.poll_interval_secs, 30);
        assert!(config.notify_url.is_none());
        assert!(config.verify_config().run_budget.is_none());
        assert_eq!(config.shutdown_grace_secs, 120);
    }

    #[test]
    fn test_lists_accept_json_and_csv() {
        let config = config_from(&[
            ("SUBNET_IDS", r#"["subnet-a", "subnet-b"]"#),
            ("SECURITY_GROUP_IDS", "sg-1, sg-2,"),
        ]);
        assert_eq!(config.subnet_ids, vec!["subnet-a", "subnet-b"]);
        assert_eq!(config.security_group_ids, vec!["sg-1", "sg-2"]);
    }

    #[test]
    fn test_verify_config_carries_timeouts() {
        let config = config_from(&[
            ("MONITORED_RESOURCE_ID", "fs-0123"),
            ("POLL_INTERVAL_SECS", "5"),
            ("SCAN_TIMEOUT_SECS", "600"),
            ("RUN_BUDGET_SECS", "7200"),
            ("NOTIFY_WEBHOOK_URL", ""),
        ]);
        let verify = config.verify_config();
        assert_eq!(verify.monitored_resource_id, "fs-0123");
        assert_eq!(verify.scan_poll.interval, Duration::from_secs(5));
        assert_eq!(verify.scan_poll.timeout, Duration::from_secs(600));
        assert_eq!(verify.run_budget, Some(Duration::from_secs(7200)));
        assert!(config.notify_url.is_none());
    }
}
