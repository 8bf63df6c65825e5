use crate::config::AppConfig;
use crate::services::orchestrator::Orchestrator;
use crate::services::runs::RunRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub runs: Arc<RunRegistry>,
    /// Cancelled on shutdown; every run listens to it
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            runs: Arc::new(RunRegistry::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn monitored_resource_id(&self) -> &str {
        &self.orchestrator.config().monitored_resource_id
    }
}
