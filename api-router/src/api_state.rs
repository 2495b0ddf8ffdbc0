use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use generation_pipeline::{BulkJobOrchestrator, ProgressReporter};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub orchestrator: Arc<BulkJobOrchestrator>,
    pub reporter: ProgressReporter,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        orchestrator: Arc<BulkJobOrchestrator>,
        reporter: ProgressReporter,
    ) -> Self {
        Self {
            db,
            config,
            orchestrator,
            reporter,
        }
    }
}
