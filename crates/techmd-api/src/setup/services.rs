//! Wiring of the store, tool adapters, notifier and workflow reporter.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use techmd_core::Config;
use techmd_db::FileRecordRepository;
use techmd_infra::reporter_from_config;
use techmd_processing::{ProcessRunner, ToolkitBuilder};
use techmd_services::{MoabStorage, TracingNotifier};
use techmd_worker::TaskQueueConfig;

use crate::state::{AppDependencies, AppState};

pub fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    let runner = Arc::new(ProcessRunner::new(config.tool_timeout()));
    let toolkits = ToolkitBuilder::new(config.tools().clone(), runner);

    let deps = AppDependencies {
        store: Arc::new(FileRecordRepository::new(pool)),
        toolkits: Arc::new(toolkits),
        notifier: Arc::new(TracingNotifier),
        workflow: reporter_from_config(config)?,
        moab: MoabStorage::from_config(config),
    };

    let queue_config = TaskQueueConfig::from_config(config);
    tracing::info!(
        default_lane_workers = queue_config.default_lane_workers,
        low_lane_workers = queue_config.low_lane_workers,
        capacity = queue_config.capacity,
        tool_timeout_secs = config.tool_timeout().as_secs(),
        moab_storage_roots = config.moab_storage_roots().len(),
        "Services initialized"
    );

    Ok(AppState::new(deps, queue_config))
}
