//! Application state shared by handlers and the task queue.

use std::sync::{Arc, Weak};

use techmd_db::FileRecordStore;
use techmd_infra::workflow::local_hostname;
use techmd_infra::WorkflowReporter;
use techmd_processing::ToolkitFactory;
use techmd_services::{AuditService, ErrorNotifier, MoabStorage, TechnicalMetadataGenerator};
use techmd_worker::{TaskHandlerContext, TaskQueue, TaskQueueConfig};

/// Collaborators the state is assembled from.
pub struct AppDependencies {
    pub store: Arc<dyn FileRecordStore>,
    /// Tool adapters, handed out once per task.
    pub toolkits: Arc<dyn ToolkitFactory>,
    pub notifier: Arc<dyn ErrorNotifier>,
    pub workflow: Arc<dyn WorkflowReporter>,
    pub moab: MoabStorage,
}

pub struct AppState {
    pub store: Arc<dyn FileRecordStore>,
    pub toolkits: Arc<dyn ToolkitFactory>,
    pub audit: AuditService,
    pub notifier: Arc<dyn ErrorNotifier>,
    pub workflow: Arc<dyn WorkflowReporter>,
    pub moab: MoabStorage,
    pub task_queue: TaskQueue,
    /// Named in workflow notes.
    pub hostname: String,
}

impl AppState {
    /// Builds the state and starts the task queue, whose workers dispatch
    /// back into it. Must be called inside a Tokio runtime.
    pub fn new(deps: AppDependencies, queue_config: TaskQueueConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<AppState>| {
            let context: Weak<dyn TaskHandlerContext> = weak.clone();
            AppState {
                toolkits: deps.toolkits,
                audit: AuditService::new(deps.store.clone()),
                store: deps.store,
                notifier: deps.notifier,
                workflow: deps.workflow,
                moab: deps.moab,
                task_queue: TaskQueue::new(queue_config, context),
                hostname: local_hostname(),
            }
        })
    }

    /// A generator over freshly built tool adapters, so a tool upgraded
    /// while the service runs is reported with its new version.
    pub fn generator(&self) -> TechnicalMetadataGenerator {
        TechnicalMetadataGenerator::new(
            self.store.clone(),
            self.toolkits.toolkit(),
            self.notifier.clone(),
        )
    }
}
