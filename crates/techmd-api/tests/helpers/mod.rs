//! Test helpers: build AppState and router over the in-memory store.
//!
//! Run from workspace root: `cargo test -p techmd-api`.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use tempfile::TempDir;

use techmd_api::setup::routes;
use techmd_api::{AppDependencies, AppState, TaskQueueConfig};
use techmd_core::models::{FileRecordUpsert, ToolVersions, TypeMetadata};
use techmd_infra::WorkflowReporter;
use techmd_processing::{Identification, Toolkit, ToolkitFactory};
use techmd_services::test_helpers::{toolkit, MemoryFileRecordStore, RecordingNotifier, StaticIdentifier};
use techmd_services::MoabStorage;

pub const DRUID: &str = "druid:bc123df4567";
pub const BAR_MD5: &str = "c157a79031e1c40f85931829bc5fc552";
pub const FOO_MD5: &str = "d3b07384d113edec49eaa6238ad5ff00";

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowUpdate {
    Completed(String),
    Errored(String, String),
}

/// Records workflow updates instead of sending them.
#[derive(Clone, Default)]
pub struct RecordingWorkflowReporter {
    updates: Arc<Mutex<Vec<WorkflowUpdate>>>,
}

impl RecordingWorkflowReporter {
    pub fn updates(&self) -> Vec<WorkflowUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Waits until at least `count` updates arrived.
    pub async fn wait_for(&self, count: usize) -> Vec<WorkflowUpdate> {
        for _ in 0..200 {
            let updates = self.updates();
            if updates.len() >= count {
                return updates;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} workflow updates, got {:?}", count, self.updates());
    }
}

#[async_trait]
impl WorkflowReporter for RecordingWorkflowReporter {
    async fn update_status(&self, druid: &str, _elapsed: Duration) -> anyhow::Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push(WorkflowUpdate::Completed(druid.to_string()));
        Ok(())
    }

    async fn update_error_status(&self, druid: &str, error_msg: &str) -> anyhow::Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push(WorkflowUpdate::Errored(druid.to_string(), error_msg.to_string()));
        Ok(())
    }
}

/// Hands out the same fake toolkit and counts how often it was asked.
#[derive(Clone)]
pub struct CountingToolkits {
    toolkit: Toolkit,
    built: Arc<AtomicUsize>,
}

impl CountingToolkits {
    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl ToolkitFactory for CountingToolkits {
    fn toolkit(&self) -> Toolkit {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.toolkit.clone()
    }
}

/// Test application: server plus handles on its collaborators.
pub struct TestApp {
    pub server: TestServer,
    pub store: MemoryFileRecordStore,
    pub workflow: RecordingWorkflowReporter,
    pub notifier: RecordingNotifier,
    pub toolkits: CountingToolkits,
    /// Holds `bar.txt` and `dir/foo.txt`.
    pub content_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn file_uri(&self, filename: &str) -> String {
        format!("file://{}", self.content_dir.path().join(filename).display())
    }

    /// Moab storage root the service reads, with trunk `sdr2objects`.
    pub fn moab_root(&self) -> PathBuf {
        self.content_dir.path().join("moab")
    }

    pub fn basepath(&self) -> String {
        self.content_dir.path().display().to_string()
    }

    pub fn seed(&self, druid: &str, filename: &str, md5: &str) {
        self.store.seed(FileRecordUpsert {
            druid: druid.to_string(),
            filename: filename.to_string(),
            md5: md5.to_string(),
            bytes: 4,
            file_modification: None,
            filetype: Some("x-fmt/111".to_string()),
            mimetype: Some("text/plain".to_string()),
            tool_versions: ToolVersions::new(),
            metadata: TypeMetadata::None,
            parts: Vec::new(),
        });
    }
}

/// Must be called from within a Tokio runtime.
pub fn setup_test_app() -> TestApp {
    let content_dir = tempfile::tempdir().expect("Failed to create temp directory");
    fs::write(content_dir.path().join("bar.txt"), "bar\n").unwrap();
    fs::create_dir(content_dir.path().join("dir")).unwrap();
    fs::write(content_dir.path().join("dir/foo.txt"), "foo\n").unwrap();

    let store = MemoryFileRecordStore::new();
    let workflow = RecordingWorkflowReporter::default();
    let notifier = RecordingNotifier::new();
    let identifier = StaticIdentifier::new(Identification::new(Some("x-fmt/111"), Some("text/plain")));

    let toolkits = CountingToolkits {
        toolkit: toolkit(&identifier, &[]),
        built: Arc::new(AtomicUsize::new(0)),
    };

    let deps = AppDependencies {
        store: Arc::new(store.clone()),
        toolkits: Arc::new(toolkits.clone()),
        notifier: Arc::new(notifier.clone()),
        workflow: Arc::new(workflow.clone()),
        moab: MoabStorage::new(vec![content_dir.path().join("moab")], "sdr2objects"),
    };
    let queue_config = TaskQueueConfig {
        default_lane_workers: 2,
        low_lane_workers: 1,
        capacity: 10,
        timeout: Duration::from_secs(10),
        max_retries: 0,
        retry_base: Duration::from_millis(1),
    };
    let state = AppState::new(deps, queue_config);

    let app = routes::setup_routes(state);
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        store,
        workflow,
        notifier,
        toolkits,
        content_dir,
    }
}
