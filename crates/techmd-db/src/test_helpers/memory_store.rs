use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use techmd_core::error::AppError;
use techmd_core::models::{
    stale_filenames, ChangeSet, FileChecksum, FilePart, FileRecord, FileRecordUpsert,
    ReconcileSummary,
};

use crate::store::FileRecordStore;

#[derive(Default)]
struct State {
    /// Keyed by (druid, filename) so iteration is filename-ordered per druid.
    records: BTreeMap<(String, String), FileRecord>,
    next_id: i64,
    apply_calls: usize,
    fail_apply: bool,
    fail_find: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn write(&mut self, upsert: &FileRecordUpsert) -> bool {
        let now = Utc::now();
        let key = (upsert.druid.clone(), upsert.filename.clone());
        let (id, created_at, inserted) = match self.records.get(&key) {
            Some(existing) => (existing.id, existing.created_at, false),
            None => (self.next_id(), now, true),
        };

        let parts = upsert
            .parts
            .iter()
            .map(|part| FilePart {
                id: self.next_id(),
                dro_file_id: id,
                part_type: part.part_type,
                part_id: part.part_id.clone(),
                order: part.order,
                format: part.format.clone(),
                metadata: part.metadata.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        self.records.insert(
            key,
            FileRecord {
                id,
                druid: upsert.druid.clone(),
                filename: upsert.filename.clone(),
                md5: upsert.md5.clone(),
                bytes: upsert.bytes,
                filetype: upsert.filetype.clone(),
                mimetype: upsert.mimetype.clone(),
                tool_versions: upsert.tool_versions.clone(),
                metadata: upsert.metadata.clone(),
                file_modification: upsert.file_modification,
                created_at,
                updated_at: now,
                parts,
            },
        );
        inserted
    }
}

/// `FileRecordStore` held in memory. `apply` runs under one lock, so it is
/// as atomic as the PostgreSQL transaction it stands in for.
#[derive(Clone, Default)]
pub struct MemoryFileRecordStore {
    state: Arc<Mutex<State>>,
}

impl MemoryFileRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record directly, bypassing reconciliation.
    pub fn seed(&self, upsert: FileRecordUpsert) {
        self.state.lock().unwrap().write(&upsert);
    }

    /// Overwrites a stored record's filetype, as an operator fixing data by hand would.
    pub fn set_filetype(&self, druid: &str, filename: &str, filetype: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state
            .records
            .get_mut(&(druid.to_string(), filename.to_string()))
        {
            record.filetype = filetype.map(str::to_string);
        }
    }

    pub fn records(&self, druid: &str) -> Vec<FileRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|record| record.druid == druid)
            .cloned()
            .collect()
    }

    pub fn get(&self, druid: &str, filename: &str) -> Option<FileRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&(druid.to_string(), filename.to_string()))
            .cloned()
    }

    pub fn apply_calls(&self) -> usize {
        self.state.lock().unwrap().apply_calls
    }

    /// Makes every subsequent `apply` fail before writing anything.
    pub fn fail_apply(&self, fail: bool) {
        self.state.lock().unwrap().fail_apply = fail;
    }

    /// Makes every subsequent `find` fail.
    pub fn fail_find(&self, fail: bool) {
        self.state.lock().unwrap().fail_find = fail;
    }
}

#[async_trait]
impl FileRecordStore for MemoryFileRecordStore {
    async fn find(&self, druid: &str, filename: &str) -> Result<Option<FileRecord>, AppError> {
        if self.state.lock().unwrap().fail_find {
            return Err(AppError::Internal("simulated storage failure".to_string()));
        }
        Ok(self.get(druid, filename).map(|mut record| {
            record.parts.clear();
            record
        }))
    }

    async fn exists_with_md5(
        &self,
        druid: &str,
        filename: &str,
        md5: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .get(druid, filename)
            .map(|record| record.md5 == md5)
            .unwrap_or(false))
    }

    async fn list_by_druid(&self, druid: &str) -> Result<Vec<FileRecord>, AppError> {
        Ok(self.records(druid))
    }

    async fn list_checksums(&self, druid: &str) -> Result<Vec<FileChecksum>, AppError> {
        Ok(self
            .records(druid)
            .into_iter()
            .map(|record| FileChecksum {
                filename: record.filename,
                md5: record.md5,
            })
            .collect())
    }

    async fn apply(&self, changes: ChangeSet) -> Result<ReconcileSummary, AppError> {
        let mut state = self.state.lock().unwrap();
        state.apply_calls += 1;
        if state.fail_apply {
            return Err(AppError::Internal("simulated storage failure".to_string()));
        }
        if let Some(stray) = changes.upserts.iter().find(|u| u.druid != changes.druid) {
            return Err(AppError::InvalidInput(format!(
                "upsert for {} does not belong to {}",
                stray.druid, changes.druid
            )));
        }

        let stored: Vec<String> = state
            .records
            .keys()
            .filter(|(druid, _)| *druid == changes.druid)
            .map(|(_, filename)| filename.clone())
            .collect();
        let deleted = stale_filenames(stored.iter().map(String::as_str), &changes.keep_filenames);
        for filename in &deleted {
            state
                .records
                .remove(&(changes.druid.clone(), filename.clone()));
        }

        let mut summary = ReconcileSummary {
            deleted,
            ..Default::default()
        };
        for upsert in &changes.upserts {
            if state.write(upsert) {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }
        Ok(summary)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
