use std::collections::HashSet;

use super::file_record::FileRecordUpsert;

/// Everything one reconciliation pass writes for a druid.
///
/// After the store applies it, the druid's stored filenames equal
/// `keep_filenames` exactly, provided every kept filename is either already
/// stored or present in `upserts`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub druid: String,
    /// The full desired file set for the druid.
    pub keep_filenames: Vec<String>,
    pub upserts: Vec<FileRecordUpsert>,
}

impl ChangeSet {
    pub fn new(druid: impl Into<String>, keep_filenames: Vec<String>) -> Self {
        Self {
            druid: druid.into(),
            keep_filenames,
            upserts: Vec::new(),
        }
    }

    pub fn push(&mut self, upsert: FileRecordUpsert) {
        self.upserts.push(upsert);
    }
}

/// What a store did while applying a [`ChangeSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: Vec<String>,
}

/// Stored filenames absent from the desired set, in stored order.
pub fn stale_filenames<'a>(
    stored: impl IntoIterator<Item = &'a str>,
    keep: &[String],
) -> Vec<String> {
    let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
    stored
        .into_iter()
        .filter(|filename| !keep.contains(filename))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_filenames() {
        let stored = ["0001.html", "0002.html", "0003.html"];
        let keep = vec!["0001.html".to_string(), "0004.html".to_string()];
        assert_eq!(
            stale_filenames(stored, &keep),
            vec!["0002.html".to_string(), "0003.html".to_string()]
        );
    }

    #[test]
    fn test_empty_keep_list_deletes_everything() {
        let stored = ["a.txt"];
        assert_eq!(stale_filenames(stored, &[]), vec!["a.txt".to_string()]);
    }
}
