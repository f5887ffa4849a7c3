//! Existence checks and content checksums.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};

/// Filesystem facts captured when a file is characterized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFacts {
    /// Lowercase hex MD5 of the content.
    pub md5: String,
    pub bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// The subset of `filepaths` that do not exist, in input order.
pub async fn missing_files<P: AsRef<Path>>(filepaths: &[P]) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    for filepath in filepaths {
        let filepath = filepath.as_ref();
        if !tokio::fs::try_exists(filepath).await.unwrap_or(false) {
            missing.push(filepath.to_path_buf());
        }
    }
    missing
}

/// Size, mtime and MD5 of an existing file.
#[tracing::instrument(fields(file.path = %filepath.display()))]
pub async fn file_facts(filepath: &Path) -> std::io::Result<FileFacts> {
    let metadata = tokio::fs::metadata(filepath).await?;
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let md5 = md5_file(filepath.to_path_buf()).await?;

    Ok(FileFacts {
        md5,
        bytes: metadata.len(),
        modified,
    })
}

/// Streams the file through MD5 on the blocking pool.
pub async fn md5_file(filepath: PathBuf) -> std::io::Result<String> {
    tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&filepath)?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(std::io::Error::other)?
}
