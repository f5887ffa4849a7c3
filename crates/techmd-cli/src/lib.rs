use std::path::{Path, PathBuf};

use anyhow::Context;
use techmd_core::filepath::filepath_map_for;
use techmd_core::models::FileChecksum;
use techmd_processing::file_facts;

/// Every regular file under `basepath`, sorted.
pub fn list_files(basepath: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(basepath).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to read {}", basepath.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// (filepath, filename) pairs for `files`, or for everything under
/// `basepath` when `files` is empty. Relative paths are taken from `basepath`.
pub fn resolve_files(basepath: &Path, files: &[PathBuf]) -> anyhow::Result<Vec<(PathBuf, String)>> {
    let filepaths = if files.is_empty() {
        list_files(basepath)?
    } else {
        files
            .iter()
            .map(|file| {
                if file.is_absolute() {
                    file.clone()
                } else {
                    basepath.join(file)
                }
            })
            .collect()
    };
    Ok(filepath_map_for(&filepaths, basepath)?)
}

/// md5 of each local file under its filename.
pub async fn local_checksums(filepath_map: &[(PathBuf, String)]) -> anyhow::Result<Vec<FileChecksum>> {
    let mut checksums = Vec::with_capacity(filepath_map.len());
    for (filepath, filename) in filepath_map {
        let facts = file_facts(filepath)
            .await
            .with_context(|| format!("Failed to checksum {}", filepath.display()))?;
        checksums.push(FileChecksum::new(filename.clone(), facts.md5));
    }
    Ok(checksums)
}

/// Initialize tracing for CLI binaries. Logs go to stderr so stdout stays JSON.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
