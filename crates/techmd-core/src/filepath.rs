//! Mapping on-disk paths to the filenames records are stored under.

use std::path::{Component, Path, PathBuf};

use crate::error::AppError;

/// `filepath` relative to `basepath`, with `/` separators.
pub fn filename_for(filepath: &Path, basepath: &Path) -> Result<String, AppError> {
    let relative = filepath.strip_prefix(basepath).map_err(|_| {
        AppError::InvalidInput(format!(
            "{} is not under {}",
            filepath.display(),
            basepath.display()
        ))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(AppError::InvalidInput(format!(
                    "{} cannot be expressed relative to {}",
                    filepath.display(),
                    basepath.display()
                )))
            }
        }
    }

    if parts.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "{} names the base path itself",
            filepath.display()
        )));
    }

    Ok(parts.join("/"))
}

/// Pairs each filepath with its filename under `basepath`, preserving input order.
pub fn filepath_map_for<P: AsRef<Path>>(
    filepaths: &[P],
    basepath: &Path,
) -> Result<Vec<(PathBuf, String)>, AppError> {
    filepaths
        .iter()
        .map(|filepath| {
            let filepath = filepath.as_ref();
            Ok((filepath.to_path_buf(), filename_for(filepath, basepath)?))
        })
        .collect()
}
