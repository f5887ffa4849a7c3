//! Decoding of file URIs and form-encoded filenames from request bodies.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use techmd_core::AppError;

/// Percent-decodes `value`, reading `+` as a space.
pub(crate) fn decode_component(value: &str) -> Result<String, AppError> {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| AppError::InvalidInput(format!("{} is not valid UTF-8 once decoded", value)))
}

/// Local path named by a (usually `file://`) URI. A bare path is accepted as is.
pub(crate) fn filepath_from_uri(uri: &str) -> Result<PathBuf, AppError> {
    let path = match uri.split_once("://") {
        Some((_scheme, rest)) => rest.find('/').map(|start| &rest[start..]).unwrap_or(""),
        None => uri,
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();

    if path.is_empty() {
        return Err(AppError::InvalidInput(format!("{} has no path", uri)));
    }
    Ok(PathBuf::from(decode_component(path)?))
}
