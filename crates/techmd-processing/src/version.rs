//! Tool version queries.

use std::ffi::OsString;

use regex::Regex;

use crate::command::CommandRunner;
use crate::error::ToolError;

/// First capture group of `pattern` in `output`.
pub fn extract_version(output: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Runs a tool's version flag and pulls the version token out of whatever it prints.
pub(crate) async fn query_version(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[OsString],
    pattern: &Regex,
    label: &str,
) -> Result<String, ToolError> {
    let output = runner
        .run(program, args)
        .await?
        .check(format!("Getting {} version", label))?;
    let text = output.combined();
    extract_version(&text, pattern).ok_or_else(|| {
        ToolError::UnexpectedOutput(format!("Cannot extract {} version from: {}", label, text))
    })
}
