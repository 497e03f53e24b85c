//! Utility functions for jobcache-core

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Prefix of every staging directory name
pub const JOB_CACHE_PREFIX: &str = "jobCache";

/// Second-precision UTC timestamp used in staging directory names
pub const JOB_CACHE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Build the staging directory name for a run started at `now`
///
/// The name must be computed once per run and shared by every target so all
/// clusters carry the same cache version.
pub fn staging_dir_name(now: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        JOB_CACHE_PREFIX,
        now.format(JOB_CACHE_TIMESTAMP_FORMAT)
    )
}

/// Check that `value` is a usable single path segment
pub fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Configuration(format!("{} can not be empty", what)));
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(Error::Configuration(format!(
            "{} must be a single path segment: {}",
            what, value
        )));
    }
    Ok(())
}

/// Check that `value` is a relative path without parent references
pub fn validate_relative(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Configuration(format!("{} can not be empty", what)));
    }
    if value.starts_with('/') {
        return Err(Error::Configuration(format!(
            "{} must be relative: {}",
            what, value
        )));
    }
    for segment in value.split('/').filter(|s| !s.is_empty()) {
        validate_segment(what, segment)?;
    }
    Ok(())
}

/// File name of a local path as UTF-8
pub fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidPath(format!("no usable file name: {}", path.display())))
}
