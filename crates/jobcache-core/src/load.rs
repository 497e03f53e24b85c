//! Job cache load orchestration
//!
//! Every resolved file is copied to every target under the staging
//! directory on a single bounded worker pool. The batch always runs to
//! completion; failed units are collected instead of cancelling their
//! siblings. Promotion is decided per target afterwards: a target is promoted
//! only when every copy to it succeeded, so a failure on one cluster never
//! holds back the others.

use crate::config::LoadConfig;
use crate::fs::FsPath;
use crate::path::FileSystemPath;
use crate::progress::ProgressReporter;
use crate::utils::{file_name, validate_relative, validate_segment};
use crate::{CompositeLoadError, Error, Result, TransferError};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything the orchestrator needs besides targets and files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLoadRequest {
    /// Promote the staging directory once its copies succeeded
    pub finalize: bool,
    /// Replicas requested for every copied file
    pub replication: u16,
    /// Size of the worker pool
    pub workers: usize,
    /// Staging directory name shared by every target
    pub staging_dir: String,
    /// Optional directory below the staging directory
    pub sub_dir: Option<String>,
    /// Alias promoted when there is no sub directory
    pub cache_alias: String,
    /// Show a progress bar
    #[serde(skip)]
    pub show_progress: bool,
}

impl CacheLoadRequest {
    /// Request with default settings for `staging_dir`
    pub fn new(staging_dir: impl Into<String>) -> Self {
        Self::from_config(&LoadConfig::default(), staging_dir)
    }

    /// Request using the defaults of a [`LoadConfig`]
    pub fn from_config(config: &LoadConfig, staging_dir: impl Into<String>) -> Self {
        Self {
            finalize: config.finalize,
            replication: config.replication,
            workers: config.threads,
            staging_dir: staging_dir.into(),
            sub_dir: None,
            cache_alias: config.cache_alias.clone(),
            show_progress: false,
        }
    }

    /// Check the request before any I/O happens
    pub fn validate(&self) -> Result<()> {
        if self.replication == 0 {
            return Err(Error::Configuration(
                "Replication count must be positive".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(Error::Configuration(
                "Executor thread count must be positive".to_string(),
            ));
        }
        validate_segment("Timestamp directory", &self.staging_dir)?;
        validate_segment("Cache alias", &self.cache_alias)?;

        let alias = match self.sub_dir.as_deref() {
            Some(sub_dir) => {
                validate_relative("Sub directory", sub_dir)?;
                sub_dir
            }
            None => self.cache_alias.as_str(),
        };
        if alias.split('/').find(|s| !s.is_empty()) == Some(self.staging_dir.as_str()) {
            return Err(Error::Configuration(format!(
                "Final cache path {} would replace the staging directory",
                alias
            )));
        }
        Ok(())
    }
}

/// Outcome of a successful load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Staging directory used on every target
    pub staging_dir: String,
    /// Copy units that succeeded
    pub copied: usize,
    /// Bytes written across all targets
    pub bytes: u64,
    /// Targets whose staging directory was promoted
    pub promoted: Vec<String>,
}

/// One (target, file) copy
#[derive(Debug)]
struct CopyUnit<'a> {
    target: usize,
    file: &'a Path,
    dest: FsPath,
}

/// Stage `files` into every target and optionally promote them
///
/// Returns immediately without touching any filesystem when `files` is
/// empty. Any failed copy or promotion yields [`Error::Load`] naming every
/// failure.
pub fn load(
    targets: &[FileSystemPath],
    files: &[PathBuf],
    request: &CacheLoadRequest,
) -> Result<LoadReport> {
    let mut report = LoadReport {
        staging_dir: request.staging_dir.clone(),
        ..Default::default()
    };
    if files.is_empty() {
        debug!("No files to load");
        return Ok(report);
    }

    request.validate()?;
    unique_targets(targets)?;
    let names = unique_names(files)?;
    let sub_dir = request.sub_dir.as_deref();

    let staging_roots = targets
        .iter()
        .map(|t| t.staging_root(&request.staging_dir, sub_dir))
        .collect::<Result<Vec<_>>>()?;
    let final_paths = targets
        .iter()
        .map(|t| t.final_path(sub_dir, &request.cache_alias))
        .collect::<Result<Vec<_>>>()?;

    let mut units = Vec::with_capacity(targets.len() * files.len());
    for (target, staging_root) in staging_roots.iter().enumerate() {
        for (file, name) in files.iter().zip(&names) {
            units.push(CopyUnit {
                target,
                file,
                dest: staging_root.join(name)?,
            });
        }
    }

    info!(
        "Copying {} files to {} targets ({} copies, {} workers)",
        files.len(),
        targets.len(),
        units.len(),
        request.workers
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(request.workers)
        .thread_name(|i| format!("job-cache-{}", i))
        .build()
        .map_err(|e| Error::Other(format!("Failed to start worker pool: {}", e)))?;
    let progress = ProgressReporter::new(
        request.show_progress,
        "Loading job cache",
        units.len() as u64,
    );

    let outcomes: Vec<std::result::Result<u64, TransferError>> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| {
                let outcome =
                    targets[unit.target].copy_into(unit.file, &unit.dest, request.replication);
                progress.inc(1);
                outcome
            })
            .collect()
    });
    progress.finish("Copies finished");

    let mut errors = CompositeLoadError::default();
    let mut failed = vec![0usize; targets.len()];
    for (unit, outcome) in units.iter().zip(outcomes) {
        match outcome {
            Ok(bytes) => {
                report.copied += 1;
                report.bytes += bytes;
            }
            Err(e) => {
                warn!("{}", e);
                failed[unit.target] += 1;
                errors.transfers.push(e);
            }
        }
    }

    if request.finalize {
        for (idx, target) in targets.iter().enumerate() {
            if failed[idx] > 0 {
                warn!(
                    "Not promoting {}: {} copies failed, staging directory {} left in place",
                    target, failed[idx], staging_roots[idx]
                );
                continue;
            }

            match target.promote(&staging_roots[idx], &final_paths[idx]) {
                Ok(()) => {
                    info!(
                        "Promoted {} to {} on {}",
                        staging_roots[idx], final_paths[idx], target
                    );
                    report.promoted.push(target.uri().to_string());
                }
                Err(e) => {
                    warn!("{}", e);
                    errors.promotions.push(e);
                }
            }
        }
    } else {
        info!(
            "Finalize disabled, staging directory {} left in place",
            request.staging_dir
        );
    }

    if errors.is_empty() {
        info!(
            "Loaded {} copies ({} bytes) into {}",
            report.copied, report.bytes, report.staging_dir
        );
        Ok(report)
    } else {
        errors.promoted = report.promoted;
        Err(Error::Load(errors))
    }
}

/// Targets sharing a location would race on the same staging paths
fn unique_targets(targets: &[FileSystemPath]) -> Result<()> {
    let mut seen: HashMap<String, &FileSystemPath> = HashMap::with_capacity(targets.len());
    for target in targets {
        if let Some(previous) = seen.insert(target.location(), target) {
            return Err(Error::Configuration(format!(
                "{} and {} name the same output location",
                previous, target
            )));
        }
    }
    Ok(())
}

/// File names of `files`, which must be unique in the flat staging directory
fn unique_names(files: &[PathBuf]) -> Result<Vec<&str>> {
    let mut seen: HashMap<&str, &Path> = HashMap::with_capacity(files.len());
    let mut names = Vec::with_capacity(files.len());
    for file in files {
        let name = file_name(file)?;
        if let Some(previous) = seen.insert(name, file) {
            return Err(Error::Resolution(format!(
                "{} and {} would both be staged as {}",
                previous.display(),
                file.display(),
                name
            )));
        }
        names.push(name);
    }
    Ok(names)
}
