//! Entry point tying modes, connections and the orchestrator together

use crate::config::{load_cluster_configs, ClusterConfig};
use crate::fs::Connectors;
use crate::load::{load, CacheLoadRequest, LoadReport};
use crate::mode::{LoadJobCacheMode, ModeOptions};
use crate::path::{location_of, qualify, FileSystemPath};
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// One job cache load run
///
/// Connections are opened before any file is resolved, and every connection
/// is released before [`Launcher::run`] returns, whatever the outcome.
#[derive(Debug)]
pub struct Launcher {
    mode: Box<dyn LoadJobCacheMode>,
    options: ModeOptions,
    output_paths: Vec<String>,
    conf_dirs: Vec<PathBuf>,
    request: CacheLoadRequest,
}

impl Launcher {
    pub fn new(
        mode: Box<dyn LoadJobCacheMode>,
        options: ModeOptions,
        output_paths: Vec<String>,
        request: CacheLoadRequest,
    ) -> Self {
        Self {
            mode,
            options,
            output_paths,
            conf_dirs: Vec::new(),
            request,
        }
    }

    /// Cluster configuration directories to read
    pub fn with_conf_dirs(mut self, conf_dirs: Vec<PathBuf>) -> Self {
        self.conf_dirs = conf_dirs;
        self
    }

    pub fn request(&self) -> &CacheLoadRequest {
        &self.request
    }

    /// Run the load against every output path
    pub fn run(&self, connectors: &Connectors) -> Result<LoadReport> {
        if self.output_paths.is_empty() {
            return Err(Error::Configuration(
                "At least one output path is required".to_string(),
            ));
        }

        info!("Converting config dirs");
        let confs = load_cluster_configs(&self.conf_dirs)?;

        let targets = self.open_targets(&confs, connectors)?;
        let result = self.load_into(&targets);

        info!("Closing file system objects");
        for target in &targets {
            target.close();
        }
        result
    }

    /// Open one connection per distinct output path
    ///
    /// Output paths naming the same location are opened once. Connections
    /// opened before a failure are released when the partial list is dropped.
    pub fn open_targets(
        &self,
        confs: &[ClusterConfig],
        connectors: &Connectors,
    ) -> Result<Vec<FileSystemPath>> {
        info!("Constructing file system paths");
        let mut seen = HashSet::with_capacity(self.output_paths.len());
        let mut targets = Vec::with_capacity(self.output_paths.len());
        for path in &self.output_paths {
            let uri = qualify(path, confs)?;
            if !seen.insert(location_of(&uri)?) {
                warn!("Skipping duplicate output path {} ({})", path, uri);
                continue;
            }
            targets.push(FileSystemPath::open(uri, confs, connectors)?);
        }
        Ok(targets)
    }

    fn load_into(&self, targets: &[FileSystemPath]) -> Result<LoadReport> {
        info!("Finding files to load");
        let files: Vec<PathBuf> = self
            .mode
            .files_to_load(&self.options)?
            .into_iter()
            .collect();

        if files.is_empty() {
            warn!(
                "No files were found to load cache for mode {} with options {:?}",
                self.mode.mode(),
                self.options
            );
            return Ok(LoadReport {
                staging_dir: self.request.staging_dir.clone(),
                ..Default::default()
            });
        }

        info!(
            "Loading job cache with timestamp {}",
            self.request.staging_dir
        );
        load(targets, &files, &self.request)
    }
}
