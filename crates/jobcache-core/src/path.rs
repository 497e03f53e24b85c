//! Scoped connection to one target cluster

use crate::config::ClusterConfig;
use crate::fs::{Connectors, FileSystem, FsPath};
use crate::{Error, PromotionError, Result, TransferError};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Destination root on one cluster plus the live connection to it
///
/// The connection is released exactly once: by [`FileSystemPath::close`] or,
/// failing that, when the value is dropped. Workers borrow the path and never
/// close it.
pub struct FileSystemPath {
    uri: Url,
    root: FsPath,
    conf: ClusterConfig,
    fs: Arc<dyn FileSystem>,
    closed: AtomicBool,
}

impl FileSystemPath {
    /// Open a connection for `root` using the matching cluster configuration
    ///
    /// A bare absolute path is qualified against the first cluster
    /// configuration declaring a `default_fs`, or `file:///` when none does.
    pub fn new(root: &str, confs: &[ClusterConfig], connectors: &Connectors) -> Result<Self> {
        Self::open(qualify(root, confs)?, confs, connectors)
    }

    /// Open a connection for an already qualified URI
    pub fn open(uri: Url, confs: &[ClusterConfig], connectors: &Connectors) -> Result<Self> {
        let conf = confs
            .iter()
            .find(|conf| conf.serves(&uri))
            .cloned()
            .unwrap_or_else(|| {
                debug!("No cluster configuration serves {}, using defaults", uri);
                ClusterConfig::default()
            });

        let fs = connectors.connect(&uri, &conf)?;
        Self::with_filesystem(uri, conf, fs)
    }

    /// Wrap an already open connection
    pub fn with_filesystem(uri: Url, conf: ClusterConfig, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let root = root_of(&uri)?;
        Ok(Self {
            uri,
            root,
            conf,
            fs,
            closed: AtomicBool::new(false),
        })
    }

    /// Key identifying the directory this target writes to
    ///
    /// Two targets with the same location share every staging path.
    pub fn location(&self) -> String {
        location_key(&self.uri, &self.root)
    }

    /// Qualified URI of the destination root
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Destination root on the cluster
    pub fn root(&self) -> &FsPath {
        &self.root
    }

    /// Cluster configuration the connection was opened with
    pub fn conf(&self) -> &ClusterConfig {
        &self.conf
    }

    /// The underlying connection
    pub fn filesystem(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// `root/staging_dir[/sub_dir]`
    pub fn staging_root(&self, staging_dir: &str, sub_dir: Option<&str>) -> Result<FsPath> {
        let staging = self.root.join(staging_dir)?;
        match sub_dir {
            Some(sub_dir) => staging.join(sub_dir),
            None => Ok(staging),
        }
    }

    /// `root/(sub_dir or cache_alias)`
    pub fn final_path(&self, sub_dir: Option<&str>, cache_alias: &str) -> Result<FsPath> {
        self.root.join(sub_dir.unwrap_or(cache_alias))
    }

    /// Upload `local` to `dest` and request `replication` copies
    pub fn copy_into(
        &self,
        local: &Path,
        dest: &FsPath,
        replication: u16,
    ) -> std::result::Result<u64, TransferError> {
        let transfer = |source| TransferError {
            target: self.uri.to_string(),
            file: local.to_path_buf(),
            source,
        };

        if let Some(parent) = dest.parent() {
            self.fs.mkdirs(&parent).map_err(transfer)?;
        }
        let bytes = self.fs.copy_from_local(local, dest).map_err(transfer)?;
        if !self.fs.set_replication(dest, replication).map_err(transfer)? {
            debug!("{} does not manage replication for {}", self.uri, dest);
        }

        debug!("Copied {:?} to {}{} ({} bytes)", local, self.uri, dest, bytes);
        Ok(bytes)
    }

    /// Atomically make `final_path` refer to `staging`
    pub fn promote(
        &self,
        staging: &FsPath,
        final_path: &FsPath,
    ) -> std::result::Result<(), PromotionError> {
        self.fs
            .promote(staging, final_path)
            .map_err(|source| PromotionError {
                target: self.uri.to_string(),
                staging: staging.to_string(),
                final_path: final_path.to_string(),
                source,
            })
    }

    /// Release the connection; later calls do nothing
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.fs.close() {
            Ok(()) => debug!("Closed filesystem for {}", self.uri),
            Err(e) => warn!("Failed to close filesystem for {}: {}", self.uri, e),
        }
    }

    /// Whether [`FileSystemPath::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for FileSystemPath {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for FileSystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemPath")
            .field("uri", &self.uri.as_str())
            .field("cluster", &self.conf.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for FileSystemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri.as_str())
    }
}

/// Destination root named by a qualified URI
fn root_of(uri: &Url) -> Result<FsPath> {
    match uri.to_file_path() {
        Ok(path) if uri.scheme() == "file" => FsPath::new(
            path.to_str()
                .ok_or_else(|| Error::InvalidPath(format!("non UTF-8 path in {}", uri)))?,
        ),
        // `scheme://bucket` has an empty path
        _ if uri.path().is_empty() => Ok(FsPath::root()),
        _ => FsPath::new(uri.path()),
    }
}

fn location_key(uri: &Url, root: &FsPath) -> String {
    format!(
        "{}://{}:{}{}",
        uri.scheme(),
        uri.host_str().unwrap_or(""),
        uri.port_or_known_default().unwrap_or(0),
        root
    )
}

/// Location key of a qualified URI, without connecting
pub(crate) fn location_of(uri: &Url) -> Result<String> {
    Ok(location_key(uri, &root_of(uri)?))
}

/// Turn a destination root into a fully qualified URI
pub(crate) fn qualify(root: &str, confs: &[ClusterConfig]) -> Result<Url> {
    match Url::parse(root) {
        Ok(uri) => Ok(uri),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            if !root.starts_with('/') {
                return Err(Error::InvalidPath(format!(
                    "output path must be absolute or a URI: {}",
                    root
                )));
            }
            let base = confs
                .iter()
                .find_map(ClusterConfig::default_fs_url)
                .map(Ok)
                .unwrap_or_else(|| Url::parse("file:///"))
                .map_err(|e| Error::InvalidPath(e.to_string()))?;
            base.join(root)
                .map_err(|e| Error::InvalidPath(format!("{}: {}", root, e)))
        }
        Err(e) => Err(Error::InvalidPath(format!("{}: {}", root, e))),
    }
}
