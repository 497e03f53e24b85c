//! Local (`file://`) filesystem backend

use super::{Connector, FileSystem, FsPath};
use crate::config::ClusterConfig;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use url::Url;

/// Suffix of files still being written
pub const COPYING_SUFFIX: &str = "._COPYING_";

/// Filesystem backed by the local disk
///
/// Local disks keep a single physical copy, so requested replication is only
/// recorded per path for the lifetime of the connection. Promotion swaps a
/// relative symlink into place with `rename(2)`, which is atomic on POSIX.
#[derive(Debug, Default)]
pub struct LocalFs {
    replication: Mutex<HashMap<FsPath, u16>>,
    closed: AtomicBool,
}

impl LocalFs {
    /// Open a new local connection
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "filesystem is closed",
            ));
        }
        Ok(())
    }

    fn replication_map(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<FsPath, u16>>> {
        self.replication
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "replication table poisoned"))
    }
}

fn local(path: &FsPath) -> PathBuf {
    PathBuf::from(path.as_str())
}

fn sibling(path: &Path, name: String) -> PathBuf {
    path.with_file_name(name)
}

impl FileSystem for LocalFs {
    fn mkdirs(&self, path: &FsPath) -> io::Result<()> {
        self.ensure_open()?;
        fs::create_dir_all(local(path))
    }

    fn copy_from_local(&self, source: &Path, dest: &FsPath) -> io::Result<u64> {
        self.ensure_open()?;
        let target = local(dest);
        let name = dest.name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "can not copy onto the root")
        })?;
        let copying = sibling(&target, format!("{}{}", name, COPYING_SUFFIX));

        let result = fs::copy(source, &copying).and_then(|bytes| {
            fs::File::open(&copying)?.sync_all()?;
            fs::rename(&copying, &target)?;
            Ok(bytes)
        });

        if result.is_err() {
            let _ = fs::remove_file(&copying);
        }
        result
    }

    fn set_replication(&self, path: &FsPath, replication: u16) -> io::Result<bool> {
        self.ensure_open()?;
        fs::metadata(local(path))?;
        self.replication_map()?.insert(path.clone(), replication);
        Ok(true)
    }

    fn replication(&self, path: &FsPath) -> io::Result<Option<u16>> {
        self.ensure_open()?;
        Ok(self.replication_map()?.get(path).copied())
    }

    #[cfg(unix)]
    fn promote(&self, staging: &FsPath, alias: &FsPath) -> io::Result<()> {
        self.ensure_open()?;
        let staging_dir = local(staging);
        if !staging_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("staging directory {} does not exist", staging),
            ));
        }

        let alias_path = local(alias);
        match fs::symlink_metadata(&alias_path) {
            Ok(meta) if !meta.file_type().is_symlink() => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a link", alias),
                ))
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let (parent, name) = match (alias.parent(), alias.name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "can not promote onto the root",
                ))
            }
        };
        fs::create_dir_all(local(&parent))?;

        let link_target = match staging.strip_prefix(&parent) {
            Some(relative) if !relative.is_empty() => PathBuf::from(relative),
            _ => staging_dir,
        };
        let pending = sibling(&alias_path, format!(".{}.{}.tmp", name, std::process::id()));
        let _ = fs::remove_file(&pending);

        std::os::unix::fs::symlink(&link_target, &pending)?;
        if let Err(e) = fs::rename(&pending, &alias_path) {
            let _ = fs::remove_file(&pending);
            return Err(e);
        }

        debug!("Linked {} -> {:?}", alias, link_target);
        Ok(())
    }

    #[cfg(not(unix))]
    fn promote(&self, _staging: &FsPath, alias: &FsPath) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("atomic link replacement is not available for {}", alias),
        ))
    }

    fn close(&self) -> io::Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.replication_map()?.clear();
        }
        Ok(())
    }
}

/// Connector for `file://` destinations
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl Connector for LocalConnector {
    fn schemes(&self) -> &[&str] {
        &["file"]
    }

    fn connect(&self, uri: &Url, conf: &ClusterConfig) -> io::Result<Arc<dyn FileSystem>> {
        match uri.host_str() {
            None | Some("") | Some("localhost") => {}
            Some(host) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("remote host {} is not reachable through file://", host),
                ))
            }
        }

        debug!("Opening local filesystem for {} (cluster {})", uri, conf.name);
        Ok(Arc::new(LocalFs::new()))
    }
}
