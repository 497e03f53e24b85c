//! Remote filesystem abstraction
//!
//! A [`FileSystem`] is one live connection to one cluster. Connections are
//! opened by a [`Connector`] chosen from a [`Connectors`] registry by the URI
//! scheme of the destination, and are shared by every worker copying to that
//! cluster, so implementations must be safe for concurrent use.

mod local;

pub use local::{LocalConnector, LocalFs, COPYING_SUFFIX};

use crate::config::ClusterConfig;
use crate::{Error, Result};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Absolute, normalized path on a remote filesystem
///
/// Always starts with `/`, never ends with one (except the root itself) and
/// never contains `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FsPath(String);

impl FsPath {
    /// The filesystem root
    pub fn root() -> Self {
        FsPath("/".to_string())
    }

    /// Parse and normalize an absolute path
    pub fn new(path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(Error::InvalidPath(format!("not an absolute path: {}", path)));
        }
        Self::root().join(path.trim_start_matches('/'))
    }

    /// Append a relative path
    pub fn join(&self, child: &str) -> Result<Self> {
        if child.starts_with('/') {
            return Err(Error::InvalidPath(format!(
                "can not join absolute path {} to {}",
                child, self
            )));
        }

        let mut joined = self.0.clone();
        for segment in child.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidPath(format!(
                        "parent references are not allowed: {}",
                        child
                    )))
                }
                segment => {
                    if !joined.ends_with('/') {
                        joined.push('/');
                    }
                    joined.push_str(segment);
                }
            }
        }
        Ok(FsPath(joined))
    }

    /// The parent directory, `None` for the root
    pub fn parent(&self) -> Option<FsPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(FsPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Last segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Whether this is the filesystem root
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path relative to `base`, `None` when `self` is not below `base`
    pub fn strip_prefix(&self, base: &FsPath) -> Option<&str> {
        if base.is_root() {
            return Some(self.0.trim_start_matches('/'));
        }
        let rest = self.0.strip_prefix(base.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }

    /// The path as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One live connection to a remote filesystem
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Create `path` and any missing parents
    fn mkdirs(&self, path: &FsPath) -> io::Result<()>;

    /// Upload a local file to `dest`, returning the number of bytes written
    ///
    /// A destination must never be visible in a partially written state.
    fn copy_from_local(&self, local: &Path, dest: &FsPath) -> io::Result<u64>;

    /// Request `replication` copies of `path`
    ///
    /// Returns `false` when the filesystem does not manage replication.
    fn set_replication(&self, path: &FsPath, replication: u16) -> io::Result<bool>;

    /// Replication of `path` if known
    fn replication(&self, path: &FsPath) -> io::Result<Option<u16>>;

    /// Atomically make `alias` refer to the content of `staging`
    ///
    /// Fails with [`io::ErrorKind::Unsupported`] when the filesystem can not
    /// do this atomically.
    fn promote(&self, staging: &FsPath, alias: &FsPath) -> io::Result<()>;

    /// Release the connection
    fn close(&self) -> io::Result<()>;
}

/// Opens connections for a set of URI schemes
pub trait Connector: Send + Sync {
    /// Schemes this connector handles
    fn schemes(&self) -> &[&str];

    /// Open a connection to the filesystem at `uri`
    fn connect(&self, uri: &Url, conf: &ClusterConfig) -> io::Result<Arc<dyn FileSystem>>;
}

/// Registry of connectors keyed by URI scheme
///
/// Connectors registered later take precedence over earlier ones.
#[derive(Default)]
pub struct Connectors {
    connectors: Vec<Box<dyn Connector>>,
}

impl Connectors {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `file` connector
    pub fn with_defaults() -> Self {
        let mut connectors = Self::new();
        connectors.register(LocalConnector);
        connectors
    }

    /// Add a connector
    pub fn register<C: Connector + 'static>(&mut self, connector: C) -> &mut Self {
        self.connectors.push(Box::new(connector));
        self
    }

    /// Whether a connector handles `scheme`
    pub fn supports(&self, scheme: &str) -> bool {
        self.find(scheme).is_some()
    }

    /// Open a connection to `uri`
    pub fn connect(&self, uri: &Url, conf: &ClusterConfig) -> Result<Arc<dyn FileSystem>> {
        let connector = self
            .find(uri.scheme())
            .ok_or_else(|| Error::UnsupportedScheme(uri.scheme().to_string()))?;

        connector.connect(uri, conf).map_err(|source| Error::Connection {
            target: uri.to_string(),
            source,
        })
    }

    fn find(&self, scheme: &str) -> Option<&dyn Connector> {
        self.connectors
            .iter()
            .rev()
            .find(|c| c.schemes().iter().any(|s| s.eq_ignore_ascii_case(scheme)))
            .map(|c| c.as_ref())
    }
}

impl fmt::Debug for Connectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schemes: Vec<&str> = self
            .connectors
            .iter()
            .flat_map(|c| c.schemes().iter().copied())
            .collect();
        f.debug_struct("Connectors").field("schemes", &schemes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_path_normalizes() {
        assert_eq!(FsPath::new("/data//cache/./jobs/").unwrap().as_str(), "/data/cache/jobs");
        assert_eq!(FsPath::new("/").unwrap(), FsPath::root());
        assert!(FsPath::new("data/cache").is_err());
        assert!(FsPath::new("/data/../etc").is_err());
    }

    #[test]
    fn test_fs_path_join() {
        let root = FsPath::new("/data/cache").unwrap();
        assert_eq!(
            root.join("jobCache_20240101000000/ingest").unwrap().as_str(),
            "/data/cache/jobCache_20240101000000/ingest"
        );
        assert_eq!(FsPath::root().join("a").unwrap().as_str(), "/a");
        assert!(root.join("/etc").is_err());
        assert!(root.join("../etc").is_err());
    }

    #[test]
    fn test_fs_path_parent_and_name() {
        let path = FsPath::new("/data/cache/app.jar").unwrap();
        assert_eq!(path.name(), Some("app.jar"));
        assert_eq!(path.parent().unwrap().as_str(), "/data/cache");
        assert_eq!(FsPath::new("/data").unwrap().parent(), Some(FsPath::root()));
        assert_eq!(FsPath::root().parent(), None);
        assert_eq!(FsPath::root().name(), None);
    }

    #[test]
    fn test_fs_path_strip_prefix() {
        let base = FsPath::new("/data").unwrap();
        let path = FsPath::new("/data/cache/app.jar").unwrap();
        assert_eq!(path.strip_prefix(&base), Some("cache/app.jar"));
        assert_eq!(base.strip_prefix(&base), Some(""));
        assert_eq!(FsPath::new("/database").unwrap().strip_prefix(&base), None);
        assert_eq!(path.strip_prefix(&FsPath::root()), Some("data/cache/app.jar"));
    }

    #[test]
    fn test_unknown_scheme() {
        let connectors = Connectors::with_defaults();
        let uri = Url::parse("hdfs://namenode:8020/data").unwrap();
        assert!(connectors.supports("file"));
        assert!(matches!(
            connectors.connect(&uri, &ClusterConfig::default()),
            Err(Error::UnsupportedScheme(ref s)) if s == "hdfs"
        ));
    }
}
