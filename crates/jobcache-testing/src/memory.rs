//! In-memory filesystem for exercising the loader without a cluster
//!
//! [`MemoryConnector`] serves the `mem` scheme and keeps one [`MemoryFs`] per
//! URI host, so `mem://clusterA/cache` and `mem://clusterB/cache` behave like
//! two independent clusters. Tests grab a handle with
//! [`MemoryConnector::cluster`] before a run to inject faults and after it to
//! inspect what was written.

use jobcache_core::{ClusterConfig, Connector, FileSystem, FsPath};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// URI scheme served by [`MemoryConnector`]
pub const MEMORY_SCHEME: &str = "mem";

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<FsPath, Vec<u8>>,
    dirs: BTreeSet<FsPath>,
    replication: HashMap<FsPath, u16>,
    links: BTreeMap<FsPath, FsPath>,
    closed: bool,
    failing_names: HashSet<String>,
    fail_promotions: bool,
}

/// In-memory [`FileSystem`] recording everything written to it
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<State>,
    copies: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected failure: {}", what))
}

fn path(path: &str) -> FsPath {
    FsPath::new(path).unwrap_or_else(|_| FsPath::root())
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> io::Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory filesystem poisoned"))
    }

    fn open_state(&self) -> io::Result<MutexGuard<'_, State>> {
        let state = self.state()?;
        if state.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "filesystem is closed",
            ));
        }
        Ok(state)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every copy whose destination file is named `name` fail
    pub fn fail_copies_named(&self, name: &str) {
        self.lock().failing_names.insert(name.to_string());
    }

    /// Make every promotion fail
    pub fn fail_promotions(&self) {
        self.lock().fail_promotions = true;
    }

    /// Contents of the file at `path`
    pub fn file(&self, path_str: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&path(path_str)).cloned()
    }

    /// Every file path, sorted
    pub fn files(&self) -> Vec<String> {
        self.lock().files.keys().map(|p| p.to_string()).collect()
    }

    /// Replication recorded for `path`
    pub fn replication_of(&self, path_str: &str) -> Option<u16> {
        self.lock().replication.get(&path(path_str)).copied()
    }

    /// Staging directory an alias refers to
    pub fn link(&self, alias: &str) -> Option<String> {
        self.lock().links.get(&path(alias)).map(|p| p.to_string())
    }

    /// Successful uploads
    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    /// Connections handed out by the connector
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Calls to [`FileSystem::close`]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn reopen(&self) {
        self.lock().closed = false;
        self.opens.fetch_add(1, Ordering::SeqCst);
    }
}

impl FileSystem for MemoryFs {
    fn mkdirs(&self, dir: &FsPath) -> io::Result<()> {
        let mut state = self.open_state()?;
        let mut current = Some(dir.clone());
        while let Some(dir) = current {
            if state.files.contains_key(&dir) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is a file", dir),
                ));
            }
            current = dir.parent();
            state.dirs.insert(dir);
        }
        Ok(())
    }

    fn copy_from_local(&self, local: &Path, dest: &FsPath) -> io::Result<u64> {
        let name = dest.name().unwrap_or_default().to_string();
        {
            let state = self.open_state()?;
            if state.failing_names.contains(&name) {
                return Err(injected(&format!("copy of {}", dest)));
            }
            let parent = dest.parent().unwrap_or_else(FsPath::root);
            if !parent.is_root() && !state.dirs.contains(&parent) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("parent directory {} does not exist", parent),
                ));
            }
        }

        let bytes = std::fs::read(local)?;
        let len = bytes.len() as u64;
        self.open_state()?.files.insert(dest.clone(), bytes);
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(len)
    }

    fn set_replication(&self, path: &FsPath, replication: u16) -> io::Result<bool> {
        let mut state = self.open_state()?;
        if !state.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path),
            ));
        }
        state.replication.insert(path.clone(), replication);
        Ok(true)
    }

    fn replication(&self, path: &FsPath) -> io::Result<Option<u16>> {
        Ok(self.open_state()?.replication.get(path).copied())
    }

    fn promote(&self, staging: &FsPath, alias: &FsPath) -> io::Result<()> {
        let mut state = self.open_state()?;
        if state.fail_promotions {
            return Err(injected(&format!("promotion of {}", alias)));
        }
        if !state.dirs.contains(staging) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("staging directory {} does not exist", staging),
            ));
        }
        if state.dirs.contains(alias) || state.files.contains_key(alias) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a link", alias),
            ));
        }
        state.links.insert(alias.clone(), staging.clone());
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.state()?.closed = true;
        Ok(())
    }
}

/// Connector serving `mem://<cluster>/...` from shared [`MemoryFs`] handles
///
/// Clones share the same clusters.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    clusters: Arc<Mutex<HashMap<String, Arc<MemoryFs>>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The filesystem behind `mem://<name>/`, created on first use
    pub fn cluster(&self, name: &str) -> Arc<MemoryFs> {
        let mut clusters = self.clusters.lock().unwrap_or_else(|e| e.into_inner());
        clusters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryFs::new()))
            .clone()
    }

    /// Make connecting to `mem://<name>/` fail
    pub fn make_unreachable(&self, name: &str) {
        self.unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());
    }
}

impl Connector for MemoryConnector {
    fn schemes(&self) -> &[&str] {
        &[MEMORY_SCHEME]
    }

    fn connect(&self, uri: &Url, _conf: &ClusterConfig) -> io::Result<Arc<dyn FileSystem>> {
        let name = uri.host_str().unwrap_or_default();
        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name);
        if unreachable {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("cluster {} is unreachable", name),
            ));
        }

        let fs = self.cluster(name);
        fs.reopen();
        Ok(fs as Arc<dyn FileSystem>)
    }
}
