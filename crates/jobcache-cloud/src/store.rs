//! [`FileSystem`] backed by an object store

use crate::runtime::build_runtime;
use crate::writer::ObjectWriter;
use crate::{CloudConfig, CloudError, Result};
use bytes::Bytes;
use jobcache_core::{FileSystem, FsPath};
use object_store::{path::Path as ObjectPath, ObjectStore, PutPayload};
use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::runtime::{Handle, Runtime};
use tracing::debug;

/// One connection to a bucket or container
///
/// Object stores have no directories and no rename, so directories are
/// implicit key prefixes and promotion stores a small pointer object at the
/// alias key holding the promoted prefix. A single PUT is atomic, so readers
/// always see either the previous or the new pointer. Replication is managed
/// by the store itself and can not be requested per object.
pub struct ObjectStoreFs {
    uri: String,
    store: Arc<dyn ObjectStore>,
    config: CloudConfig,
    runtime: Mutex<Option<Runtime>>,
}

/// Object key of a filesystem path
fn key(path: &FsPath) -> ObjectPath {
    ObjectPath::from(path.as_str().trim_start_matches('/'))
}

impl ObjectStoreFs {
    /// Wrap `store`, starting the runtime that drives it
    pub fn new(uri: impl Into<String>, store: Arc<dyn ObjectStore>, config: CloudConfig) -> Result<Self> {
        let runtime = build_runtime(config.worker_threads)?;
        Ok(Self {
            uri: uri.into(),
            store,
            config,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    fn handle(&self) -> Result<Handle> {
        let runtime = self
            .runtime
            .lock()
            .map_err(|_| CloudError::Runtime("runtime lock poisoned".to_string()))?;
        runtime
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or_else(|| CloudError::Closed(self.uri.clone()))
    }

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        Ok(self.handle()?.block_on(future))
    }

    /// Objects and sub-prefixes directly below `path`
    fn has_children(&self, path: &FsPath) -> Result<bool> {
        let prefix = key(path);
        let listing = self.block_on(self.store.list_with_delimiter(Some(&prefix)))??;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }
}

impl FileSystem for ObjectStoreFs {
    fn mkdirs(&self, _path: &FsPath) -> io::Result<()> {
        self.handle()?;
        Ok(())
    }

    fn copy_from_local(&self, local: &Path, dest: &FsPath) -> io::Result<u64> {
        if dest.is_root() {
            return Err(CloudError::InvalidPath("can not copy onto the root".to_string()).into());
        }
        let mut file = std::fs::File::open(local)?;
        let mut writer = ObjectWriter::new(
            self.store.clone(),
            key(dest),
            self.handle()?,
            self.config.write_buffer_size,
        );
        std::io::copy(&mut file, &mut writer)?;
        let bytes = writer.finish()?;
        debug!("Uploaded {:?} to {}{} ({} bytes)", local, self.uri, dest, bytes);
        Ok(bytes)
    }

    fn set_replication(&self, _path: &FsPath, _replication: u16) -> io::Result<bool> {
        self.handle()?;
        Ok(false)
    }

    fn replication(&self, _path: &FsPath) -> io::Result<Option<u16>> {
        self.handle()?;
        Ok(None)
    }

    fn promote(&self, staging: &FsPath, alias: &FsPath) -> io::Result<()> {
        if !self.has_children(staging)? {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("staging prefix {} is empty", staging),
            ));
        }
        if self.has_children(alias)? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} holds objects and is not a pointer", alias),
            ));
        }

        let pointer = PutPayload::from(Bytes::from(format!("{}\n", staging)));
        self.block_on(self.store.put(&key(alias), pointer))?
            .map_err(CloudError::from)?;
        debug!("Pointed {}{} at {}", self.uri, alias, staging);
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        let runtime = self
            .runtime
            .lock()
            .map_err(|_| CloudError::Runtime("runtime lock poisoned".to_string()))?
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            debug!("Closed object store connection to {}", self.uri);
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectStoreFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreFs")
            .field("uri", &self.uri)
            .field("store", &self.store.to_string())
            .field("config", &self.config)
            .finish()
    }
}
