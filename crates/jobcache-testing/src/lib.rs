//! Testing utilities and fixtures for the job cache loader
//!
//! This crate provides scratch directories, classpath fixtures, an in-memory
//! [`FileSystem`](jobcache_core::FileSystem) with fault injection and the
//! assertions shared by the workspace's tests.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub mod assertions;
pub mod fixtures;
pub mod memory;

pub use memory::{MemoryConnector, MemoryFs, MEMORY_SCHEME};

/// Creates a temporary test directory with cleanup on drop
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates a new temporary test directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Returns the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Creates a file with the given name and content in the test directory
    pub fn create_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Creates a directory with the given name in the test directory
    pub fn create_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// `file://` URI of a directory below the test directory
    pub fn file_uri(&self, name: &str) -> String {
        format!("file://{}", self.dir.path().join(name).display())
    }
}
