//! Tokio runtime management for synchronous operations

use crate::{CloudError, Result};
use tokio::runtime::Runtime;

/// Build the runtime owned by one object store connection
///
/// Each connection gets its own runtime so closing the connection can shut
/// down every task it started.
pub(crate) fn build_runtime(worker_threads: usize) -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .thread_name("jobcache-cloud-worker")
        .build()
        .map_err(|e| CloudError::Runtime(format!("Failed to create Tokio runtime: {}", e)))
}
