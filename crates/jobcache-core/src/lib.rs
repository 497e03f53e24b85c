//! jobcache - stage a job cache into Hadoop-compatible filesystems
//!
//! This library resolves the local files a distributed job needs (classpath
//! jars and configuration files), copies them into a timestamped staging
//! directory on every target cluster in parallel, and optionally promotes
//! that directory to the stable cache location.

pub mod config;
pub mod error;
pub mod fs;
pub mod launcher;
pub mod load;
pub mod mode;
pub mod path;
pub mod progress;
pub mod utils;

pub use error::{CompositeLoadError, Error, PromotionError, Result, TransferError};

// Re-export commonly used types
pub use config::ClusterConfig;
pub use fs::{Connector, Connectors, FileSystem, FsPath};
pub use launcher::Launcher;
pub use load::{load, CacheLoadRequest, LoadReport};
pub use mode::{create_mode, LoadJobCacheMode, Mode, ModeOptions};
pub use path::FileSystemPath;
