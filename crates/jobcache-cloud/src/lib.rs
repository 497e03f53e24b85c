//! # jobcache-cloud
//!
//! Object store backends for the job cache loader. This crate implements
//! [`jobcache_core::FileSystem`] on top of `object_store`, so a job cache can
//! be staged into S3, GCS, Azure Blob Storage, plain HTTP stores or an
//! in-memory store exactly like into a Hadoop-compatible filesystem.
//!
//! ## Architecture
//!
//! - [`ObjectStoreConnector`]: opens a connection for the object store
//!   schemes, configured from the cluster's properties
//! - [`ObjectStoreFs`]: one connection; owns the Tokio runtime bridging the
//!   async `object_store` API to the synchronous filesystem interface
//! - [`ObjectWriter`]: synchronous `std::io::Write` for a single upload

#![warn(missing_debug_implementations)]

mod buffer;
mod connector;
mod error;
mod runtime;
mod store;
mod writer;

pub use connector::{ObjectStoreConnector, OBJECT_STORE_SCHEMES};
pub use error::{CloudError, Result};
pub use store::ObjectStoreFs;
pub use writer::ObjectWriter;

// Re-export commonly used types from object_store
pub use object_store::{path::Path as ObjectPath, ObjectStore};

/// Configuration for object store connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// Bytes buffered before a multipart upload part is sent (default: 8MB)
    pub write_buffer_size: usize,
    /// Worker threads of each connection's runtime (default: 2)
    pub worker_threads: usize,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: 8 * 1024 * 1024,
            worker_threads: 2,
        }
    }
}

impl CloudConfig {
    /// Property overriding [`CloudConfig::write_buffer_size`]
    pub const WRITE_BUFFER_SIZE: &'static str = "jobcache.write_buffer_size";
    /// Property overriding [`CloudConfig::worker_threads`]
    pub const WORKER_THREADS: &'static str = "jobcache.worker_threads";

    /// Apply the `jobcache.*` overrides found in cluster properties
    ///
    /// Returns the remaining properties, which are passed to the store.
    pub fn with_overrides<'a, I>(&self, properties: I) -> Result<(Self, Vec<(&'a str, &'a str)>)>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut config = self.clone();
        let mut rest = Vec::new();
        for (key, value) in properties {
            let parse = |value: &str| {
                value.parse::<usize>().map_err(|e| {
                    CloudError::Config(format!("invalid value {} for {}: {}", value, key, e))
                })
            };
            match key.as_str() {
                Self::WRITE_BUFFER_SIZE => config.write_buffer_size = parse(value)?,
                Self::WORKER_THREADS => config.worker_threads = parse(value)?,
                _ => rest.push((key.as_str(), value.as_str())),
            }
        }
        Ok((config, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_overrides_are_split_from_store_options() {
        let mut properties = BTreeMap::new();
        properties.insert("jobcache.worker_threads".to_string(), "4".to_string());
        properties.insert("aws_region".to_string(), "us-east-1".to_string());

        let (config, rest) = CloudConfig::default().with_overrides(&properties).unwrap();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.write_buffer_size, 8 * 1024 * 1024);
        assert_eq!(rest, vec![("aws_region", "us-east-1")]);
    }

    #[test]
    fn test_invalid_override() {
        let mut properties = BTreeMap::new();
        properties.insert("jobcache.write_buffer_size".to_string(), "big".to_string());
        assert!(CloudConfig::default().with_overrides(&properties).is_err());
    }
}
