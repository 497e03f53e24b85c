//! Connector for object store URIs

use crate::{CloudConfig, CloudError, ObjectStoreFs};
use jobcache_core::{ClusterConfig, Connector, FileSystem};
use std::io;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Schemes understood by `object_store::parse_url_opts`
pub const OBJECT_STORE_SCHEMES: &[&str] = &[
    "memory", "s3", "s3a", "gs", "az", "adl", "azure", "abfs", "abfss", "http", "https",
];

/// Opens [`ObjectStoreFs`] connections
///
/// Cluster properties are handed to the store builder, so credentials,
/// regions and endpoints live in each cluster's `cluster.toml`.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreConnector {
    config: CloudConfig,
}

impl ObjectStoreConnector {
    pub fn new(config: CloudConfig) -> Self {
        Self { config }
    }
}

impl Connector for ObjectStoreConnector {
    fn schemes(&self) -> &[&str] {
        OBJECT_STORE_SCHEMES
    }

    fn connect(&self, uri: &Url, conf: &ClusterConfig) -> io::Result<Arc<dyn FileSystem>> {
        let (config, options) = self.config.with_overrides(&conf.properties)?;
        let (store, _) = object_store::parse_url_opts(uri, options).map_err(CloudError::from)?;

        debug!("Opening {} for {} (cluster {})", store, uri, conf.name);
        let fs = ObjectStoreFs::new(uri.as_str(), Arc::from(store), config)?;
        Ok(Arc::new(fs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobcache_core::FsPath;

    #[test]
    fn test_memory_uri_connects() {
        let fs = ObjectStoreConnector::default()
            .connect(&Url::parse("memory:///cache").unwrap(), &ClusterConfig::default())
            .unwrap();
        let path = FsPath::new("/cache/app.jar").unwrap();
        fs.mkdirs(&FsPath::new("/cache").unwrap()).unwrap();
        assert!(!fs.set_replication(&path, 3).unwrap());
        fs.close().unwrap();
        assert_eq!(
            fs.replication(&path).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let err = ObjectStoreConnector::default()
            .connect(&Url::parse("ftp://host/cache").unwrap(), &ClusterConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }
}
