//! Configuration module
//!
//! Two kinds of configuration live here: the loader's own defaults
//! ([`Config`], read from the user's config directory) and the per-cluster
//! settings ([`ClusterConfig`]) read from each cluster configuration
//! directory and used to open connections.

use crate::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// File read from every cluster configuration directory
pub const CLUSTER_CONFIG_FILE: &str = "cluster.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Load defaults
    #[serde(default)]
    pub load: LoadConfig,
    /// Cluster configuration discovery
    #[serde(default)]
    pub clusters: ClustersConfig,
}

/// Defaults for a load run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Replicas requested for every cached file
    pub replication: u16,
    /// Worker threads copying files
    pub threads: usize,
    /// Promote the staging directory after a successful load
    pub finalize: bool,
    /// Alias promoted when no sub directory is given
    pub cache_alias: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            replication: 3,
            threads: 30,
            finalize: true,
            cache_alias: "current".to_string(),
        }
    }
}

/// Where cluster configuration directories are found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClustersConfig {
    /// Cluster configuration directories
    pub conf_dirs: Vec<PathBuf>,
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            Error::Configuration("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join("jobcache").join("config.toml"))
    }

    /// Get default configuration content with examples
    pub fn default_config_content() -> String {
        r#"# Job cache loader configuration

[load]
# Replicas requested for every cached file
replication = 3
# Worker threads copying files
threads = 30
# Promote the staging directory once every file is uploaded
finalize = true
# Alias pointing at the newest cache when no --sub-dir is given
cache_alias = "current"

[clusters]
# Directories holding a cluster.toml each
# conf_dirs = ["/etc/jobcache/clusterA", "/etc/jobcache/clusterB"]
conf_dirs = []
"#
        .to_string()
    }

    /// Load configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Load configuration from the default location, defaults when missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            debug!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Write the commented default configuration to `path` unless it exists
    ///
    /// Returns whether a file was written.
    pub fn init_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::default_config_content())?;
        Ok(true)
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable configuration: {}", e);
                Self::default()
            }
        }
    }
}

/// Settings of one target cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name, the configuration directory name by default
    #[serde(default)]
    pub name: String,
    /// Default filesystem URI, used to qualify bare destination paths
    #[serde(default)]
    pub default_fs: Option<String>,
    /// Connector properties (credentials, endpoints, regions)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ClusterConfig {
    /// Read `cluster.toml` from a configuration directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CLUSTER_CONFIG_FILE);
        let contents = fs::read_to_string(&path)?;
        let mut conf: ClusterConfig = toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse {:?}: {}", path, e)))?;

        if conf.name.is_empty() {
            conf.name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.display().to_string());
        }
        if let Some(default_fs) = &conf.default_fs {
            Url::parse(default_fs).map_err(|e| {
                Error::Configuration(format!(
                    "Invalid default_fs {} in {:?}: {}",
                    default_fs, path, e
                ))
            })?;
        }
        Ok(conf)
    }

    /// Parsed default filesystem URI
    pub fn default_fs_url(&self) -> Option<Url> {
        self.default_fs.as_deref().and_then(|fs| Url::parse(fs).ok())
    }

    /// Whether this cluster's default filesystem serves `uri`
    pub fn serves(&self, uri: &Url) -> bool {
        self.default_fs_url().is_some_and(|fs| {
            fs.scheme().eq_ignore_ascii_case(uri.scheme())
                && fs.host_str() == uri.host_str()
                && fs.port_or_known_default() == uri.port_or_known_default()
        })
    }
}

/// Read the cluster configuration of every directory
///
/// Directories that do not exist are skipped with a warning.
pub fn load_cluster_configs<P: AsRef<Path>>(dirs: &[P]) -> Result<Vec<ClusterConfig>> {
    let mut confs = Vec::new();
    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.join(CLUSTER_CONFIG_FILE).is_file() {
            warn!("Skipping cluster configuration directory {:?}: no {}", dir, CLUSTER_CONFIG_FILE);
            continue;
        }
        let conf = ClusterConfig::from_dir(dir)?;
        debug!("Loaded cluster configuration {} from {:?}", conf.name, dir);
        confs.push(conf);
    }
    Ok(confs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.load.replication, 3);
        assert_eq!(config.load.threads, 30);
        assert!(config.load.finalize);
        assert_eq!(config.load.cache_alias, "current");
        assert!(config.clusters.conf_dirs.is_empty());
    }

    #[test]
    fn test_default_content_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::default_config_content()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str("[load]\nthreads = 4\n").unwrap();
        assert_eq!(config.load.threads, 4);
        assert_eq!(config.load.replication, 3);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[load]\nfinalize = false\n\n[clusters]\nconf_dirs = [\"/etc/clusterA\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.load.finalize);
        assert_eq!(config.clusters.conf_dirs, vec![PathBuf::from("/etc/clusterA")]);
        assert!(matches!(
            Config::load_from(&temp_dir.path().join("missing.toml")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_init_at_keeps_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobcache/config.toml");

        assert!(Config::init_at(&path).unwrap());
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        fs::write(&path, "[load]\nthreads = 2\n").unwrap();
        assert!(!Config::init_at(&path).unwrap());
        assert_eq!(Config::load_from(&path).unwrap().load.threads, 2);
    }

    #[test]
    fn test_cluster_config_from_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("clusterA");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(CLUSTER_CONFIG_FILE),
            "default_fs = \"file:///\"\n[properties]\nregion = \"us-east-1\"\n",
        )
        .unwrap();

        let conf = ClusterConfig::from_dir(&dir).unwrap();
        assert_eq!(conf.name, "clusterA");
        assert_eq!(conf.properties.get("region").unwrap(), "us-east-1");
        assert!(conf.serves(&Url::parse("file:///data/cache").unwrap()));
        assert!(!conf.serves(&Url::parse("memory:///data/cache").unwrap()));
    }

    #[test]
    fn test_invalid_cluster_config() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CLUSTER_CONFIG_FILE), "default_fs = \"not a uri\"").unwrap();
        assert!(matches!(
            ClusterConfig::from_dir(temp_dir.path()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_dirs_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let confs = load_cluster_configs(&[temp_dir.path().join("missing")]).unwrap();
        assert!(confs.is_empty());
    }
}
