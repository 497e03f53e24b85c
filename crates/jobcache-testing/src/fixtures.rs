//! Common test fixtures for job cache tests

use crate::TestDir;
use anyhow::Result;
use jobcache_core::config::CLUSTER_CONFIG_FILE;
use std::path::PathBuf;

/// Jar and configuration file used by the two-cluster scenarios
pub fn create_scenario_files(test_dir: &TestDir) -> Result<Vec<PathBuf>> {
    Ok(vec![
        test_dir.create_file("app.jar", b"PK\x03\x04 application jar")?,
        test_dir.create_file("config.xml", b"<configuration/>")?,
    ])
}

/// Creates a typical job classpath layout
///
/// ```text
/// lib/app.jar
/// lib/util.jar
/// lib/ext/extra.jar
/// conf/config.xml
/// conf/core-site.xml
/// README.txt
/// ```
pub fn create_classpath_layout(test_dir: &TestDir) -> Result<()> {
    test_dir.create_file("lib/app.jar", b"PK\x03\x04 app")?;
    test_dir.create_file("lib/util.jar", b"PK\x03\x04 util")?;
    test_dir.create_file("lib/ext/extra.jar", b"PK\x03\x04 extra")?;
    test_dir.create_file("conf/config.xml", b"<configuration/>")?;
    test_dir.create_file(
        "conf/core-site.xml",
        b"<configuration><property/></configuration>",
    )?;
    test_dir.create_file("README.txt", b"not on the classpath")?;
    Ok(())
}

/// Writes a cluster configuration directory named `name`
pub fn create_cluster_conf(
    test_dir: &TestDir,
    name: &str,
    default_fs: Option<&str>,
) -> Result<PathBuf> {
    let dir = test_dir.create_dir(&format!("conf.d/{}", name))?;
    let mut contents = String::new();
    if let Some(default_fs) = default_fs {
        contents.push_str(&format!("default_fs = \"{}\"\n", default_fs));
    }
    contents.push_str("\n[properties]\n");
    contents.push_str(&format!("\"cluster.id\" = \"{}\"\n", name));
    std::fs::write(dir.join(CLUSTER_CONFIG_FILE), contents)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobcache_core::ClusterConfig;

    #[test]
    fn test_cluster_conf_is_readable() {
        let test_dir = TestDir::new().unwrap();
        let dir = create_cluster_conf(&test_dir, "clusterA", Some("mem://clusterA/")).unwrap();

        let conf = ClusterConfig::from_dir(&dir).unwrap();
        assert_eq!(conf.name, "clusterA");
        assert_eq!(conf.default_fs.as_deref(), Some("mem://clusterA/"));
        assert_eq!(conf.properties.get("cluster.id").unwrap(), "clusterA");
    }
}
