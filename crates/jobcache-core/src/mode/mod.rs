//! Load modes decide which local files make up a job cache
//!
//! Each mode is a stateless strategy that turns [`ModeOptions`] into a set of
//! absolute, canonical local file paths. Modes are selected by name through
//! [`create_mode`]; the orchestrator never needs to know which one ran.

mod classpath;
mod directory;

pub use classpath::{ClasspathMode, CLASSPATH_DELIM};
pub use directory::DirectoryMode;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Identifier of a load mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Files named by a classpath string
    Classpath,
    /// Every file in a directory
    Directory,
}

impl Mode {
    /// All known modes
    pub const ALL: [Mode; 2] = [Mode::Classpath, Mode::Directory];

    /// Build the strategy implementing this mode
    pub fn strategy(self) -> Box<dyn LoadJobCacheMode> {
        match self {
            Mode::Classpath => Box::new(ClasspathMode),
            Mode::Directory => Box::new(DirectoryMode),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classpath" | "cp" => Ok(Mode::Classpath),
            "directory" | "dir" => Ok(Mode::Directory),
            other => Err(Error::Configuration(format!(
                "Unknown load mode: {} (expected one of: classpath, directory)",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Classpath => write!(f, "classpath"),
            Mode::Directory => write!(f, "directory"),
        }
    }
}

/// Options consumed by the load modes
///
/// Fields are mode-specific; each mode validates the ones it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeOptions {
    /// `:`-delimited classpath (classpath mode)
    pub classpath: Option<String>,
    /// Directory relative classpath entries resolve against (classpath mode)
    pub classpath_base_dir: Option<PathBuf>,
    /// Directory whose files are loaded (directory mode)
    pub directory: Option<PathBuf>,
    /// Descend into subdirectories (directory mode)
    #[serde(default)]
    pub recursive: bool,
}

impl ModeOptions {
    /// Options for classpath mode
    pub fn classpath(classpath: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            classpath: Some(classpath.into()),
            classpath_base_dir: Some(base_dir.into()),
            ..Default::default()
        }
    }

    /// Options for directory mode
    pub fn directory(directory: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            directory: Some(directory.into()),
            recursive,
            ..Default::default()
        }
    }
}

/// Strategy resolving [`ModeOptions`] into the files to load
pub trait LoadJobCacheMode: Send + Sync + fmt::Debug {
    /// Resolve the absolute local files to upload
    ///
    /// Fails with [`Error::Configuration`] when a required option is missing
    /// and with [`Error::Resolution`] when files can not be enumerated. An
    /// empty set means there is nothing to load.
    fn files_to_load(&self, options: &ModeOptions) -> Result<BTreeSet<PathBuf>>;

    /// Identifier of this mode
    fn mode(&self) -> Mode;
}

/// Create the strategy registered under `name`
pub fn create_mode(name: &str) -> Result<Box<dyn LoadJobCacheMode>> {
    let mode: Mode = name.parse()?;
    Ok(mode.strategy())
}

/// Canonicalize a required directory option
pub(crate) fn required_dir(field: &str, value: Option<&Path>) -> Result<PathBuf> {
    let dir = value
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| Error::Configuration(format!("{} can not be empty", field)))?;

    let canonical = dir.canonicalize().map_err(|e| {
        Error::Resolution(format!("{} {}: {}", field, dir.display(), e))
    })?;
    if !canonical.is_dir() {
        return Err(Error::Resolution(format!(
            "{} is not a directory: {}",
            field,
            dir.display()
        )));
    }
    Ok(canonical)
}

/// Add the regular files in `dir` to `files`
pub(crate) fn collect_files(dir: &Path, recursive: bool, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    let mut walker = WalkDir::new(dir).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            insert_canonical(entry.path(), files)?;
        }
    }
    Ok(())
}

/// Add the canonical form of `path` to `files`
pub(crate) fn insert_canonical(path: &Path, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    let canonical = path
        .canonicalize()
        .map_err(|e| Error::Resolution(format!("{}: {}", path.display(), e)))?;
    if files.insert(canonical) {
        debug!("Selected {:?}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("classpath".parse::<Mode>().unwrap(), Mode::Classpath);
        assert_eq!("CLASSPATH".parse::<Mode>().unwrap(), Mode::Classpath);
        assert_eq!("dir".parse::<Mode>().unwrap(), Mode::Directory);
        assert!(matches!(
            "jars".parse::<Mode>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_factory_dispatches_by_name() {
        for mode in Mode::ALL {
            let strategy = create_mode(&mode.to_string()).unwrap();
            assert_eq!(strategy.mode(), mode);
        }
        assert!(create_mode("hdfs").is_err());
    }

    #[test]
    fn test_missing_required_dir() {
        assert!(matches!(
            required_dir("directory", None),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            required_dir("directory", Some(Path::new("/definitely/not/here"))),
            Err(Error::Resolution(_))
        ));
    }
}
