use super::{collect_files, insert_canonical, required_dir, LoadJobCacheMode, Mode, ModeOptions};
use crate::{Error, Result};
use glob::Pattern;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Separator between classpath entries
pub const CLASSPATH_DELIM: char = ':';

/// Finds files to load from a classpath resolved against a base directory
///
/// Entry forms:
/// - `lib/app.jar` - the file itself
/// - `conf` - the files directly inside the directory
/// - `lib/*` - the files directly inside `lib`
/// - `lib/**` - every file below `lib`
/// - `lib/*.jar`, `conf/site-?.xml` - files matching the glob
///
/// Entries that name nothing are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClasspathMode;

impl LoadJobCacheMode for ClasspathMode {
    fn files_to_load(&self, options: &ModeOptions) -> Result<BTreeSet<PathBuf>> {
        let classpath = options
            .classpath
            .as_deref()
            .filter(|cp| !cp.trim().is_empty())
            .ok_or_else(|| Error::Configuration("Classpath can not be empty".to_string()))?;
        let base_dir = required_dir(
            "Classpath base directory",
            options.classpath_base_dir.as_deref(),
        )?;

        let mut files = BTreeSet::new();
        let mut entries = 0;
        for entry in classpath
            .split(CLASSPATH_DELIM)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
        {
            expand_entry(&base_dir, entry, &mut files)?;
            entries += 1;
        }

        debug!(
            "Resolved {} files from {} classpath entries under {:?}",
            files.len(),
            entries,
            base_dir
        );
        Ok(files)
    }

    fn mode(&self) -> Mode {
        Mode::Classpath
    }
}

/// Expand one classpath entry into `files`
fn expand_entry(base_dir: &Path, entry: &str, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    if let Some((dir, recursive)) = wildcard_dir(entry) {
        let dir = base_dir.join(dir);
        if dir.is_dir() {
            return collect_files(&dir, recursive, files);
        }
        debug!("Skipping classpath entry {}: {:?} is not a directory", entry, dir);
        return Ok(());
    }

    if entry.contains(['*', '?', '[']) {
        return expand_glob(base_dir, entry, files);
    }

    let path = base_dir.join(entry);
    if path.is_file() {
        insert_canonical(&path, files)
    } else if path.is_dir() {
        collect_files(&path, false, files)
    } else {
        debug!("Skipping missing classpath entry {}", entry);
        Ok(())
    }
}

/// Split `dir/*` and `dir/**` entries into the directory and recursion flag
fn wildcard_dir(entry: &str) -> Option<(&str, bool)> {
    match entry {
        "*" => Some(("", false)),
        "**" => Some(("", true)),
        _ => entry
            .strip_suffix("/**")
            .map(|dir| (dir, true))
            .or_else(|| entry.strip_suffix("/*").map(|dir| (dir, false))),
    }
}

fn expand_glob(base_dir: &Path, entry: &str, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    let pattern = if Path::new(entry).is_absolute() {
        entry.to_string()
    } else {
        let base = base_dir.to_str().ok_or_else(|| {
            Error::InvalidPath(format!("non UTF-8 base directory: {}", base_dir.display()))
        })?;
        format!("{}/{}", Pattern::escape(base), entry)
    };

    for matched in glob::glob(&pattern)? {
        let path = matched.map_err(|e| Error::Resolution(e.to_string()))?;
        if path.is_file() {
            insert_canonical(&path, files)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("lib/ext")).unwrap();
        fs::create_dir_all(root.join("conf")).unwrap();
        fs::write(root.join("lib/app.jar"), "app").unwrap();
        fs::write(root.join("lib/util.jar"), "util").unwrap();
        fs::write(root.join("lib/README"), "docs").unwrap();
        fs::write(root.join("lib/ext/plugin.jar"), "plugin").unwrap();
        fs::write(root.join("conf/config.xml"), "<conf/>").unwrap();
        temp_dir
    }

    fn names(files: &BTreeSet<PathBuf>) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn resolve(classpath: &str, base: &Path) -> Result<BTreeSet<PathBuf>> {
        ClasspathMode.files_to_load(&ModeOptions::classpath(classpath, base))
    }

    #[test]
    fn test_plain_file_and_directory_entries() {
        let temp_dir = layout();
        let files = resolve("lib/app.jar:conf", temp_dir.path()).unwrap();
        assert_eq!(names(&files), vec!["app.jar", "config.xml"]);
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_directory_entry_is_not_recursive() {
        let temp_dir = layout();
        let files = resolve("lib", temp_dir.path()).unwrap();
        assert_eq!(names(&files), vec!["README", "app.jar", "util.jar"]);
    }

    #[test]
    fn test_wildcards() {
        let temp_dir = layout();

        let star = resolve("lib/*", temp_dir.path()).unwrap();
        assert_eq!(star.len(), 3);

        let recursive = resolve("lib/**", temp_dir.path()).unwrap();
        assert_eq!(recursive.len(), 4);
        assert!(names(&recursive).contains(&"plugin.jar".to_string()));

        let jars = resolve("lib/*.jar", temp_dir.path()).unwrap();
        assert_eq!(names(&jars), vec!["app.jar", "util.jar"]);
    }

    #[test]
    fn test_duplicates_removed() {
        let temp_dir = layout();
        let files = resolve("lib/app.jar:./lib/app.jar:lib/*.jar:lib", temp_dir.path()).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_missing_entries_are_skipped() {
        let temp_dir = layout();
        let files = resolve("missing.jar:nope/*::", temp_dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let temp_dir = layout();
        let first = resolve("conf:lib/**", temp_dir.path()).unwrap();
        let second = resolve("conf:lib/**", temp_dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_required_options() {
        let temp_dir = layout();

        let err = ClasspathMode
            .files_to_load(&ModeOptions {
                classpath_base_dir: Some(temp_dir.path().to_path_buf()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("Classpath")));

        let err = ClasspathMode
            .files_to_load(&ModeOptions {
                classpath: Some("lib".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("base directory")));
    }

    #[test]
    fn test_missing_base_dir_is_resolution_error() {
        let err = resolve("lib", Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_wildcard_dir() {
        assert_eq!(wildcard_dir("lib/*"), Some(("lib", false)));
        assert_eq!(wildcard_dir("lib/**"), Some(("lib", true)));
        assert_eq!(wildcard_dir("*"), Some(("", false)));
        assert_eq!(wildcard_dir("lib/*.jar"), None);
    }
}
