//! Common assertions for job cache tests

use crate::MemoryFs;
use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Asserts that `path` on `fs` holds the bytes of `local` with `replication`
pub fn assert_cached(fs: &MemoryFs, path: &str, local: &Path, replication: u16) -> Result<()> {
    let expected = std::fs::read(local)?;
    let actual = fs.file(path);
    assert_eq!(
        actual.as_deref(),
        Some(expected.as_slice()),
        "Content mismatch for {}",
        path
    );
    assert_eq!(
        fs.replication_of(path),
        Some(replication),
        "Replication mismatch for {}",
        path
    );
    Ok(())
}

/// Asserts that an alias on `fs` refers to `staging`
pub fn assert_promoted(fs: &MemoryFs, alias: &str, staging: &str) {
    assert_eq!(
        fs.link(alias).as_deref(),
        Some(staging),
        "{} does not refer to {}",
        alias,
        staging
    );
}

/// Asserts that a local directory holds exactly the files named `expected`
pub fn assert_dir_files(dir: &Path, expected: &[&str]) -> Result<()> {
    let mut names: Vec<String> = collect_files(dir)?
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut expected: Vec<String> = expected.iter().map(|n| n.to_string()).collect();
    expected.sort();
    assert_eq!(names, expected, "Unexpected files in {:?}", dir);
    Ok(())
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() {
            entries.push(entry.path().to_path_buf());
        }
    }
    entries.sort();
    Ok(entries)
}
