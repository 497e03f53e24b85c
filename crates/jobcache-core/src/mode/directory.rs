use super::{collect_files, required_dir, LoadJobCacheMode, Mode, ModeOptions};
use crate::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Loads every regular file in a directory, optionally descending into it
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryMode;

impl LoadJobCacheMode for DirectoryMode {
    fn files_to_load(&self, options: &ModeOptions) -> Result<BTreeSet<PathBuf>> {
        let dir = required_dir("Directory", options.directory.as_deref())?;
        let mut files = BTreeSet::new();
        collect_files(&dir, options.recursive, &mut files)?;
        Ok(files)
    }

    fn mode(&self) -> Mode {
        Mode::Directory
    }
}
