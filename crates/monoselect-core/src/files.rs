//! Enumerate the repository files matching a pattern set.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, SelectError};
use crate::matcher::PatternSet;

/// All files under `root` matching `patterns`, as sorted `/`-separated
/// relative paths.
///
/// The `.git` directory is never entered and symlinks are not followed into
/// directories; a symlink to a file is listed like a file.
pub fn match_files(root: &Path, patterns: &PatternSet) -> Result<BTreeSet<String>> {
    let mut found = BTreeSet::new();
    if patterns.is_empty() {
        return Ok(found);
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => SelectError::Io(io),
            None => SelectError::Io(std::io::Error::other("filesystem loop while walking")),
        })?;

        let file_type = entry.file_type();
        let is_file = file_type.is_file() || (file_type.is_symlink() && !entry.path().is_dir());
        if !is_file {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if patterns.is_match(&relative) {
            found.insert(relative);
        }
    }

    debug!(root = %root.display(), matched = found.len(), "enumerated matching files");
    Ok(found)
}
