//! Filesystem helpers shared by rule sync and the host implementations.

use std::io::Write;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::SyncError;

/// Writes `content` to a sibling temp file and renames it over `path`, so a
/// reader never observes a half-written file.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

/// Removes `path` recursively. A missing directory is not an error.
pub fn remove_dir(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::RemoveDirectory {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn ensure_directory(path: &Path) -> Result<(), SyncError> {
    std::fs::create_dir_all(path).map_err(|e| SyncError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Recursively copies `source` into `dest`, creating `dest` if needed.
/// Existing files in `dest` with the same name are overwritten.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<Vec<PathBuf>, SyncError> {
    ensure_directory(dest)?;

    let mut copied = Vec::new();
    for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            ensure_directory(&target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| SyncError::CopyFile {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                source: e,
            })?;
            copied.push(target);
        }
    }

    Ok(copied)
}

/// Lists regular files directly under `dir`, sorted by name.
pub fn list_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
