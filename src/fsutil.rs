//! Local directory helpers used by artifact transfer.

use std::io;
use std::path::{Path, PathBuf};

/// True when `path` does not exist or is a directory with no entries.
pub async fn directory_missing_or_empty(path: &Path) -> io::Result<bool> {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_none()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// True when at least one regular file sits somewhere below `path`. A
/// missing path or a tree of empty directories has no files.
pub async fn contains_files(path: &Path) -> io::Result<bool> {
    match list_files(path).await {
        Ok(files) => Ok(!files.is_empty()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// All regular files below `root`, sorted.
pub async fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// `/`-separated form of `path` relative to `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect();
    Some(parts?.join("/"))
}

/// Copy every file below `src` into `dst`, creating directories as needed.
/// Existing files in `dst` with the same relative path are overwritten.
pub async fn copy_directory(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut copied = 0;
    for file in list_files(src).await? {
        let relative = file
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dst.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&file, &target).await?;
        copied += 1;
    }
    Ok(copied)
}
