use std::path::{Path, PathBuf};

use log::error;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Recursively lists files under `root` whose names end with one of `extensions`.
/// Extensions may be given with or without the leading dot. The result is sorted.
pub fn list_files<S: AsRef<str>>(root: &Path, extensions: &[S]) -> Result<Vec<PathBuf>> {
    let endings: Vec<String> = extensions
        .iter()
        .map(|e| {
            let e = e.as_ref();
            if e.starts_with('.') { e.to_string() } else { format!(".{}", e) }
        })
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if endings.iter().any(|ending| name.ends_with(ending.as_str())) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    Ok(files)
}

/// Moves paths recorded on one machine under another machine's checkout of `repo`.
///
/// Backslashes become forward slashes, and everything before the first
/// occurrence of `repo` is replaced with `new_prefix`. For example
/// `C:\work\Detector\data\a.jpg` with repo `Detector` and prefix `/home/me`
/// becomes `/home/me/Detector/data/a.jpg`.
pub fn rewrite_repo_root<S: AsRef<str>>(files: &[S], repo: &str, new_prefix: &str) -> Result<Vec<String>> {
    let repo = repo.trim_end_matches('/');
    if repo.is_empty() {
        return Err(Error::PathRewrite("Repository name is empty".to_string()));
    }
    let prefix = new_prefix.replace('\\', "/");

    files
        .iter()
        .map(|file| -> Result<String> {
            let file = file.as_ref().replace('\\', "/");
            let (_, suffix) = file
                .split_once(repo)
                .ok_or_else(|| Error::PathRewrite(format!("{:?} is not inside {:?}", file, repo)))?;
            let suffix = suffix.strip_prefix('/').unwrap_or(suffix);

            let mut rewritten = prefix.clone();
            if !rewritten.is_empty() && !rewritten.ends_with('/') {
                rewritten.push('/');
            }
            rewritten.push_str(repo);
            rewritten.push('/');
            rewritten.push_str(suffix);
            Ok(rewritten)
        })
        .collect()
}

/// Deletes `directory` and everything in it. Failures are logged and reported as `false`.
pub fn remove_directory(directory: &Path) -> bool {
    match std::fs::remove_dir_all(directory) {
        Ok(()) => true,
        Err(e) => {
            error!("Error deleting directory {:?}: {:?}", directory, e);
            false
        }
    }
}
