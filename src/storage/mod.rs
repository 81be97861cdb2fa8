//! On-disk side of batches: archives and download-directory stats

pub mod packaging;
pub mod stats;

pub use packaging::BatchPackager;
pub use stats::{collect_stats, DownloadStats, RecentFile};

use std::io;
use std::path::{Path, PathBuf};

/// Suffixes of files a downloader is still writing
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

/// All finished regular files under `dir`, recursively. A missing `dir` yields none.
pub(crate) fn walk_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs_err::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && !is_partial(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_partial(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_walk_files_recurses_and_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::create_dir_all(dir.path().join("album")).unwrap();
        fs_err::write(dir.path().join("a.mp3"), b"a").unwrap();
        fs_err::write(dir.path().join("album/b.mp3"), b"b").unwrap();
        fs_err::write(dir.path().join("c.webm.part"), b"c").unwrap();

        let files = walk_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.mp3"), dir.path().join("album/b.mp3")]);
    }

    #[test]
    fn test_walk_files_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(walk_files(&dir.path().join("nope")).unwrap().is_empty());
    }
}
