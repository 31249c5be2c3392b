//! Filesystem helpers for the runner.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Empties `dir`, creating it when absent. Returns the directory path.
///
/// Files and subdirectories inside `dir` are removed; `dir` itself is kept.
pub fn clean_dir(dir: &Path) -> io::Result<PathBuf> {
    if dir.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "output directory path is empty",
        ));
    }

    std::fs::create_dir_all(dir)?;
    let mut removed = 0usize;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        removed += 1;
    }
    debug!(dir = %dir.display(), removed, "Cleaned output directory");
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_dir_removes_contents_keeps_dir() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("output");
        std::fs::create_dir_all(out.join("nested")).unwrap();
        std::fs::write(out.join("report.json"), "{}").unwrap();
        std::fs::write(out.join("nested").join("attachment.txt"), "x").unwrap();

        let cleaned = clean_dir(&out).unwrap();
        assert_eq!(cleaned, out);
        assert!(out.is_dir());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_dir_creates_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("test_output").join("output");
        clean_dir(&out).unwrap();
        assert!(out.is_dir());
    }

    #[test]
    fn test_clean_dir_rejects_empty_path() {
        let err = clean_dir(Path::new("")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
