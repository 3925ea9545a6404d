//! Backup copies of documents that were upgraded on load.

use log::debug;
use std::path::{Path, PathBuf};

use super::DOCUMENT_EXT;
use crate::error::{TimelineError, TimelineResult};

/// Next free `<stem>_backupN.kdenlive` next to `path`.
pub fn backup_path(path: &Path) -> TimelineResult<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| TimelineError::invalid(format!("no file name in {}", path.display())))?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{}_backup{}.{}", stem, n, DOCUMENT_EXT));
        if !candidate.exists() {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Copy `path` to its next free backup name.
pub fn write_backup(path: &Path) -> TimelineResult<PathBuf> {
    let target = backup_path(path)?;
    std::fs::copy(path, &target)?;
    debug!("Copied {} to {}", path.display(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_numbering() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = dir.path().join("film.kdenlive");
        std::fs::write(&doc, "<mlt/>").expect("write");

        let first = write_backup(&doc).expect("first");
        assert_eq!(first, dir.path().join("film_backup1.kdenlive"));
        let second = write_backup(&doc).expect("second");
        assert_eq!(second, dir.path().join("film_backup2.kdenlive"));
        assert_eq!(std::fs::read_to_string(second).expect("read"), "<mlt/>");
    }

    #[test]
    fn test_backup_of_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = write_backup(&dir.path().join("gone.kdenlive")).expect_err("missing");
        assert_eq!(err.code(), "IO_ERROR");
    }
}
