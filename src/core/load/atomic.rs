//! Write-then-rename file output
//!
//! Files are written to a temporary file in the destination folder and moved
//! into place in one rename, so readers never observe a partial file.

use crate::domain::{ImmunizationError, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCollision<'a> {
    /// Replace the existing file
    Overwrite,
    /// Retry once with `_{suffix}` appended to the file stem
    Suffix(&'a str),
    /// Report an error
    Fail,
}

/// Atomically writes `bytes` to `path`, returning the path actually written
///
/// # Errors
///
/// Returns [`ImmunizationError::Io`] if the folder cannot be created, the
/// write fails, or the destination (and its suffixed alternative) exists.
pub fn write_atomic(path: &Path, bytes: &[u8], on_collision: OnCollision<'_>) -> Result<PathBuf> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| {
        ImmunizationError::Io(format!("cannot create folder {}: {e}", dir.display()))
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        ImmunizationError::Io(format!("cannot create temp file in {}: {e}", dir.display()))
    })?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ImmunizationError::Io(format!("cannot write {}: {e}", path.display())))?;

    if on_collision == OnCollision::Overwrite {
        tmp.persist(path)
            .map_err(|e| ImmunizationError::Io(format!("cannot replace {}: {}", path.display(), e.error)))?;
        return Ok(path.to_path_buf());
    }

    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(path.to_path_buf()),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => match on_collision {
            OnCollision::Suffix(suffix) => {
                let alternative = with_stem_suffix(path, suffix);
                tracing::warn!(
                    path = %path.display(),
                    alternative = %alternative.display(),
                    "Output file already exists, writing alternative name"
                );
                e.file.persist_noclobber(&alternative).map_err(|e| {
                    ImmunizationError::Io(format!(
                        "output files {} and {} already exist: {}",
                        path.display(),
                        alternative.display(),
                        e.error
                    ))
                })?;
                Ok(alternative)
            }
            _ => Err(ImmunizationError::Io(format!(
                "file {} already exists",
                path.display()
            ))),
        },
        Err(e) => Err(ImmunizationError::Io(format!(
            "cannot persist {}: {}",
            path.display(),
            e.error
        ))),
    }
}

/// `dir/name.ext` -> `dir/name_{suffix}.ext`
fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_folder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let written = write_atomic(&path, b"a,b\n", OnCollision::Fail).unwrap();
        assert_eq!(written, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n");
    }

    #[test]
    fn test_collision_uses_suffix_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2542_20250301_140509.csv");

        write_atomic(&path, b"first", OnCollision::Suffix("ab12cd34")).unwrap();
        let second = write_atomic(&path, b"second", OnCollision::Suffix("ab12cd34")).unwrap();
        assert_eq!(
            second.file_name().unwrap(),
            "2542_20250301_140509_ab12cd34.csv"
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        let third = write_atomic(&path, b"third", OnCollision::Suffix("ab12cd34"));
        assert!(matches!(third, Err(ImmunizationError::Io(_))));
    }

    #[test]
    fn test_overwrite_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.csv");
        write_atomic(&path, b"old", OnCollision::Overwrite).unwrap();
        write_atomic(&path, b"new", OnCollision::Overwrite).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        write_atomic(&path, b"x", OnCollision::Fail).unwrap();
        let _ = write_atomic(&path, b"y", OnCollision::Fail);
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
