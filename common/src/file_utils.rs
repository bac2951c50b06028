//! File utility functions for listing and filtering files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Supported FITS file extensions.
pub const FITS_EXTENSIONS: &[&str] = &["fit", "fits", "fts"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    extensions.contains(&ext.to_lowercase().as_str())
}

/// Returns paths to all files in a directory matching the given extensions.
/// Extensions are matched case-insensitively. Returns an empty list if the
/// directory does not exist.
pub fn files_with_extensions(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Walks `dir` recursively and returns every file matching the given extensions,
/// sorted by path.
pub fn files_with_extensions_recursive(
    dir: &Path,
    extensions: &[&str],
) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if has_extension(&path, extensions) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Returns paths to all FITS files under the given directory, recursively.
pub fn fits_files_recursive(dir: &Path) -> io::Result<Vec<PathBuf>> {
    files_with_extensions_recursive(dir, FITS_EXTENSIONS)
}

/// Moves `from` to `to`, falling back to copy + remove when a plain rename
/// is not possible (e.g. across filesystems).
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() {
                return Err(rename_err);
            }
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_files_with_extensions_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.FITS"));
        touch(&dir.path().join("a.fit"));
        touch(&dir.path().join("notes.txt"));

        let files = files_with_extensions(dir.path(), FITS_EXTENSIONS).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.fit", "b.FITS"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let files = files_with_extensions(Path::new("/nonexistent/ccd"), FITS_EXTENSIONS).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_recursive_walk_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("20151027").join("darks");
        fs::create_dir_all(&nested).unwrap();
        touch(&dir.path().join("light_001.fits"));
        touch(&nested.join("dark_001.fit"));
        touch(&nested.join("readme.md"));

        let files = fits_files_recursive(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("dark_001.fit")));
        assert!(files.iter().any(|p| p.ends_with("light_001.fits")));
    }

    #[test]
    fn test_move_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("flat.fits");
        let to = dir.path().join("flat_moved.fits");
        fs::write(&from, b"data").unwrap();

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"data");
    }

    #[test]
    fn test_move_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = move_file(&dir.path().join("absent.fits"), &dir.path().join("x.fits"));
        assert!(result.is_err());
    }
}
