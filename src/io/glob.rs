//! Path resolution for file sources.
//!
//! A source path is either a single file or a glob pattern such as
//! `data/*.csv` or `events/year=2024/**/*.parquet`. Patterns expand to files
//! in sorted order so multi-file reads are deterministic.

use crate::error::FrameError;
use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};

/// Whether `pattern` contains glob metacharacters.
#[must_use]
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand a glob pattern into the sorted list of matching files.
///
/// Directories are skipped; no match yields an empty vector.
///
/// # Errors
/// If the pattern is invalid or a matched entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
    let mut files = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve a source path or pattern to the files it names.
///
/// # Errors
/// `SourceNotFound` when the file is missing or the pattern matches nothing.
pub fn resolve_paths(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let text = path.to_string_lossy();
    if is_glob(&text) {
        let files = expand_glob(&text)?;
        if files.is_empty() {
            return Err(FrameError::SourceNotFound { path: path.to_path_buf() }.into());
        }
        return Ok(files);
    }
    if !path.is_file() {
        return Err(FrameError::SourceNotFound { path: path.to_path_buf() }.into());
    }
    Ok(vec![path.to_path_buf()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn patterns_expand_sorted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.csv", "a.csv", "c.txt"] {
            fs::write(dir.path().join(name), "x\n")?;
        }
        fs::create_dir(dir.path().join("d.csv"))?;
        let files = resolve_paths(dir.path().join("*.csv"))?;
        let names: Vec<_> = files.iter().filter_map(|p| p.file_name()?.to_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
        Ok(())
    }

    #[test]
    fn missing_inputs_are_source_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for path in [dir.path().join("nope.csv"), dir.path().join("*.parquet")] {
            let err = resolve_paths(&path).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<FrameError>(),
                Some(FrameError::SourceNotFound { .. })
            ));
        }
        Ok(())
    }
}
