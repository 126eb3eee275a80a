//! Local folder source.
//!
//! Lists every regular file in the library folder (top level only unless
//! `recursive` is set), minus the exclude globs. Unsupported extensions are
//! kept in the listing so the ingestion report can name them.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LibraryConfig;

/// Candidate files under `folder`, sorted by path for deterministic ordering.
pub fn scan_folder(folder: &Path, config: &LibraryConfig) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        bail!("Library folder does not exist: {}", folder.display());
    }
    if !folder.is_dir() {
        bail!("Library path is not a directory: {}", folder.display());
    }

    let mut default_excludes = vec!["**/.*".to_string(), "**/.*/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let max_depth = if config.recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(folder).min_depth(1).max_depth(max_depth) {
        let entry =
            entry.with_context(|| format!("Failed to list library folder {}", folder.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(folder).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Create the library folder when it is missing (first run).
pub fn ensure_folder(folder: &Path) -> Result<()> {
    std::fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create library folder {}", folder.display()))
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn library(recursive: bool, exclude: &[&str]) -> LibraryConfig {
        LibraryConfig {
            recursive,
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            ..LibraryConfig::default()
        }
    }

    #[test]
    fn lists_top_level_files_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.pdf"), b"x").unwrap();
        fs::write(tmp.path().join("a.epub"), b"x").unwrap();
        fs::write(tmp.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("c.txt"), b"x").unwrap();

        let files = scan_folder(tmp.path(), &library(false, &[])).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.epub", "b.pdf"]);
    }

    #[test]
    fn recursive_scan_and_excludes() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.txt"), b"x").unwrap();
        fs::write(tmp.path().join("drop.pdf"), b"x").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("deep.docx"), b"x").unwrap();

        let files = scan_folder(tmp.path(), &library(true, &["*.pdf"])).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("nested/deep.docx")));
        assert!(!files.iter().any(|p| p.ends_with("drop.pdf")));
    }

    #[test]
    fn missing_folder_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = scan_folder(&tmp.path().join("nope"), &LibraryConfig::default()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
