//! Ingestion driver.
//!
//! Converts a set of candidate files into extracted-text artifacts:
//! unsupported → reported; artifact of a sibling source → skipped;
//! artifact already on disk → reused (no staleness check unless `refresh`);
//! otherwise extract and write `<stem>.txt` next to the source. When two
//! sources share a stem (`report.docx`, `report.pptx`) only the first owns
//! `report.txt`; the others fail rather than pass off its text as theirs.
//!
//! Every file yields a [`FileOutcome`]; one bad file never aborts the batch.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::LibraryConfig;
use crate::connector_fs;
use crate::extract;
use crate::models::{DocumentFormat, SourceDocument};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Knobs for one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Re-extract even when an artifact already exists.
    pub refresh: bool,
    /// Reject sources larger than this many bytes.
    pub max_file_bytes: Option<u64>,
}

impl IngestOptions {
    pub fn from_library(library: &LibraryConfig, refresh: bool) -> Self {
        Self {
            refresh,
            max_file_bytes: Some(library.max_file_bytes),
        }
    }
}

/// What happened to one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Text extracted and written to `artifact`.
    Extracted { artifact: PathBuf, chars: usize },
    /// Artifact already existed; extraction skipped.
    Cached { artifact: PathBuf },
    /// Plain-text source used in place as its own artifact.
    PlainText { artifact: PathBuf },
    /// The file is the text artifact of another candidate.
    SkippedArtifact,
    /// Extraction succeeded but produced no text.
    Empty,
    Unsupported { extension: String },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileOutcome {
    /// Artifact this file contributes to the index, if any.
    pub fn artifact(&self) -> Option<&Path> {
        match &self.status {
            FileStatus::Extracted { artifact, .. }
            | FileStatus::Cached { artifact }
            | FileStatus::PlainText { artifact } => Some(artifact),
            _ => None,
        }
    }

    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

/// Per-file results of one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub outcomes: Vec<FileOutcome>,
}

impl IngestReport {
    /// Every artifact produced or reused, deduplicated, in candidate order.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.outcomes
            .iter()
            .filter_map(|o| o.artifact())
            .filter(|p| seen.insert(p.to_path_buf()))
            .map(|p| p.to_path_buf())
            .collect()
    }

    /// `true` when at least one artifact is available for indexing.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().any(|o| o.artifact().is_some())
    }

    pub fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FileOutcome, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            FileStatus::Failed { reason } => Some((o, reason.as_str())),
            _ => None,
        })
    }

    /// Print the summary block to stdout.
    pub fn print_summary(&self, label: &str) {
        println!("ingest {}", label);
        println!("  files found: {}", self.outcomes.len());
        println!(
            "  extracted: {}",
            self.count(|s| matches!(s, FileStatus::Extracted { .. }))
        );
        println!(
            "  cached: {}",
            self.count(|s| matches!(s, FileStatus::Cached { .. }))
        );
        println!(
            "  plain text: {}",
            self.count(|s| matches!(s, FileStatus::PlainText { .. }))
        );
        println!(
            "  skipped artifacts: {}",
            self.count(|s| matches!(s, FileStatus::SkippedArtifact))
        );
        println!("  empty: {}", self.count(|s| matches!(s, FileStatus::Empty)));

        let unsupported: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                FileStatus::Unsupported { .. } => Some(o.file_name()),
                _ => None,
            })
            .collect();
        if unsupported.is_empty() {
            println!("  unsupported: 0");
        } else {
            println!(
                "  unsupported: {} ({})",
                unsupported.len(),
                unsupported.join(", ")
            );
        }

        println!(
            "  failed: {}",
            self.count(|s| matches!(s, FileStatus::Failed { .. }))
        );
        for (outcome, reason) in self.failures() {
            println!("    {}: {}", outcome.file_name(), reason);
        }
        println!("  artifacts: {}", self.artifacts().len());
        if self.is_complete() {
            println!("ok");
        } else {
            println!("no documents ingested");
        }
    }
}

/// Scan `folder` and ingest everything in it.
pub fn ingest_folder(
    folder: &Path,
    library: &LibraryConfig,
    options: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    progress.report(ProgressEvent::Discovering {
        source: folder.display().to_string(),
    });
    let files = connector_fs::scan_folder(folder, library)?;
    Ok(ingest_files(&files, options, progress))
}

/// Ingest an explicit list of candidate files.
pub fn ingest_files(
    files: &[PathBuf],
    options: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> IngestReport {
    let owners = artifact_owners(files);
    let total = files.len() as u64;
    let mut report = IngestReport::default();

    for (i, path) in files.iter().enumerate() {
        progress.report(ProgressEvent::Processing {
            file: display_name(path),
            n: i as u64 + 1,
            total,
        });
        let status = ingest_one(path, &owners, options);
        log_outcome(path, &status);
        report.outcomes.push(FileOutcome {
            path: path.clone(),
            status,
        });
    }

    report
}

fn ingest_one(path: &Path, owners: &HashMap<StemKey, PathBuf>, options: &IngestOptions) -> FileStatus {
    let Some(format) = DocumentFormat::from_path(path) else {
        return FileStatus::Unsupported {
            extension: path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default(),
        };
    };

    let doc = SourceDocument::new(path.to_path_buf(), format);

    if format == DocumentFormat::Txt {
        if let Some(key) = stem_key(path) {
            if owners.contains_key(&key) {
                return FileStatus::SkippedArtifact;
            }
        }
        return match extract::extract_file(path, format, options.max_file_bytes) {
            Ok(text) if text.trim().is_empty() => FileStatus::Empty,
            Ok(_) => FileStatus::PlainText {
                artifact: doc.artifact_path(),
            },
            Err(e) => FileStatus::Failed {
                reason: e.to_string(),
            },
        };
    }

    let artifact = doc.artifact_path();
    if let Some(owner) = stem_key(path).and_then(|key| owners.get(&key)) {
        if owner != path {
            return FileStatus::Failed {
                reason: format!(
                    "artifact {} is shared with {}",
                    display_name(&artifact),
                    display_name(owner)
                ),
            };
        }
    }
    if artifact.exists() && !options.refresh {
        return FileStatus::Cached { artifact };
    }

    let text = match extract::extract_file(path, format, options.max_file_bytes) {
        Ok(text) => text,
        Err(e) => {
            return FileStatus::Failed {
                reason: e.to_string(),
            }
        }
    };
    if text.trim().is_empty() {
        return FileStatus::Empty;
    }

    match std::fs::write(&artifact, &text) {
        Ok(()) => FileStatus::Extracted {
            artifact,
            chars: text.chars().count(),
        },
        Err(e) => FileStatus::Failed {
            reason: format!("could not write {}: {}", artifact.display(), e),
        },
    }
}

/// (directory, stem)
type StemKey = (PathBuf, OsString);

/// First non-text supported candidate for each (directory, stem): it owns
/// the `.txt` artifact with that key. A `.txt` with the same key is that
/// candidate's artifact, not a source of its own.
fn artifact_owners(files: &[PathBuf]) -> HashMap<StemKey, PathBuf> {
    let mut owners = HashMap::new();
    for path in files {
        if !matches!(DocumentFormat::from_path(path), Some(f) if f != DocumentFormat::Txt) {
            continue;
        }
        if let Some(key) = stem_key(path) {
            owners.entry(key).or_insert_with(|| path.clone());
        }
    }
    owners
}

fn stem_key(path: &Path) -> Option<StemKey> {
    let parent = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    path.file_stem().map(|s| (parent, s.to_os_string()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn log_outcome(path: &Path, status: &FileStatus) {
    match status {
        FileStatus::Extracted { artifact, chars } => {
            tracing::info!(file = %path.display(), artifact = %artifact.display(), chars, "extracted")
        }
        FileStatus::Cached { artifact } => {
            tracing::info!(file = %path.display(), artifact = %artifact.display(), "artifact exists, skipping extraction")
        }
        FileStatus::PlainText { .. } => {
            tracing::info!(file = %path.display(), "plain text used in place")
        }
        FileStatus::SkippedArtifact => {
            tracing::debug!(file = %path.display(), "extracted-text artifact, not a source")
        }
        FileStatus::Empty => tracing::warn!(file = %path.display(), "no text extracted"),
        FileStatus::Unsupported { extension } => {
            tracing::warn!(file = %path.display(), extension = %extension, "unsupported file format")
        }
        FileStatus::Failed { reason } => {
            tracing::warn!(file = %path.display(), reason = %reason, "extraction failed")
        }
    }
}
