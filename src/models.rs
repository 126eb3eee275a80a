//! Core data models used throughout docchat.
//!
//! These types represent the source documents, chunks, retrieval results,
//! and chat messages that flow through the ingestion and query pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extension used for extracted-text artifacts.
pub const ARTIFACT_EXTENSION: &str = "txt";

/// A document format the extractors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Epub,
    Pdf,
    Docx,
    Pptx,
    Txt,
}

impl DocumentFormat {
    /// All supported formats, in display order.
    pub const ALL: [DocumentFormat; 5] = [
        DocumentFormat::Epub,
        DocumentFormat::Pdf,
        DocumentFormat::Docx,
        DocumentFormat::Pptx,
        DocumentFormat::Txt,
    ];

    /// Match a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "epub" => Some(DocumentFormat::Epub),
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "pptx" => Some(DocumentFormat::Pptx),
            "txt" => Some(DocumentFormat::Txt),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical lowercase extension.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Epub => "epub",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Txt => "txt",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DocumentFormat::Epub => "EPUB e-book (XHTML content items)",
            DocumentFormat::Pdf => "PDF document (text layer, page by page)",
            DocumentFormat::Docx => "Word document (paragraphs)",
            DocumentFormat::Pptx => "PowerPoint deck (text shapes per slide)",
            DocumentFormat::Txt => "Plain text (used verbatim)",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A file on disk that the ingestion driver may convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

impl SourceDocument {
    pub fn new(path: PathBuf, format: DocumentFormat) -> Self {
        Self { path, format }
    }

    /// Sibling path holding the extracted text (same stem, `.txt`).
    ///
    /// For plain-text sources this is the source itself.
    pub fn artifact_path(&self) -> PathBuf {
        artifact_path_for(&self.path)
    }
}

pub fn artifact_path_for(path: &Path) -> PathBuf {
    path.with_extension(ARTIFACT_EXTENSION)
}

/// A chunk of an artifact's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Artifact the chunk was cut from.
    pub source: PathBuf,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`; identical chunks share it.
    pub hash: String,
}

impl Chunk {
    /// File name of the chunk's artifact, for display.
    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// A chunk returned by an index lookup, with its similarity score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Speaker of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

/// One message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("books/Novel.EPUB")),
            Some(DocumentFormat::Epub)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("deck.pptx")),
            Some(DocumentFormat::Pptx)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("notes.md")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn artifact_path_replaces_extension() {
        let doc = SourceDocument::new(PathBuf::from("books/guide.pdf"), DocumentFormat::Pdf);
        assert_eq!(doc.artifact_path(), PathBuf::from("books/guide.txt"));

        let txt = SourceDocument::new(PathBuf::from("books/notes.txt"), DocumentFormat::Txt);
        assert_eq!(txt.artifact_path(), txt.path);
    }
}
