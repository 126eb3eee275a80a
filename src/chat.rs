//! Terminal chat surface.
//!
//! Renders processing results, the example-question panel and the
//! transcript, and turns input lines into [`SessionEvent::SubmitQuestion`]s.
//! Generic over the reader and writer so tests can drive it with byte
//! buffers.
//!
//! Commands: `/examples`, `/history`, `/sources`, `/help`, `/exit`.

use std::io::{BufRead, Write};

use anyhow::Result;

use crate::connector_github::group_by_format;
use crate::ingest::FileStatus;
use crate::models::Role;
use crate::query::Answer;
use crate::session::{ProcessingSummary, Session, SessionError, SessionEvent, SessionUpdate};

/// Example questions shown next to the chat, grouped by language.
pub const EXAMPLE_QUESTIONS: &[(&str, &[&str])] = &[
    (
        "English",
        &[
            "What is the main topic of the document?",
            "Summarize the key points of chapter one.",
            "Which people or organizations are mentioned?",
        ],
    ),
    (
        "Español",
        &[
            "¿Cuál es el tema principal del documento?",
            "Resume los puntos clave del primer capítulo.",
            "¿Qué personas u organizaciones se mencionan?",
        ],
    ),
];

const HELP: &str = "commands: /examples  /history  /sources  /help  /exit";

pub fn render_examples(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Example questions")?;
    for (language, questions) in EXAMPLE_QUESTIONS {
        writeln!(out, "  {}", language)?;
        for q in *questions {
            writeln!(out, "    - {}", q)?;
        }
    }
    Ok(())
}

/// Per-file messages, remote summary and the resulting chat state.
pub fn render_processing(summary: &ProcessingSummary, out: &mut impl Write) -> std::io::Result<()> {
    if let Some(remote) = &summary.remote {
        writeln!(
            out,
            "Found {} supported file(s) in {}",
            remote.files.len(),
            remote.repo
        )?;
        for (format, paths) in group_by_format(&remote.files) {
            writeln!(out, "  .{}: {}", format.extension(), paths.len())?;
        }
        for (path, reason) in &remote.downloads.failures {
            writeln!(out, "Failed to download {}: {}", path, reason)?;
        }
    }

    for outcome in &summary.ingest.outcomes {
        let name = outcome.file_name();
        match &outcome.status {
            FileStatus::Extracted { chars, .. } => {
                writeln!(out, "Processed: {} ({} chars)", name, chars)?
            }
            FileStatus::Cached { .. } => writeln!(out, "Already processed: {}", name)?,
            FileStatus::PlainText { .. } => writeln!(out, "Loaded: {}", name)?,
            FileStatus::SkippedArtifact => {}
            FileStatus::Empty => writeln!(out, "No text found in {}", name)?,
            FileStatus::Unsupported { extension } if extension.is_empty() => {
                writeln!(out, "Unsupported file format: no extension ({})", name)?
            }
            FileStatus::Unsupported { extension } => {
                writeln!(out, "Unsupported file format: {} ({})", extension, name)?
            }
            FileStatus::Failed { reason } => writeln!(out, "Error processing {}: {}", name, reason)?,
        }
    }

    match summary.indexed_chunks {
        Some(chunks) => writeln!(
            out,
            "Documents processed successfully ({} artifact(s), {} chunks).",
            summary.ingest.artifacts().len(),
            chunks
        )?,
        None => writeln!(out, "No documents could be processed.")?,
    }
    if summary.chat_enabled_now {
        writeln!(out, "Chat enabled.")?;
    }
    Ok(())
}

pub fn render_answer(answer: &Answer, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "{}", answer.text)?;
    if !answer.sources.is_empty() {
        let cites: Vec<String> = answer
            .sources
            .iter()
            .map(|c| format!("{} #{} ({:.2})", c.file_name, c.chunk_index, c.score))
            .collect();
        writeln!(out, "  sources: {}", cites.join(", "))?;
    }
    Ok(())
}

pub fn render_transcript(session: &Session, out: &mut impl Write) -> std::io::Result<()> {
    if session.transcript().is_empty() {
        return writeln!(out, "(no messages yet)");
    }
    for message in session.transcript().messages() {
        let speaker = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        writeln!(out, "[{}] {}", speaker, message.content)?;
    }
    Ok(())
}

fn render_sources(session: &Session, out: &mut impl Write) -> std::io::Result<()> {
    let Some(index) = session.index() else {
        return writeln!(out, "(no index)");
    };
    writeln!(
        out,
        "{} chunk(s) from {} document(s), embedded with {}",
        index.len(),
        index.sources().len(),
        index.model_name()
    )?;
    for source in index.sources() {
        writeln!(out, "  {}", source.display())?;
    }
    Ok(())
}

/// Read questions from `input` until EOF or `/exit`.
///
/// Returns immediately, after telling the user to supply documents, when the
/// session is not ready. Query failures are printed and the loop continues.
pub async fn run_chat<R: BufRead, W: Write>(
    session: &mut Session,
    mut input: R,
    mut out: W,
) -> Result<()> {
    if !session.is_ready() {
        writeln!(
            out,
            "Please add documents to the '{}' folder (or point --owner/--repo at a GitHub repository) and run again.",
            session.config().library.folder.display()
        )?;
        return Ok(());
    }

    writeln!(out, "Chat with your documents ({})", session.engine().llm_model())?;
    render_examples(&mut out)?;
    writeln!(out, "{}", HELP)?;

    let mut line = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        // strip the line terminator only
        let question = line.trim_end_matches(['\r', '\n']);

        match question.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/examples" => render_examples(&mut out)?,
            "/history" => render_transcript(session, &mut out)?,
            "/sources" => render_sources(session, &mut out)?,
            "/help" => writeln!(out, "{}", HELP)?,
            _ => match session
                .handle(SessionEvent::SubmitQuestion(question.to_string()))
                .await
            {
                Ok(SessionUpdate::Answered(answer)) => render_answer(&answer, &mut out)?,
                Ok(SessionUpdate::Processed(_)) => {}
                Err(SessionError::Failed(e)) => {
                    tracing::error!(error = %format!("{:#}", e), "query failed");
                    writeln!(out, "error: {:#}", e)?
                }
                Err(e) => writeln!(out, "error: {}", e)?,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn examples_cover_two_languages() {
        assert_eq!(EXAMPLE_QUESTIONS.len(), 2);
        let mut buf = Vec::new();
        render_examples(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("English"));
        assert!(text.contains("¿Cuál es el tema principal del documento?"));
    }

    #[test]
    fn unsupported_files_name_their_extension() {
        use crate::ingest::{FileOutcome, IngestReport};
        use std::path::PathBuf;

        let summary = ProcessingSummary {
            ingest: IngestReport {
                outcomes: vec![
                    FileOutcome {
                        path: PathBuf::from("books/README"),
                        status: FileStatus::Unsupported {
                            extension: String::new(),
                        },
                    },
                    FileOutcome {
                        path: PathBuf::from("books/cover.png"),
                        status: FileStatus::Unsupported {
                            extension: ".png".to_string(),
                        },
                    },
                ],
            },
            remote: None,
            indexed_chunks: None,
            chat_enabled_now: false,
        };
        let mut buf = Vec::new();
        render_processing(&summary, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Unsupported file format: no extension (README)\n"));
        assert!(text.contains("Unsupported file format: .png (cover.png)\n"));
        assert!(!text.contains(":  ("));
    }

    #[test]
    fn answer_lists_sources() {
        let answer = Answer {
            text: "Forty-two.".to_string(),
            sources: vec![crate::query::Citation {
                file_name: "guide.txt".to_string(),
                chunk_index: 3,
                score: 0.912,
            }],
        };
        let mut buf = Vec::new();
        render_answer(&answer, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "Forty-two.\n  sources: guide.txt #3 (0.91)\n");
    }
}
