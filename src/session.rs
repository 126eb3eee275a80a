//! Session context and event dispatch.
//!
//! A [`Session`] owns everything that lives for one interactive run: the
//! index (once built), the transcript and the chat state. Each user action is
//! a [`SessionEvent`] handled by [`Session::handle`]; rendering is left to the
//! caller.
//!
//! State starts at [`SessionState::AwaitingDocuments`]. The only transition
//! is to [`SessionState::Ready`], committed in [`Session::commit_index`] after
//! the first successful index build. Later processing actions replace the
//! index but never leave `Ready`.

use std::fmt;
use std::path::PathBuf;

use crate::config::Config;
use crate::connector_github::{DownloadReport, GitHubSource, RemoteFile, RepoRef};
use crate::index::VectorIndex;
use crate::ingest::{self, IngestOptions, IngestReport};
use crate::models::{ChatMessage, Role};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::query::{Answer, QueryEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No index yet; questions are refused.
    AwaitingDocuments,
    /// An index exists; questions are answered.
    Ready,
}

/// Append-only conversation history.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages from `role`.
    pub fn count(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}

/// A user action.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ProcessFolder { folder: PathBuf, refresh: bool },
    ProcessGitHub { repo: RepoRef, refresh: bool },
    SubmitQuestion(String),
}

/// What the GitHub listing and download produced.
#[derive(Debug)]
pub struct RemoteFetch {
    pub repo: RepoRef,
    pub files: Vec<RemoteFile>,
    pub downloads: DownloadReport,
}

/// Outcome of a processing action.
#[derive(Debug)]
pub struct ProcessingSummary {
    pub ingest: IngestReport,
    pub remote: Option<RemoteFetch>,
    /// Chunks in the new index; `None` when no index was built.
    pub indexed_chunks: Option<usize>,
    /// `true` only for the action that moved the session to `Ready`.
    pub chat_enabled_now: bool,
}

#[derive(Debug)]
pub enum SessionUpdate {
    Processed(ProcessingSummary),
    Answered(Answer),
}

#[derive(Debug)]
pub enum SessionError {
    /// A question arrived before any index was built.
    ChatDisabled,
    EmptyQuestion,
    Failed(anyhow::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ChatDisabled => {
                write!(f, "chat is disabled until documents have been processed")
            }
            SessionError::EmptyQuestion => write!(f, "question is empty"),
            SessionError::Failed(e) => write!(f, "{:#}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<anyhow::Error> for SessionError {
    fn from(e: anyhow::Error) -> Self {
        SessionError::Failed(e)
    }
}

pub struct Session {
    config: Config,
    engine: QueryEngine,
    progress: Box<dyn ProgressReporter>,
    state: SessionState,
    index: Option<VectorIndex>,
    transcript: Transcript,
}

impl Session {
    pub fn new(config: Config, engine: QueryEngine, progress: Box<dyn ProgressReporter>) -> Self {
        Self {
            config,
            engine,
            progress,
            state: SessionState::AwaitingDocuments,
            index: None,
            transcript: Transcript::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub async fn handle(&mut self, event: SessionEvent) -> Result<SessionUpdate, SessionError> {
        match event {
            SessionEvent::ProcessFolder { folder, refresh } => self
                .process_folder(folder, refresh)
                .await
                .map(SessionUpdate::Processed),
            SessionEvent::ProcessGitHub { repo, refresh } => self
                .process_github(repo, refresh)
                .await
                .map(SessionUpdate::Processed),
            SessionEvent::SubmitQuestion(question) => {
                self.submit(question).await.map(SessionUpdate::Answered)
            }
        }
    }

    async fn process_folder(
        &mut self,
        folder: PathBuf,
        refresh: bool,
    ) -> Result<ProcessingSummary, SessionError> {
        let options = IngestOptions::from_library(&self.config.library, refresh);
        let report = ingest::ingest_folder(
            &folder,
            &self.config.library,
            &options,
            self.progress.as_ref(),
        )?;
        self.index_report(report, None).await
    }

    async fn process_github(
        &mut self,
        repo: RepoRef,
        refresh: bool,
    ) -> Result<ProcessingSummary, SessionError> {
        let source = GitHubSource::new(&self.config.github)?;
        self.progress.report(ProgressEvent::Discovering {
            source: repo.to_string(),
        });
        let files = source.list_supported(&repo).await?;
        let downloads = source
            .download_all(&files, &self.config.github.download_dir, self.progress.as_ref())
            .await?;

        let options = IngestOptions::from_library(&self.config.library, refresh);
        let report =
            ingest::ingest_files(&downloads.downloaded, &options, self.progress.as_ref());
        let remote = RemoteFetch {
            repo,
            files,
            downloads,
        };
        self.index_report(report, Some(remote)).await
    }

    /// Build an index when the report has artifacts. Zero artifacts leaves
    /// the session as it was, without calling the embedder.
    async fn index_report(
        &mut self,
        report: IngestReport,
        remote: Option<RemoteFetch>,
    ) -> Result<ProcessingSummary, SessionError> {
        let artifacts = report.artifacts();
        if artifacts.is_empty() {
            tracing::warn!("no documents ingested; chat stays disabled");
            return Ok(ProcessingSummary {
                ingest: report,
                remote,
                indexed_chunks: None,
                chat_enabled_now: false,
            });
        }

        let index = VectorIndex::build(
            &artifacts,
            self.engine.embedder(),
            &self.config.chunking,
            self.config.embedding.batch_size,
            self.progress.as_ref(),
        )
        .await?;
        let chunks = index.len();
        let chat_enabled_now = self.commit_index(index);

        Ok(ProcessingSummary {
            ingest: report,
            remote,
            indexed_chunks: Some(chunks),
            chat_enabled_now,
        })
    }

    /// Install a new index. Returns `true` if this moved the session to
    /// `Ready`.
    fn commit_index(&mut self, index: VectorIndex) -> bool {
        self.index = Some(index);
        match self.state {
            SessionState::AwaitingDocuments => {
                self.state = SessionState::Ready;
                tracing::info!("chat enabled");
                true
            }
            SessionState::Ready => false,
        }
    }

    async fn submit(&mut self, question: String) -> Result<Answer, SessionError> {
        let Some(index) = self.index.as_ref() else {
            return Err(SessionError::ChatDisabled);
        };
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        self.transcript.push(ChatMessage::user(question.as_str()));
        let answer = self.engine.ask(index, &question).await?;
        self.transcript.push(ChatMessage::assistant(answer.text.clone()));
        Ok(answer)
    }
}
