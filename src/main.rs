//! # docchat CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat formats` | List supported document formats |
//! | `docchat extract <FILE>` | Print one file's extracted text |
//! | `docchat ingest` | Convert a folder's documents to `.txt` artifacts |
//! | `docchat fetch` | Download a GitHub repository's documents and ingest them |
//! | `docchat chat` | Process documents, then chat in the terminal |
//! | `docchat ask "<question>"` | Process documents and answer one question |
//!
//! ## Examples
//!
//! ```bash
//! docchat ingest --folder books
//! docchat chat --owner octocat --repo library --branch main
//! docchat ask "What is chapter two about?" --folder books
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use docchat::chat;
use docchat::config::{self, Config};
use docchat::connector_fs;
use docchat::connector_github::{self, GitHubSource, RepoRef};
use docchat::embedding::create_embedder;
use docchat::extract;
use docchat::ingest::{self, IngestOptions};
use docchat::llm::create_completion_model;
use docchat::logging;
use docchat::models::DocumentFormat;
use docchat::progress::{ProgressEvent, ProgressMode};
use docchat::query::QueryEngine;
use docchat::session::{Session, SessionEvent, SessionUpdate};

const DEFAULT_CONFIG: &str = "docchat.toml";

/// docchat: chat with your documents.
///
/// Secrets are read from the environment (`OPENAI_API_KEY`, optional
/// `GITHUB_TOKEN`); a `.env` file in the working directory is loaded first.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Chat with a folder of EPUB, PDF, DOCX, PPTX and TXT documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./docchat.toml`,
    /// which may be absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress on stderr: `human`, `json` or `off`. Defaults to `human`
    /// when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported document formats.
    Formats,

    /// Extract one document and print its text.
    Extract {
        /// Path to an EPUB, PDF, DOCX, PPTX or TXT file.
        file: PathBuf,
    },

    /// Convert every document in a folder to a sibling `.txt` artifact.
    ///
    /// Files whose artifact already exists are not re-extracted unless
    /// `--refresh` is given.
    Ingest {
        /// Folder to scan. Defaults to `[library].folder`.
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Re-extract even when an artifact exists.
        #[arg(long)]
        refresh: bool,
    },

    /// List a GitHub repository, download its supported files and ingest them.
    Fetch {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,

        /// Download folder. Defaults to `[github].download_dir`.
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Only list and summarize; download nothing.
        #[arg(long)]
        list_only: bool,

        #[arg(long)]
        refresh: bool,
    },

    /// Process documents, then chat with them in the terminal.
    Chat {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Process documents and answer a single question.
    Ask {
        question: String,

        #[command(flatten)]
        source: SourceArgs,
    },
}

/// Where documents come from: a local folder, or a GitHub repository when
/// `--owner`/`--repo` are given (or configured in `[github]`).
#[derive(Args, Clone)]
struct SourceArgs {
    #[arg(long, conflicts_with_all = ["owner", "repo"])]
    folder: Option<PathBuf>,

    #[arg(long)]
    owner: Option<String>,

    #[arg(long)]
    repo: Option<String>,

    #[arg(long)]
    branch: Option<String>,

    /// Re-extract even when an artifact exists.
    #[arg(long)]
    refresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let progress = ProgressMode::from_flag(cli.progress.as_deref())?;

    if let Commands::Formats = cli.command {
        print_formats();
        return Ok(());
    }

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_or_default(Path::new(DEFAULT_CONFIG), true)?,
    };

    match cli.command {
        Commands::Formats => {}
        Commands::Extract { file } => {
            let format = DocumentFormat::from_path(&file).ok_or_else(|| {
                anyhow::anyhow!("Unsupported file format: {}", file.display())
            })?;
            let text = extract::extract_file(&file, format, Some(cfg.library.max_file_bytes))
                .with_context(|| format!("Failed to extract {}", file.display()))?;
            print!("{}", text);
        }
        Commands::Ingest { folder, refresh } => {
            let folder = folder.unwrap_or_else(|| cfg.library.folder.clone());
            let reporter = progress.reporter();
            let options = IngestOptions::from_library(&cfg.library, refresh);
            let report =
                ingest::ingest_folder(&folder, &cfg.library, &options, reporter.as_ref())?;
            report.print_summary(&folder.display().to_string());
        }
        Commands::Fetch {
            owner,
            repo,
            branch,
            dest,
            list_only,
            refresh,
        } => {
            let repo = resolve_repo(&cfg, owner, repo, branch)?
                .ok_or_else(|| anyhow::anyhow!("--owner and --repo are required"))?;
            let dest = dest.unwrap_or_else(|| cfg.github.download_dir.clone());
            let reporter = progress.reporter();

            let source = GitHubSource::new(&cfg.github)?;
            reporter.report(ProgressEvent::Discovering {
                source: repo.to_string(),
            });
            let files = source.list_supported(&repo).await?;
            connector_github::print_summary(&repo, &files);
            if list_only {
                return Ok(());
            }

            let downloads = source
                .download_all(&files, &dest, reporter.as_ref())
                .await?;
            println!("downloaded {} / {}", downloads.downloaded.len(), files.len());
            for (path, reason) in &downloads.failures {
                println!("  failed: {}: {}", path, reason);
            }

            let options = IngestOptions::from_library(&cfg.library, refresh);
            let report = ingest::ingest_files(&downloads.downloaded, &options, reporter.as_ref());
            report.print_summary(&dest.display().to_string());
        }
        Commands::Chat { source } => {
            let mut session = open_session(&cfg, progress)?;
            let event = processing_event(&cfg, source)?;
            process(&mut session, event, &mut std::io::stdout()).await?;

            let stdin = std::io::stdin();
            chat::run_chat(&mut session, stdin.lock(), std::io::stdout()).await?;
        }
        Commands::Ask { question, source } => {
            let mut session = open_session(&cfg, progress)?;
            let event = processing_event(&cfg, source)?;
            process(&mut session, event, &mut std::io::stderr()).await?;
            if !session.is_ready() {
                bail!("No documents could be processed; nothing to ask");
            }

            match session.handle(SessionEvent::SubmitQuestion(question)).await? {
                SessionUpdate::Answered(answer) => {
                    chat::render_answer(&answer, &mut std::io::stdout())?
                }
                SessionUpdate::Processed(_) => {}
            }
        }
    }

    Ok(())
}

fn print_formats() {
    println!("{:<6} DESCRIPTION", "EXT");
    for format in DocumentFormat::ALL {
        println!(".{:<5} {}", format.extension(), format.description());
    }
}

/// Construct the providers (this is where a missing `OPENAI_API_KEY` is
/// reported) and an empty session.
fn open_session(cfg: &Config, progress: ProgressMode) -> Result<Session> {
    let embedder = create_embedder(&cfg.embedding)?;
    let llm = create_completion_model(&cfg.llm)?;
    let engine = QueryEngine::new(embedder, llm, cfg.retrieval.top_k);
    Ok(Session::new(cfg.clone(), engine, progress.reporter()))
}

fn processing_event(cfg: &Config, source: SourceArgs) -> Result<SessionEvent> {
    let refresh = source.refresh;
    if source.folder.is_none() {
        if let Some(repo) = resolve_repo(cfg, source.owner, source.repo, source.branch)? {
            return Ok(SessionEvent::ProcessGitHub { repo, refresh });
        }
    }

    let folder = match source.folder {
        Some(folder) => folder,
        None => {
            connector_fs::ensure_folder(&cfg.library.folder)?;
            cfg.library.folder.clone()
        }
    };
    Ok(SessionEvent::ProcessFolder { folder, refresh })
}

/// Flags win over `[github]`; `None` when no repository is named anywhere.
fn resolve_repo(
    cfg: &Config,
    owner: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
) -> Result<Option<RepoRef>> {
    let flagged = owner.is_some() || repo.is_some();
    let owner = owner.or_else(|| cfg.github.owner.clone());
    let repo = repo.or_else(|| cfg.github.repo.clone());
    let branch = branch.unwrap_or_else(|| cfg.github.branch.clone());

    match (owner, repo) {
        (Some(owner), Some(repo)) => Ok(Some(RepoRef::new(&owner, &repo, &branch)?)),
        _ if flagged => bail!("--owner and --repo must be given together"),
        _ => Ok(None),
    }
}

async fn process(
    session: &mut Session,
    event: SessionEvent,
    out: &mut impl std::io::Write,
) -> Result<()> {
    if let SessionUpdate::Processed(summary) = session.handle(event).await? {
        chat::render_processing(&summary, out)?;
    }
    Ok(())
}
