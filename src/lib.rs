//! # docchat
//!
//! Chat with your documents from the terminal.
//!
//! docchat converts a folder of EPUB, PDF, DOCX, PPTX and TXT files (or the
//! supported files of a GitHub repository) to plain text, embeds the text
//! through a hosted embedding API into an in-memory index, and answers
//! questions by sending the best-matching chunks to a chat-completion model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Sources    │──▶│ Extract +  │──▶│ Chunk+Embed  │──▶│  Query   │
//! │ folder/GH   │   │ .txt cache │   │ VectorIndex  │   │ + LLM    │
//! └─────────────┘   └────────────┘   └──────────────┘   └────┬─────┘
//!                                                            │
//!                                          ┌─────────────────┘
//!                                          ▼
//!                                    ┌───────────┐
//!                                    │  Session  │◀── terminal chat
//!                                    └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! docchat ingest --folder books      # extract text, write .txt artifacts
//! docchat chat --folder books        # build the index and chat
//! docchat chat --owner octo --repo library --branch main
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | EPUB/PDF/DOCX/PPTX/TXT text extraction |
//! | [`connector_fs`] | Local folder listing |
//! | [`connector_github`] | GitHub tree listing and download |
//! | [`ingest`] | Extraction driver with `.txt` artifact cache |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | In-memory vector index |
//! | [`llm`] | Chat-completion providers |
//! | [`query`] | Retrieval + prompt + completion |
//! | [`session`] | Session state and event dispatch |
//! | [`chat`] | Terminal chat surface |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod connector_github;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod models;
pub mod progress;
pub mod query;
pub mod retry;
pub mod session;
