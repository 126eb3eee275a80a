//! Retrieval + completion.
//!
//! A question is embedded, the `top_k` nearest chunks are pulled from the
//! [`VectorIndex`], and the chunks plus the question are sent to the
//! completion model as a single context-grounded prompt.

use anyhow::{Context, Result};

use crate::embedding::{embed_query, Embedder};
use crate::index::VectorIndex;
use crate::llm::CompletionModel;
use crate::models::{ChatMessage, RetrievedChunk};

const SYSTEM_PROMPT: &str = "You are an expert Q&A system that is trusted around the world.\n\
Always answer the query using the provided context information, and not prior knowledge.\n\
Some rules to follow:\n\
1. Never directly reference the given context in your answer.\n\
2. Avoid statements like 'Based on the context, ...' or 'The context information ...' or anything along those lines.";

/// A retrieved chunk as shown under an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub file_name: String,
    pub chunk_index: i64,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Citation>,
}

pub struct QueryEngine {
    embedder: Box<dyn Embedder>,
    llm: Box<dyn CompletionModel>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(embedder: Box<dyn Embedder>, llm: Box<dyn CompletionModel>, top_k: usize) -> Self {
        Self {
            embedder,
            llm,
            top_k: top_k.max(1),
        }
    }

    /// Embedder shared with the index builder so queries and chunks live in
    /// the same vector space.
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn llm_model(&self) -> &str {
        self.llm.model_name()
    }

    /// Answer `question` from `index`. The question is passed verbatim.
    pub async fn ask(&self, index: &VectorIndex, question: &str) -> Result<Answer> {
        let query_vec = embed_query(self.embedder.as_ref(), question)
            .await
            .context("Failed to embed question")?;
        let hits = index.search(&query_vec, self.top_k);
        tracing::debug!(hits = hits.len(), "retrieved context");

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(&hits, question)),
        ];
        let text = self
            .llm
            .complete(&messages)
            .await
            .with_context(|| format!("Completion failed ({})", self.llm.model_name()))?;

        Ok(Answer {
            text: text.trim().to_string(),
            sources: hits
                .iter()
                .map(|h| Citation {
                    file_name: h.chunk.source_name(),
                    chunk_index: h.chunk.chunk_index,
                    score: h.score,
                })
                .collect(),
        })
    }
}

/// Context block followed by the question.
pub fn build_prompt(hits: &[RetrievedChunk], question: &str) -> String {
    let context = hits
        .iter()
        .map(|h| format!("file_name: {}\n\n{}", h.chunk.source_name(), h.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context information is below.\n\
---------------------\n\
{}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {}\n\
Answer: ",
        context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use std::path::PathBuf;

    fn hit(name: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                source: PathBuf::from("books").join(name),
                chunk_index: 0,
                text: text.to_string(),
                hash: String::new(),
            },
            score: 0.5,
        }
    }

    #[test]
    fn prompt_orders_context_before_query() {
        let prompt = build_prompt(
            &[hit("a.txt", "first fact"), hit("b.txt", "second fact")],
            "What is it?",
        );
        let first = prompt.find("first fact").unwrap();
        let second = prompt.find("second fact").unwrap();
        let query = prompt.find("Query: What is it?").unwrap();
        assert!(first < second && second < query);
        assert!(prompt.contains("file_name: a.txt"));
        assert!(prompt.ends_with("Answer: "));
    }

    #[test]
    fn prompt_without_hits_still_asks() {
        let prompt = build_prompt(&[], "¿Qué es esto?");
        assert!(prompt.contains("Query: ¿Qué es esto?"));
    }
}
