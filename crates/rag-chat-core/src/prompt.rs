//! Prompt rendering.

use crate::error::{RagError, Result};
use crate::models::ScoredChunk;

pub const DEFAULT_TEMPLATE: &str = "Answer the question based on the context below. \
If the question cannot be answered using the context provided, answer with \"I don't know\"\n\n\
Context: {context}\n\n\
Question: {question}\n\n\
Answer:";

/// Separator between retrieved chunk texts in `{context}`.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A template with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// The template must mention `{question}`; `{context}` is optional so
    /// operators can place retrieved text in the system prompt instead.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains("{question}") {
            return Err(RagError::invalid_request(
                "prompt template must contain {question}",
            ));
        }
        Ok(Self { template })
    }

    pub fn render(&self, chunks: &[ScoredChunk], question: &str) -> String {
        let context = chunks
            .iter()
            .map(|c| c.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        // Single pass so placeholder-like text inside chunks or the question
        // is never expanded.
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{question}") {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
