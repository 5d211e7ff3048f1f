//! # rag-chat core
//!
//! Runtime-agnostic logic shared by the `rag-chat` application: data models,
//! the fixed-window and markdown-header splitters, front-matter and path
//! tagging, the vector store trait with an in-memory implementation,
//! retrieval ranking, prompt rendering, chat message translation, and the
//! event framing used for streamed answers.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Network
//! providers and the SQLite-backed store live in the application crate.

pub mod chat;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod frontmatter;
pub mod markdown;
pub mod models;
pub mod prompt;
pub mod search;
pub mod splitter;
pub mod store;
pub mod stream;
pub mod tagging;

pub use error::{RagError, Result};
