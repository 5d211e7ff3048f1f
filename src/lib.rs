//! # RAG Chat
//!
//! Retrieval-augmented chatbot over a document collection.
//!
//! Documents (a local directory or a list of web pages) are split into
//! chunks, tagged with metadata, embedded, and persisted in a SQLite vector
//! store. Questions are answered by retrieving the nearest chunks and
//! handing them to a language model, either as a complete answer or as an
//! ordered fragment stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  Loader  │──▶│ Splitter │──▶│ Embedder │──▶│  SQLite  │
//! │ dir/web  │   │ + tags   │   │  (HTTP)  │   │  vectors │
//! └──────────┘   └──────────┘   └──────────┘   └────┬─────┘
//!                                                   │
//!                             ┌─────────────────────┤
//!                             ▼                     ▼
//!                       ┌───────────┐         ┌───────────┐
//!                       │ Responder │──LLM──▶ │ CLI / SSE │
//!                       └───────────┘         └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragchat ingest                 # load or build the index
//! ragchat search "for loops" --filter semester=1st
//! ragchat ask "What is a loop?" --stream
//! ragchat serve                  # POST /api/chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`loader`] | Directory and web page loading |
//! | [`embedding`] | Remote embedding providers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Persistent vector store |
//! | [`ingest`] | Build/load decision and ingestion pipeline |
//! | [`llm`] | Language model client and stream decoding |
//! | [`responder`] | Retrieval-augmented answers |
//! | [`context`] | Shared application context |
//! | [`search`] | `ragchat search` |
//! | [`ask`] | `ragchat ask` and `ragchat chat` |
//! | [`inspect`] | `ragchat inspect` |
//! | [`server`] | HTTP chat server |
//!
//! Document, chunk, filter, prompt and stream types live in
//! [`rag_chat_core`].

pub mod ask;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod inspect;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod responder;
pub mod search;
pub mod server;
pub mod sqlite_store;
