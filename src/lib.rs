//! # Code Agent
//!
//! A terminal coding assistant that edits files in a sandboxed workspace and
//! grounds its answers in a vector index of that workspace.
//!
//! The binary runs in one of two modes:
//!
//! - **chat** (default): a reason/act/observe loop. Each user message is
//!   augmented with retrieved code context, sent to the LLM with a tool
//!   catalog, and any requested tools are executed and fed back until the
//!   model answers in plain text.
//! - **index** (`--index`): walks the workspace, splits Go sources into
//!   per-declaration snippets and other text files into whole-file snippets,
//!   embeds them in batches and upserts them into the vector store.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌───────────────┐
//!   You: ───────▶ │     Agent     │ ───────▶ LlmProvider (Anthropic)
//!                 └──┬─────────┬──┘
//!          retrieve  │         │ tool calls
//!                    ▼         ▼
//!        ┌─────────────────┐ ┌──────────────────────────────┐
//!        │ContextRetriever │ │ ToolRegistry                 │
//!        └────────┬────────┘ │ fs · search_web · vector_*   │
//!                 │          └──────────────┬───────────────┘
//!                 ▼                         ▼
//!        EmbeddingProvider ─────▶ VectorStore ◀── FallbackStore (files)
//!                 ▲                         ▲
//!                 └──────── Indexer ────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | Reason/act/observe loop and console input |
//! | [`config`] | TOML configuration and environment secrets |
//! | [`db`] | SQLite connection pool |
//! | [`detect`] | Binary-file heuristic |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`error`] | Typed errors per layer |
//! | [`fallback`] | Flat-file store used when the vector store is down |
//! | [`http`] | Shared HTTP client and retry policy |
//! | [`index`] | Workspace indexing pipeline |
//! | [`llm`] | Conversation types and the Anthropic client |
//! | [`migrate`] | Schema for the SQLite vector store |
//! | [`models`] | Snippets and embeddings |
//! | [`parser`] | Tree-sitter Go declaration extraction |
//! | [`progress`] | Indexing progress on stderr |
//! | [`retrieval`] | Context retrieval under a character budget |
//! | [`sandbox`] | Workspace path confinement |
//! | [`tools`] | Tool catalog and dispatch |
//! | [`vector_store`] | Qdrant, SQLite and in-memory stores |
//! | [`web_search`] | Brave web search client |

pub mod agent;
pub mod config;
pub mod db;
pub mod detect;
pub mod embedding;
pub mod error;
pub mod fallback;
pub mod http;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod progress;
pub mod retrieval;
pub mod sandbox;
pub mod tools;
pub mod vector_store;
pub mod web_search;
