//! Typed errors for each layer of the agent.
//!
//! Collaborator calls (LLM, embeddings, vector store, web search) fail with
//! [`TransportError`]. Higher layers wrap it in their own enum so callers can
//! decide whether a failure is fatal, degrades to a fallback, or becomes an
//! error-flagged tool result.

use std::path::PathBuf;

use thiserror::Error;

/// An external call failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{service} request failed: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("{service} call timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("{service} is not configured: {message}")]
    NotConfigured {
        service: &'static str,
        message: String,
    },
}

impl TransportError {
    pub fn network(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Network {
            service,
            message: err.to_string(),
        }
    }

    pub fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    /// Whether a retry has a chance of succeeding (rate limits, 5xx, network).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse { .. } | Self::NotConfigured { .. } => false,
        }
    }
}

/// An embedding vector failed validation.
#[derive(Debug, Error, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding vector is empty")]
    Empty,
    #[error("embedding contains a non-finite value at index {index}")]
    NonFinite { index: usize },
}

/// Vector-store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("embedding has {actual} dimensions but the collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("snippet {id} has no embedding")]
    MissingEmbedding { id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to prepare store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised while executing a tool. All of them are reported back to
/// the model as error-flagged results rather than aborting the turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Syntax-aware extraction failures. The indexer records these per file and
/// keeps walking.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to load grammar: {0}")]
    Language(String),

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("source has syntax errors")]
    Syntax,
}

/// Errors that abort an indexing run.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("workspace root {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("invalid exclude pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("embedding batch {start}..{end} failed: {source}")]
    Embedding {
        start: usize,
        end: usize,
        #[source]
        source: TransportError,
    },

    #[error("embedding batch {start}..{end} returned {actual} vectors for {expected} snippets")]
    CountMismatch {
        start: usize,
        end: usize,
        expected: usize,
        actual: usize,
    },

    #[error("upserting batch {start}..{end} failed: {source}")]
    Upsert {
        start: usize,
        end: usize,
        #[source]
        source: StoreError,
    },

    #[error("indexing was cancelled")]
    Cancelled,
}

/// Errors that end the interactive session.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM inference failed: {0}")]
    Llm(#[from] TransportError),

    #[error("failed to read user input: {0}")]
    Input(#[from] std::io::Error),

    #[error("interrupted")]
    Cancelled,
}
