use std::path::PathBuf;
use thiserror::Error;

/// Engine-level error taxonomy.
///
/// Per-file problems during indexing and per-result problems during search
/// are recovered locally (skip + log) and never surface through this type;
/// what does surface here are whole-call failures the caller must see.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown index '{0}'. Run `cocosearch index` first.")]
    UnknownIndex(String),

    #[error("invalid index name '{0}': use lowercase letters, digits and underscores (max 48 chars)")]
    InvalidIndexName(String),

    #[error("source file unreadable: {path}: {source}")]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("embedding service unavailable after {attempts} attempts: {message}")]
    EmbedderUnavailable { attempts: u32, message: String },

    #[error("embedding dimension mismatch: index expects {expected}, embedder returned {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("store error: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("schema mismatch on index '{index}': {detail}. Re-index to migrate.")]
    SchemaMismatch { index: String, detail: String },

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("symbol filtering requires symbol columns; re-index '{0}' to enable symbol filtering")]
    MissingSymbolColumns(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid language handler '{id}': {detail}")]
    InvalidHandler { id: String, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
