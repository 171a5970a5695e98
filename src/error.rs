//! Error taxonomy for the retrieval service and evaluation tooling.
//!
//! Every failure the HTTP layer can observe is a [`RagError`]; the server
//! renders all of them as `500 {"detail": "<message>"}`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`RagError`].
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    /// The index backend could not be opened, migrated, or populated.
    #[error("Error initializing index: {0}")]
    IndexInit(String),

    /// Writing an uploaded document failed.
    #[error("Failed to write '{path}': {source}")]
    Ingest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The uploaded file name cannot be stored under the data directory.
    #[error("Invalid file name: '{0}'")]
    InvalidFilename(String),

    /// A query arrived before any index was built.
    #[error("Index not initialized")]
    NoIndex,

    /// The retrieval endpoint could not be reached or returned an error.
    #[error("Error querying RAG endpoint: {0}")]
    UpstreamQuery(String),

    /// The query engine failed (embedding the query, synthesis).
    #[error("Query failed: {0}")]
    Query(String),

    /// LLM API error or unparseable LLM reply.
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn ingest(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Ingest {
            path: path.into(),
            source,
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::IndexInit(err.to_string())
    }
}
