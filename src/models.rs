//! Core data models used throughout ragops.
//!
//! These types represent the documents, nodes, and query results that flow
//! through the indexing and retrieval pipeline, plus the JSON shapes of the
//! HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A file read from the data directory, ready for chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// A chunk of a document plus its inherited metadata and optional vector.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub file_name: String,
    pub node_index: i64,
    pub text: String,
    pub hash: String,
    pub metadata: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
}

/// A node returned by retrieval, with its relevance score.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub node: Node,
    pub score: Option<f64>,
}

/// Raw output of the query engine, before shaping for clients.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub response: String,
    pub source_nodes: Vec<SourceNode>,
}

/// One entry of the `contexts` list returned by `GET /api/query`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextRecord {
    pub file_name: String,
    pub score: Option<f64>,
    pub text_preview: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Body of `GET /api/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    #[serde(default)]
    pub contexts: Vec<ContextRecord>,
}

/// A file in the data directory as reported by `GET /api/documents`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    pub name: String,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub last_modified: f64,
}
