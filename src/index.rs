//! The immutable retrieval index.
//!
//! [`build_index`] runs the whole pipeline: read the data directory, chunk,
//! embed (when a provider is configured), persist a new generation to
//! SQLite, and return a [`VectorIndex`]. A built index is never mutated;
//! rebuilds produce a new one which the [`IndexStore`](crate::store::IndexStore)
//! swaps in.
//!
//! # Retrieval
//!
//! With embeddings enabled, nodes are ranked by cosine similarity to the
//! query embedding. Otherwise each node scores the fraction of distinct
//! query terms it contains, and nodes sharing no term are dropped. Results
//! are sorted by descending score (ties keep node order) and truncated to
//! `top_k`.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::chunk::chunk_document;
use crate::config::{Config, EmbeddingConfig};
use crate::db;
use crate::embedding::{self, blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Node, SourceNode};
use crate::reader::load_documents;

#[derive(Debug)]
pub struct VectorIndex {
    pub generation: String,
    pub built_at: DateTime<Utc>,
    pub document_count: usize,
    pub nodes: Vec<Node>,
}

impl VectorIndex {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rank nodes against `query` and return at most `top_k` of them.
    pub async fn retrieve(
        &self,
        embed_config: &EmbeddingConfig,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SourceNode>> {
        if self.nodes.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let has_vectors = self.nodes.iter().any(|n| n.vector.is_some());
        let mut scored: Vec<(f64, &Node)> = if embed_config.is_enabled() && has_vectors {
            let provider = embedding::create_provider(embed_config)
                .map_err(|e| RagError::Query(format!("{:#}", e)))?;
            let query_vec = embedding::embed_query(embed_config, query)
                .await
                .map_err(|e| RagError::Query(format!("embedding query failed: {:#}", e)))?;
            check_dims(provider.as_ref(), &query_vec).map_err(RagError::Query)?;
            self.nodes
                .iter()
                .filter_map(|n| {
                    n.vector
                        .as_ref()
                        .map(|v| (cosine_similarity(&query_vec, v) as f64, n))
                })
                .collect()
        } else {
            keyword_scores(&self.nodes, query)
        };

        // Stable sort keeps node order for equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, node)| SourceNode {
                node: node.clone(),
                score: Some(score),
            })
            .collect())
    }
}

fn keyword_scores<'a>(nodes: &'a [Node], query: &str) -> Vec<(f64, &'a Node)> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return Vec::new();
    }

    nodes
        .iter()
        .filter_map(|node| {
            let node_terms = tokenize(&node.text);
            let hits = terms.iter().filter(|t| node_terms.contains(*t)).count();
            if hits == 0 {
                None
            } else {
                Some((hits as f64 / terms.len() as f64, node))
            }
        })
        .collect()
}

/// Reject vectors whose width differs from the configured `embedding.dims`;
/// cosine similarity between mismatched vectors is meaningless.
fn check_dims(provider: &dyn EmbeddingProvider, vector: &[f32]) -> std::result::Result<(), String> {
    if vector.len() != provider.dims() {
        return Err(format!(
            "embedding model '{}' returned {} dimensions, expected {}",
            provider.model_name(),
            vector.len(),
            provider.dims()
        ));
    }
    Ok(())
}

/// Lowercased alphanumeric terms.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Build a fresh index from `storage.data_dir` and persist it as the latest
/// generation.
///
/// An empty data directory produces an empty, queryable index. Failure to
/// reach the database or the embedding provider is an
/// [`RagError::IndexInit`].
pub async fn build_index(config: &Config) -> Result<VectorIndex> {
    let started = std::time::Instant::now();
    let docs = load_documents(&config.storage.data_dir)?;

    let mut nodes: Vec<Node> = docs
        .iter()
        .flat_map(|doc| {
            chunk_document(
                doc,
                config.chunking.max_tokens,
                config.chunking.overlap_tokens,
            )
        })
        .collect();

    let provider = embedding::create_provider(&config.embedding)
        .map_err(|e| RagError::IndexInit(format!("{:#}", e)))?;
    if config.embedding.is_enabled() && !nodes.is_empty() {
        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
        let vectors = embedding::embed_texts(&config.embedding, &texts)
            .await
            .map_err(|e| RagError::IndexInit(format!("embedding failed: {:#}", e)))?;
        for (node, vector) in nodes.iter_mut().zip(vectors) {
            check_dims(provider.as_ref(), &vector).map_err(RagError::IndexInit)?;
            node.vector = Some(vector);
        }
    }

    let index = VectorIndex {
        generation: Uuid::new_v4().to_string(),
        built_at: Utc::now(),
        document_count: docs.len(),
        nodes,
    };

    persist(config, &index).await?;

    tracing::info!(
        generation = %index.generation,
        embedder = provider.model_name(),
        documents = index.document_count,
        nodes = index.nodes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index built"
    );

    Ok(index)
}

/// Write `index` as a new generation and drop all older ones, atomically.
async fn persist(config: &Config, index: &VectorIndex) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO generations (id, created_at, document_count, node_count) VALUES (?, ?, ?, ?)",
    )
    .bind(&index.generation)
    .bind(index.built_at.timestamp())
    .bind(index.document_count as i64)
    .bind(index.nodes.len() as i64)
    .execute(&mut *tx)
    .await?;

    for node in &index.nodes {
        let metadata_json = serde_json::to_string(&node.metadata)?;
        let blob = node.vector.as_deref().map(vec_to_blob);
        sqlx::query(
            r#"
            INSERT INTO nodes (id, generation_id, node_index, file_name, text, hash, metadata_json, vector)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(&index.generation)
        .bind(node.node_index)
        .bind(&node.file_name)
        .bind(&node.text)
        .bind(&node.hash)
        .bind(&metadata_json)
        .bind(blob)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM nodes WHERE generation_id != ?")
        .bind(&index.generation)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM generations WHERE id != ?")
        .bind(&index.generation)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    pool.close().await;
    Ok(())
}

/// Load the most recently persisted generation, if any.
pub async fn load_latest(config: &Config) -> Result<Option<VectorIndex>> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let row: Option<(String, i64, i64)> = sqlx::query_as(
        "SELECT id, created_at, document_count FROM generations ORDER BY created_at DESC LIMIT 1",
    )
    .fetch_optional(&pool)
    .await?;

    let Some((generation, created_at, document_count)) = row else {
        pool.close().await;
        return Ok(None);
    };

    let rows: Vec<(String, i64, String, String, String, String, Option<Vec<u8>>)> =
        sqlx::query_as(
            r#"
            SELECT id, node_index, file_name, text, hash, metadata_json, vector
            FROM nodes
            WHERE generation_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(&generation)
        .fetch_all(&pool)
        .await?;
    pool.close().await;

    let mut nodes = Vec::with_capacity(rows.len());
    for (id, node_index, file_name, text, hash, metadata_json, vector) in rows {
        nodes.push(Node {
            id,
            file_name,
            node_index,
            text,
            hash,
            metadata: serde_json::from_str(&metadata_json)?,
            vector: vector.as_deref().map(blob_to_vec),
        });
    }

    Ok(Some(VectorIndex {
        generation,
        built_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
        document_count: document_count as usize,
        nodes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EmbedStub;
    use serde_json::Map;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config::minimal();
        config.storage.data_dir = tmp.path().join("data");
        config.storage.index_path = tmp.path().join("index/ragops.sqlite");
        config
    }

    fn node(index: i64, text: &str) -> Node {
        Node {
            id: format!("n{}", index),
            file_name: "doc.txt".to_string(),
            node_index: index,
            text: text.to_string(),
            hash: String::new(),
            metadata: Map::new(),
            vector: None,
        }
    }

    fn index_of(nodes: Vec<Node>) -> VectorIndex {
        VectorIndex {
            generation: "g".to_string(),
            built_at: Utc::now(),
            document_count: 1,
            nodes,
        }
    }

    #[tokio::test]
    async fn empty_data_dir_builds_empty_index() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let index = build_index(&config).await.unwrap();
        assert!(index.is_empty());
        assert_eq!(index.document_count, 0);

        let hits = index
            .retrieve(&config.embedding, "anything", 2)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn rebuild_keeps_only_latest_generation() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        std::fs::create_dir_all(&config.storage.data_dir).unwrap();
        std::fs::write(config.storage.data_dir.join("a.txt"), "The quick brown fox.").unwrap();

        build_index(&config).await.unwrap();
        let second = build_index(&config).await.unwrap();

        let loaded = load_latest(&config).await.unwrap().unwrap();
        assert_eq!(loaded.generation, second.generation);
        assert_eq!(loaded.nodes.len(), 1);
        assert_eq!(loaded.nodes[0].metadata["file_name"], "a.txt");

        let pool = db::connect(&config).await.unwrap();
        let generations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(generations, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn keyword_retrieval_ranks_by_term_overlap() {
        let index = index_of(vec![
            node(0, "Bananas are yellow."),
            node(1, "The deploy runbook covers rollback steps."),
            node(2, "Rollback is manual."),
        ]);
        let hits = index
            .retrieve(&EmbeddingConfig::default(), "deploy rollback", 5)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.node_index, 1);
        assert_eq!(hits[0].score, Some(1.0));
        assert_eq!(hits[1].node.node_index, 2);
        assert_eq!(hits[1].score, Some(0.5));
    }

    #[tokio::test]
    async fn retrieval_truncates_to_top_k_and_keeps_ties_in_order() {
        let index = index_of(vec![
            node(0, "alpha one"),
            node(1, "alpha two"),
            node(2, "alpha three"),
        ]);
        let hits = index
            .retrieve(&EmbeddingConfig::default(), "ALPHA", 2)
            .await
            .unwrap();
        let order: Vec<i64> = hits.iter().map(|h| h.node.node_index).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn tokenize_lowercases_and_dedups() {
        let terms = tokenize("Rust, rust! RUST-lang");
        assert_eq!(terms.len(), 2);
        assert!(terms.contains("rust"));
        assert!(terms.contains("lang"));
    }

    #[tokio::test]
    async fn embedded_build_ranks_by_cosine() {
        let tmp = TempDir::new().unwrap();
        let stub = EmbedStub::start(3, false).await;
        let mut config = test_config(&tmp);
        config.embedding = stub.embedding_config(3);
        std::fs::create_dir_all(&config.storage.data_dir).unwrap();
        std::fs::write(config.storage.data_dir.join("a.txt"), "Vectors everywhere.").unwrap();

        let index = build_index(&config).await.unwrap();
        assert_eq!(index.nodes[0].vector.as_deref(), Some(&[1.0f32, 0.0, 0.0][..]));

        let hits = index
            .retrieve(&config.embedding, "unrelated words", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_the_build() {
        let tmp = TempDir::new().unwrap();
        let stub = EmbedStub::start(3, false).await;
        let mut config = test_config(&tmp);
        config.embedding = stub.embedding_config(2);
        std::fs::create_dir_all(&config.storage.data_dir).unwrap();
        std::fs::write(config.storage.data_dir.join("a.txt"), "Vectors everywhere.").unwrap();

        let err = build_index(&config).await.unwrap_err();
        match err {
            RagError::IndexInit(msg) => assert!(msg.contains("returned 3 dimensions, expected 2"), "{}", msg),
            other => panic!("unexpected error: {other}"),
        }
        assert!(load_latest(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_query_error() {
        let stub = EmbedStub::start(3, false).await;
        let mut indexed = node(0, "text");
        indexed.vector = Some(vec![1.0, 0.0]);
        let index = index_of(vec![indexed]);

        let err = index
            .retrieve(&stub.embedding_config(2), "text", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Query(_)));
    }
}
