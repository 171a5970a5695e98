//! Query handling: retrieval, response synthesis and context shaping.
//!
//! A query runs against one snapshot of the live index from start to
//! finish. The raw [`QueryResult`] is then reshaped into the client-facing
//! [`ContextRecord`] list by [`shape_contexts`]:
//!
//! - `text_preview` is the first [`PREVIEW_CHARS`] characters of the node
//!   text, followed by `...` only when the text is longer than that.
//! - metadata entries with a `null` value are dropped.
//! - `file_name` falls back to `"Unknown"`.
//! - `score` is `null` only when the node has no finite score; a score of
//!   exactly `0.0` is reported as `0.0`.
//! - order is the retrieval order (descending score).

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::models::{ContextRecord, QueryResponse, QueryResult, SourceNode};
use crate::store::IndexStore;

pub const PREVIEW_CHARS: usize = 100;
const ELLIPSIS: &str = "...";
const UNKNOWN_FILE: &str = "Unknown";
const EMPTY_RESPONSE: &str = "Empty Response";

const QA_PROMPT: &str = "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query}\n\
Answer: ";

pub struct QueryEngine {
    config: Arc<Config>,
    llm: Option<LlmClient>,
}

impl QueryEngine {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let llm = if config.llm.is_remote() {
            Some(LlmClient::new(config.llm.clone())?)
        } else {
            None
        };
        Ok(Self { config, llm })
    }

    /// Retrieve the top nodes for `text` and synthesise a response.
    ///
    /// Fails with [`RagError::NoIndex`](crate::error::RagError::NoIndex)
    /// before the first index build.
    pub async fn query(&self, store: &IndexStore, text: &str) -> Result<QueryResult> {
        let index = store.current()?;
        let source_nodes = index
            .retrieve(&self.config.embedding, text, self.config.retrieval.top_k)
            .await?;

        let response = self.synthesize(text, &source_nodes).await?;
        tracing::debug!(
            generation = %index.generation,
            nodes = source_nodes.len(),
            "query answered"
        );

        Ok(QueryResult {
            response,
            source_nodes,
        })
    }

    async fn synthesize(&self, query: &str, nodes: &[SourceNode]) -> Result<String> {
        let Some(best) = nodes.first() else {
            return Ok(EMPTY_RESPONSE.to_string());
        };

        match &self.llm {
            Some(llm) => {
                let context = nodes
                    .iter()
                    .map(|n| n.node.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let prompt = QA_PROMPT
                    .replace("{context}", &context)
                    .replace("{query}", query);
                llm.complete(None, &prompt).await
            }
            None => Ok(best.node.text.clone()),
        }
    }

    /// [`query`](Self::query) followed by [`shape_contexts`].
    pub async fn answer(&self, store: &IndexStore, text: &str) -> Result<QueryResponse> {
        let result = self.query(store, text).await?;
        Ok(QueryResponse {
            contexts: shape_contexts(&result.source_nodes),
            response: result.response,
        })
    }
}

pub fn shape_contexts(nodes: &[SourceNode]) -> Vec<ContextRecord> {
    nodes.iter().map(shape_context).collect()
}

fn shape_context(source: &SourceNode) -> ContextRecord {
    let metadata: Map<String, Value> = source
        .node
        .metadata
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let file_name = metadata
        .get("file_name")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_FILE)
        .to_string();

    ContextRecord {
        file_name,
        score: source.score.filter(|s| s.is_finite()),
        text_preview: text_preview(&source.node.text),
        metadata,
    }
}

/// First [`PREVIEW_CHARS`] characters, plus `...` if anything was cut.
pub fn text_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::index::VectorIndex;
    use crate::models::Node;
    use crate::test_support::ChatStub;
    use chrono::Utc;
    use serde_json::json;

    fn source(text: &str, score: Option<f64>, metadata: Value) -> SourceNode {
        SourceNode {
            node: Node {
                id: "n".to_string(),
                file_name: "doc.txt".to_string(),
                node_index: 0,
                text: text.to_string(),
                hash: String::new(),
                metadata: metadata.as_object().cloned().unwrap_or_default(),
                vector: None,
            },
            score,
        }
    }

    #[test]
    fn short_text_is_verbatim() {
        let text = "x".repeat(100);
        assert_eq!(text_preview(&text), text);
        assert_eq!(text_preview(""), "");
    }

    #[test]
    fn long_text_is_cut_to_100_chars_plus_ellipsis() {
        let text = "y".repeat(101);
        let preview = text_preview(&text);
        assert_eq!(preview, format!("{}...", "y".repeat(100)));
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let text = "é".repeat(150);
        let preview = text_preview(&text);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn null_metadata_is_dropped() {
        let ctx = shape_contexts(&[source("t", Some(0.5), json!({"a": 1, "b": null}))]);
        assert_eq!(Value::Object(ctx[0].metadata.clone()), json!({"a": 1}));
    }

    #[test]
    fn missing_file_name_is_unknown() {
        let ctx = shape_contexts(&[source("t", None, json!({}))]);
        assert_eq!(ctx[0].file_name, "Unknown");
        assert_eq!(ctx[0].score, None);

        let ctx = shape_contexts(&[source("t", None, json!({"file_name": null}))]);
        assert_eq!(ctx[0].file_name, "Unknown");
    }

    #[test]
    fn zero_score_is_kept() {
        let ctx = shape_contexts(&[
            source("a", Some(0.0), json!({"file_name": "a.txt"})),
            source("b", Some(f64::NAN), json!({"file_name": "b.txt"})),
        ]);
        assert_eq!(ctx[0].score, Some(0.0));
        assert_eq!(ctx[0].file_name, "a.txt");
        assert_eq!(ctx[1].score, None);
    }

    #[test]
    fn order_is_preserved() {
        let ctx = shape_contexts(&[
            source("first", Some(0.9), json!({"file_name": "1"})),
            source("second", Some(0.4), json!({"file_name": "2"})),
        ]);
        let names: Vec<&str> = ctx.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn query_before_init_is_no_index() {
        let engine = QueryEngine::new(Arc::new(Config::minimal())).unwrap();
        let err = engine.query(&IndexStore::new(), "hi").await.unwrap_err();
        assert!(matches!(err, RagError::NoIndex));
    }

    fn store_with_guide() -> IndexStore {
        let store = IndexStore::new();
        let mut metadata = Map::new();
        metadata.insert("file_name".to_string(), json!("guide.md"));
        store.replace(VectorIndex {
            generation: "g".to_string(),
            built_at: Utc::now(),
            document_count: 1,
            nodes: vec![Node {
                id: "n0".to_string(),
                file_name: "guide.md".to_string(),
                node_index: 0,
                text: "Restart the worker with systemctl.".to_string(),
                hash: String::new(),
                metadata,
                vector: None,
            }],
        });
        store
    }

    #[tokio::test]
    async fn extractive_answer_uses_best_node() {
        let store = store_with_guide();
        let engine = QueryEngine::new(Arc::new(Config::minimal())).unwrap();
        let answer = engine.answer(&store, "how to restart worker").await.unwrap();
        assert_eq!(answer.response, "Restart the worker with systemctl.");
        assert_eq!(answer.contexts.len(), 1);
        assert_eq!(answer.contexts[0].file_name, "guide.md");

        let empty = engine.answer(&store, "unrelated").await.unwrap();
        assert_eq!(empty.response, "Empty Response");
        assert!(empty.contexts.is_empty());
    }

    #[tokio::test]
    async fn openai_synthesis_prompts_with_retrieved_context() {
        let stub = ChatStub::start(&["Run systemctl restart worker."]).await;
        let mut config = Config::minimal();
        config.llm = stub.llm_config();
        let engine = QueryEngine::new(Arc::new(config)).unwrap();
        let store = store_with_guide();

        let answer = engine.answer(&store, "how to restart worker").await.unwrap();
        assert_eq!(answer.response, "Run systemctl restart worker.");
        assert_eq!(answer.contexts[0].file_name, "guide.md");

        let prompts = stub.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Context information is below."));
        assert!(prompts[0].contains("Restart the worker with systemctl."));
        assert!(prompts[0].contains("Query: how to restart worker"));

        // No retrieved nodes means no model call.
        let empty = engine.answer(&store, "unrelated").await.unwrap();
        assert_eq!(empty.response, "Empty Response");
        assert_eq!(stub.prompts().len(), 1);
    }
}
