//! Synthetic QA pair ("golden") generation from documents.
//!
//! Each document is extracted and chunked like the index does, then the
//! LLM is asked for a fixed number of question/answer pairs per chunk,
//! answerable from that chunk alone.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::split_text;
use crate::config::{ChunkingConfig, Config};
use crate::error::{RagError, Result};
use crate::extract::{content_type_for, extract_text};
use crate::llm::{extract_json, LlmClient};

const GENERATOR_EXTENSIONS: &[&str] = &["txt", "pdf", "md"];

const SYSTEM_PROMPT: &str = "You write evaluation data for question answering systems. \
Reply with JSON only.";

/// One generated test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Golden {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub source_file: String,
}

#[derive(Debug, Deserialize)]
struct QaPair {
    #[serde(alias = "query")]
    question: String,
    #[serde(alias = "expected_output")]
    answer: String,
}

/// Files under `dir` (recursively) with a `.txt`, `.pdf` or `.md` extension.
pub fn collect_document_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "folder not found"),
        ));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| RagError::io(dir, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if GENERATOR_EXTENSIONS.contains(&ext.as_str()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

pub struct QaGenerator {
    llm: LlmClient,
    chunking: ChunkingConfig,
    questions_per_chunk: usize,
}

impl QaGenerator {
    pub fn new(llm: LlmClient, chunking: ChunkingConfig, questions_per_chunk: usize) -> Self {
        Self {
            llm,
            chunking,
            questions_per_chunk: questions_per_chunk.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            LlmClient::new(config.llm.clone())?,
            config.chunking.clone(),
            config.eval.questions_per_chunk,
        ))
    }

    /// Generate goldens for every document in `paths`.
    ///
    /// Unreadable documents and unparseable replies are logged and skipped;
    /// an LLM transport or API error aborts the run.
    pub async fn generate(&self, paths: &[PathBuf]) -> Result<Vec<Golden>> {
        let mut goldens = Vec::new();

        for path in paths {
            let text = match read_text(path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping document");
                    continue;
                }
            };
            let source_file = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let chunks = split_text(
                &text,
                self.chunking.max_tokens,
                self.chunking.overlap_tokens,
            );
            tracing::info!(file = %source_file, chunks = chunks.len(), "generating QA pairs");

            for chunk in chunks {
                let reply = self
                    .llm
                    .complete(Some(SYSTEM_PROMPT), &self.prompt(&chunk))
                    .await?;
                match parse_qa_pairs(&reply) {
                    Ok(pairs) => {
                        goldens.extend(pairs.into_iter().take(self.questions_per_chunk).map(
                            |pair| Golden {
                                input: pair.question,
                                expected_output: pair.answer,
                                context: vec![chunk.clone()],
                                source_file: source_file.clone(),
                            },
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(file = %source_file, error = %e, "unparseable QA reply, skipping chunk");
                    }
                }
            }
        }

        Ok(goldens)
    }

    fn prompt(&self, chunk: &str) -> String {
        format!(
            r#"Write {n} question and answer pairs about the text below.
Each question must be answerable using only this text, and each answer must be a
complete, factual answer taken from it.

Text:
"""
{chunk}
"""

Respond with a JSON array:
[{{"question": "...", "answer": "..."}}]"#,
            n = self.questions_per_chunk,
            chunk = chunk
        )
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(extract_text(&bytes, content_type_for(path))?)
}

fn parse_qa_pairs(reply: &str) -> Result<Vec<QaPair>> {
    let pairs: Vec<QaPair> = serde_json::from_str(extract_json(reply))
        .map_err(|e| RagError::Llm(format!("invalid QA pairs: {}", e)))?;
    Ok(pairs
        .into_iter()
        .filter(|p| !p.question.trim().is_empty() && !p.answer.trim().is_empty())
        .collect())
}

/// Write `goldens` as pretty JSON to `path`, plus a sibling
/// `<stem>_questions.txt` with one question per line. Returns the latter.
pub fn save_goldens(path: &Path, goldens: &[Golden]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }
    }

    let json = serde_json::to_string_pretty(goldens)?;
    std::fs::write(path, json).map_err(|e| RagError::io(path, e))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "goldens".to_string());
    let questions_path = path.with_file_name(format!("{}_questions.txt", stem));
    let mut questions = String::new();
    for golden in goldens {
        questions.push_str(&golden.input.replace('\n', " "));
        questions.push('\n');
    }
    std::fs::write(&questions_path, questions).map_err(|e| RagError::io(&questions_path, e))?;

    Ok(questions_path)
}
