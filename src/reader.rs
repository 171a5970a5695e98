//! Flat directory reader for the data directory.
//!
//! Every regular, non-hidden file directly under `data_dir` becomes one
//! [`SourceDocument`]. Subdirectories are not descended into. Files whose
//! text cannot be extracted are logged and skipped so a single bad upload
//! never blocks an index rebuild.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{RagError, Result};
use crate::extract::{content_type_for, extract_text};
use crate::models::SourceDocument;

/// Load every readable document in `data_dir`, sorted by file name.
///
/// A missing directory is created; an empty one yields an empty vector.
pub fn load_documents(data_dir: &Path) -> Result<Vec<SourceDocument>> {
    std::fs::create_dir_all(data_dir).map_err(|e| RagError::io(data_dir, e))?;

    let mut docs = Vec::new();

    let walker = WalkDir::new(data_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(data_dir).to_path_buf();
            RagError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() || is_hidden(entry.file_name()) {
            continue;
        }

        match read_document(entry.path()) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable file"),
        }
    }

    Ok(docs)
}

/// Names starting with `.` are never indexed or listed (this covers the
/// upload staging directory too).
pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn read_document(path: &Path) -> anyhow::Result<Option<SourceDocument>> {
    let meta = std::fs::metadata(path)?;
    let bytes = std::fs::read(path)?;
    let content_type = content_type_for(path);
    let text = extract_text(&bytes, content_type)?;

    let name = match path.file_name() {
        Some(n) => n.to_string_lossy().to_string(),
        None => return Ok(None),
    };

    let mut metadata = Map::new();
    metadata.insert(
        "file_path".to_string(),
        json!(path.to_string_lossy().to_string()),
    );
    metadata.insert("file_name".to_string(), json!(name));
    metadata.insert("file_type".to_string(), json!(content_type));
    metadata.insert("file_size".to_string(), json!(meta.len()));
    metadata.insert(
        "creation_date".to_string(),
        format_date(meta.created().ok()),
    );
    metadata.insert(
        "last_modified_date".to_string(),
        format_date(meta.modified().ok()),
    );

    Ok(Some(SourceDocument {
        name,
        text,
        metadata,
    }))
}

fn format_date(time: Option<SystemTime>) -> Value {
    match time {
        Some(t) => {
            let dt: DateTime<Utc> = t.into();
            json!(dt.format("%Y-%m-%d").to_string())
        }
        None => Value::Null,
    }
}
