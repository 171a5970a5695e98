//! Document ingestion: storing uploads and listing the data directory.
//!
//! Uploads are written to `data_dir/.staging/<uuid>` first and then renamed
//! onto their final name. The rename is atomic on the same filesystem, so a
//! concurrent reader (an index rebuild, a listing) sees either the old file
//! or the complete new one, never a truncated write.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::DocumentInfo;
use crate::reader::is_hidden;

const STAGING_DIR: &str = ".staging";

/// Reduce a client-supplied file name to a safe final path component.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if name.is_empty() || name == "." || name == ".." || name.starts_with('.') {
        return Err(RagError::InvalidFilename(raw.to_string()));
    }
    Ok(name.to_string())
}

/// Store `bytes` as `data_dir/<filename>`, replacing any existing file.
///
/// Returns the final path. No rebuild happens here; callers follow up with
/// [`IndexStore::rebuild`](crate::store::IndexStore::rebuild).
pub async fn ingest(data_dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let name = sanitize_filename(filename)?;
    let staging = data_dir.join(STAGING_DIR);
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(|e| RagError::ingest(&staging, e))?;

    let tmp_path = staging.join(Uuid::new_v4().to_string());
    let final_path = data_dir.join(&name);

    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(RagError::ingest(&final_path, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(RagError::ingest(&final_path, e));
    }

    tracing::info!(file = %name, bytes = bytes.len(), "document stored");
    Ok(final_path)
}

/// Regular, non-hidden files directly under `data_dir`, sorted by name.
pub fn list_documents(data_dir: &Path) -> Result<Vec<DocumentInfo>> {
    std::fs::create_dir_all(data_dir).map_err(|e| RagError::io(data_dir, e))?;

    let mut docs = Vec::new();
    let entries = std::fs::read_dir(data_dir).map_err(|e| RagError::io(data_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RagError::io(data_dir, e))?;
        if is_hidden(&entry.file_name()) {
            continue;
        }
        let meta = entry.metadata().map_err(|e| RagError::io(entry.path(), e))?;
        if !meta.is_file() {
            continue;
        }

        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        docs.push(DocumentInfo {
            name: entry.file_name().to_string_lossy().to_string(),
            size: meta.len(),
            last_modified,
        });
    }

    docs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(docs)
}
