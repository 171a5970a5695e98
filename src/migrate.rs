use sqlx::SqlitePool;

use crate::error::Result;

/// Create the index tables if they do not exist. Idempotent.
///
/// Each rebuild writes one row to `generations` and its nodes to `nodes`;
/// only the latest generation is kept.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generations (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            document_count INTEGER NOT NULL,
            node_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            generation_id TEXT NOT NULL,
            node_index INTEGER NOT NULL,
            file_name TEXT NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            vector BLOB,
            FOREIGN KEY (generation_id) REFERENCES generations(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_generation_id ON nodes(generation_id)")
        .execute(pool)
        .await?;

    Ok(())
}
