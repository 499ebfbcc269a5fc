use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent.
///
/// `files` is the metadata store; `vectors` is owned entirely by the vector
/// store adapter and is never read by other modules.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            stored_path TEXT NOT NULL,
            checksum TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL,
            department TEXT,
            year TEXT,
            file_type TEXT NOT NULL,
            text_snippet TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            chunk_id TEXT PRIMARY KEY,
            document_hash TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            filename TEXT NOT NULL,
            category TEXT NOT NULL,
            source_path TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_document_hash ON vectors(document_hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_stored_path ON files(stored_path)")
        .execute(pool)
        .await?;

    Ok(())
}
