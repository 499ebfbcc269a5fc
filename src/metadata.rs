//! Metadata store: the relational record of known files.
//!
//! One row per ingested document, with `checksum` as the unique
//! deduplication key. Inserting a record whose checksum already exists
//! returns the existing row's id instead of erroring — duplicate content is a
//! recognized outcome, not a failure.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::FileRecord;

/// Fields for a new row; the surrogate id is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub filename: String,
    pub stored_path: String,
    pub checksum: String,
    pub category: String,
    pub department: Option<String>,
    pub year: Option<String>,
    pub file_type: String,
    pub text_snippet: String,
}

/// Result of an insert attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertResult {
    Inserted(String),
    /// Unique-constraint hit on checksum: the id of the existing row.
    Existing(String),
}

pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &NewFileRecord) -> Result<InsertResult> {
        if let Some(existing) = self.find_by_checksum(&record.checksum).await? {
            return Ok(InsertResult::Existing(existing.id));
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO files (id, filename, stored_path, checksum, category, department, year, file_type, text_snippet, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(checksum) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&record.filename)
        .bind(&record.stored_path)
        .bind(&record.checksum)
        .bind(&record.category)
        .bind(&record.department)
        .bind(&record.year)
        .bind(&record.file_type)
        .bind(&record.text_snippet)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Raced with a concurrent insert of the same content.
            let existing = self
                .find_by_checksum(&record.checksum)
                .await?
                .ok_or_else(|| anyhow::anyhow!("checksum conflict but no row found"))?;
            return Ok(InsertResult::Existing(existing.id));
        }

        Ok(InsertResult::Inserted(id))
    }

    pub async fn find_by_checksum(&self, checksum: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE checksum = ?")
            .bind(checksum)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    pub async fn find_by_stored_path(&self, stored_path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE stored_path = ?")
            .bind(stored_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    pub async fn all(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT * FROM files ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn count_by_category(&self) -> Result<Vec<(String, u64)>> {
        let rows =
            sqlx::query("SELECT category, COUNT(*) AS n FROM files GROUP BY category ORDER BY n DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("category"), r.get::<i64, _>("n") as u64))
            .collect())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        stored_path: row.get("stored_path"),
        checksum: row.get("checksum"),
        category: row.get("category"),
        department: row.get("department"),
        year: row.get("year"),
        file_type: row.get("file_type"),
        text_snippet: row.get("text_snippet"),
        created_at: row.get("created_at"),
    }
}
