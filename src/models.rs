//! Core data models used throughout docsift.
//!
//! These types represent the file records, chunks, and retrieval results that
//! flow through the ingestion and answer pipeline. Components exchange these
//! named structures, never positional tuples.

use std::path::PathBuf;

/// One row per ingested source document, keyed by content checksum.
///
/// `checksum` is unique: a second file with identical content is a duplicate,
/// never a second row. The record is removed when the backing file at
/// `stored_path` is confirmed absent during reconciliation.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub stored_path: String,
    pub checksum: String,
    pub category: String,
    pub department: Option<String>,
    pub year: Option<String>,
    pub file_type: String,
    pub text_snippet: String,
    pub created_at: i64,
}

/// A retrievable span of a document's extracted text.
///
/// `chunk_id` is deterministic (`"{document_hash}_{chunk_index}"`), so
/// re-ingesting the same content upserts the same entries and deletion can be
/// keyed on `document_hash` alone. Provenance fields are denormalized so that
/// retrieval results are self-describing without a join.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_hash: String,
    pub text: String,
    pub chunk_index: i64,
    pub filename: String,
    pub category: String,
    pub source_path: String,
}

/// A chunk returned from a similarity query, with its ranking scores.
///
/// `distance` is the index's native cosine distance in `[0, 2]`;
/// `similarity = 1 − distance/2` is always in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub filename: String,
    pub category: String,
    pub source_path: String,
    pub similarity: f64,
    pub distance: f64,
}

/// Per-source excerpt attached to an answer for display.
#[derive(Debug, Clone)]
pub struct SourceSnippet {
    pub filename: String,
    pub category: String,
    pub text: String,
    pub relevance_pct: u8,
}

/// The result of answering a query against the index.
#[derive(Debug, Clone)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: u8,
    pub snippets: Vec<SourceSnippet>,
}

/// A single spell correction applied to a query word.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
    pub confidence: f64,
}

/// Outcome of processing one observed file.
///
/// `Duplicate` is a recognized success, not an error: the file content is
/// already indexed under another record.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Ingested {
        record_id: String,
        category: String,
        stored_path: PathBuf,
        chunks: usize,
    },
    Duplicate {
        existing_id: String,
    },
    Skipped {
        reason: String,
    },
}
