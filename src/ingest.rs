//! Ingestion coordinator.
//!
//! Drives one file through the full pipeline: checksum, dedup, extraction,
//! classification, relocation into the sorted tree, the metadata record, and
//! finally chunking and indexing. The metadata row is written before the
//! vectors, so the only crash residue is a vector-less record, which
//! `reconcile` repairs by re-chunking from the stored file. The relocation
//! itself goes through a same-directory temp name and an atomic rename.
//!
//! Also owns the repair paths: `purge_path` for deletions, `reconcile` for
//! drift between the filesystem and the stores, and `rebuild_from` for
//! re-deriving the database from an existing sorted tree.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk;
use crate::classify::{detect_department, detect_year, Classifier};
use crate::config::Config;
use crate::extract;
use crate::llm::LlmClient;
use crate::metadata::{InsertResult, MetadataStore, NewFileRecord};
use crate::models::IngestOutcome;
use crate::store::VectorIndex;

const SNIPPET_CHARS: usize = 1000;

/// Filenames that are never documents.
const IGNORED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

pub struct Coordinator<'a> {
    config: &'a Config,
    metadata: &'a MetadataStore,
    index: &'a dyn VectorIndex,
    classifier: &'a Classifier,
    llm: &'a LlmClient,
}

/// Per-directory tally from a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub ingested: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// What reconciliation found and repaired.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub missing_files_purged: usize,
    pub reindexed: usize,
    pub orphan_vectors_removed: u64,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        config: &'a Config,
        metadata: &'a MetadataStore,
        index: &'a dyn VectorIndex,
        classifier: &'a Classifier,
        llm: &'a LlmClient,
    ) -> Self {
        Self {
            config,
            metadata,
            index,
            classifier,
            llm,
        }
    }

    /// Ingest a single file from wherever it currently sits.
    pub async fn process_one(&self, path: &Path) -> Result<IngestOutcome> {
        if !path.is_file() {
            return Ok(IngestOutcome::Skipped {
                reason: format!("not a regular file: {}", path.display()),
            });
        }
        let filename = file_name_of(path)?;
        if should_ignore(&filename) {
            return Ok(IngestOutcome::Skipped {
                reason: format!("ignored filename: {}", filename),
            });
        }

        let checksum = hash_file(path)?;

        if let Some(existing) = self.metadata.find_by_checksum(&checksum).await? {
            // Same content already ingested: drop the new copy.
            fs::remove_file(path)
                .with_context(|| format!("removing duplicate {}", path.display()))?;
            info!(
                file = filename.as_str(),
                existing = existing.filename.as_str(),
                "duplicate content, incoming copy removed"
            );
            return Ok(IngestOutcome::Duplicate {
                existing_id: existing.id,
            });
        }

        let text = extract::extract_text(path);
        let category = self.classifier.classify(self.llm, &text).await;

        let (department, year) = if self.config.sorting.use_department_year {
            (
                detect_department(&text, &filename),
                detect_year(&text, &filename),
            )
        } else {
            (None, None)
        };

        let target_dir = self.target_dir(&category, department.as_deref(), year.as_deref());
        let stored_path = relocate(path, &target_dir, &filename)?;
        let stored_name = file_name_of(&stored_path)?;

        let snippet: String = text.chars().take(SNIPPET_CHARS).collect();
        let record = NewFileRecord {
            filename: stored_name,
            stored_path: stored_path.to_string_lossy().to_string(),
            checksum: checksum.clone(),
            category: category.clone(),
            department,
            year,
            file_type: extract::file_type(&stored_path).to_string(),
            text_snippet: snippet,
        };

        // Metadata before vectors: a crash between the two writes leaves a
        // vector-less record, which reconciliation re-chunks from disk.
        let record_id = match self.metadata.insert(&record).await? {
            InsertResult::Inserted(record_id) => record_id,
            InsertResult::Existing(existing_id) => {
                // Lost a race after the checksum pre-check; undo the move.
                fs::remove_file(&stored_path).ok();
                return Ok(IngestOutcome::Duplicate { existing_id });
            }
        };

        let chunks = chunk::build_chunks(
            &checksum,
            &record.filename,
            &category,
            &record.stored_path,
            &text,
            self.config.chunking.size,
            self.config.chunking.overlap,
        );
        self.index.add(&chunks).await?;

        info!(
            file = record.filename.as_str(),
            category = category.as_str(),
            chunks = chunks.len(),
            "file ingested"
        );
        Ok(IngestOutcome::Ingested {
            record_id,
            category,
            stored_path,
            chunks: chunks.len(),
        })
    }

    /// Ingest everything in the incoming directory. A failure on one file is
    /// logged and counted; the rest of the batch still runs.
    pub async fn process_pending(&self) -> Result<BatchSummary> {
        let incoming = &self.config.paths.incoming;
        fs::create_dir_all(incoming)
            .with_context(|| format!("creating {}", incoming.display()))?;

        let mut summary = BatchSummary::default();
        for entry in WalkDir::new(incoming)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            match self.process_one(entry.path()).await {
                Ok(IngestOutcome::Ingested { .. }) => summary.ingested += 1,
                Ok(IngestOutcome::Duplicate { .. }) => summary.duplicates += 1,
                Ok(IngestOutcome::Skipped { reason }) => {
                    info!(reason = reason.as_str(), "file skipped");
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        file = %entry.path().display(),
                        error = %e,
                        "ingestion failed"
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Forget a file that disappeared from its stored location: remove its
    /// vectors and its metadata row. Unknown paths are a no-op.
    pub async fn purge_path(&self, stored_path: &Path) -> Result<bool> {
        let stored = stored_path.to_string_lossy();
        let Some(record) = self.metadata.find_by_stored_path(&stored).await? else {
            return Ok(false);
        };
        self.index.delete_by_source(&record.checksum).await?;
        self.metadata.delete(&record.id).await?;
        info!(file = record.filename.as_str(), "record purged");
        Ok(true)
    }

    /// Repair drift between the filesystem and the stores, both directions:
    /// records whose file vanished are purged, records with no indexed
    /// chunks are re-chunked from disk, and vectors without a backing record
    /// are dropped.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for record in self.metadata.all().await? {
            let path = PathBuf::from(&record.stored_path);
            if !path.is_file() {
                self.index.delete_by_source(&record.checksum).await?;
                self.metadata.delete(&record.id).await?;
                report.missing_files_purged += 1;
                continue;
            }
            if self.index.count_by_source(&record.checksum).await? == 0 {
                let text = extract::extract_text(&path);
                let chunks = chunk::build_chunks(
                    &record.checksum,
                    &record.filename,
                    &record.category,
                    &record.stored_path,
                    &text,
                    self.config.chunking.size,
                    self.config.chunking.overlap,
                );
                self.index.add(&chunks).await?;
                report.reindexed += 1;
            }
        }

        report.orphan_vectors_removed = self.remove_orphan_vectors().await?;

        info!(
            purged = report.missing_files_purged,
            reindexed = report.reindexed,
            orphans = report.orphan_vectors_removed,
            "reconciliation complete"
        );
        Ok(report)
    }

    async fn remove_orphan_vectors(&self) -> Result<u64> {
        let known: std::collections::HashSet<String> = self
            .metadata
            .all()
            .await?
            .into_iter()
            .map(|r| r.checksum)
            .collect();

        let mut removed = 0u64;
        for hash in self.index.source_hashes().await? {
            if !known.contains(&hash) {
                removed += self.index.delete_by_source(&hash).await?;
            }
        }
        Ok(removed)
    }

    /// Re-derive records and vectors from an already-sorted tree. The
    /// category is taken from the first path component under the sorted
    /// root, not re-classified. Files already known by checksum are left
    /// alone.
    pub async fn rebuild_from(&self, sorted: &Path) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();

        for entry in WalkDir::new(sorted)
            .min_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            match self.rebuild_one(sorted, path).await {
                Ok(true) => summary.ingested += 1,
                Ok(false) => summary.duplicates += 1,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "rebuild failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn rebuild_one(&self, sorted: &Path, path: &Path) -> Result<bool> {
        let filename = file_name_of(path)?;
        if should_ignore(&filename) {
            return Ok(false);
        }

        let relative = path.strip_prefix(sorted)?;
        let category = relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .context("file directly under sorted root")?
            .to_string();

        let checksum = hash_file(path)?;
        if self.metadata.find_by_checksum(&checksum).await?.is_some() {
            return Ok(false);
        }

        let text = extract::extract_text(path);
        let record = NewFileRecord {
            filename,
            stored_path: path.to_string_lossy().to_string(),
            checksum: checksum.clone(),
            category: category.clone(),
            department: None,
            year: None,
            file_type: extract::file_type(path).to_string(),
            text_snippet: text.chars().take(SNIPPET_CHARS).collect(),
        };
        self.metadata.insert(&record).await?;

        let chunks = chunk::build_chunks(
            &checksum,
            &record.filename,
            &category,
            &record.stored_path,
            &text,
            self.config.chunking.size,
            self.config.chunking.overlap,
        );
        self.index.add(&chunks).await?;
        Ok(true)
    }

    fn target_dir(&self, category: &str, department: Option<&str>, year: Option<&str>) -> PathBuf {
        let mut dir = self.config.paths.sorted.join(category);
        if let Some(dept) = department {
            dir.push(dept);
        }
        if let Some(year) = year {
            dir.push(year);
        }
        dir
    }
}

fn should_ignore(filename: &str) -> bool {
    IGNORED_NAMES.contains(&filename)
        || filename.starts_with('.')
        || filename.ends_with(".tmp")
        || filename.ends_with(".part")
        || filename.ends_with(".crdownload")
}

fn file_name_of(path: &Path) -> Result<String> {
    Ok(path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("unusable filename: {}", path.display()))?
        .to_string())
}

/// Streaming SHA-256 of a file's contents, lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Move `path` into `target_dir` under `filename`, atomically with respect to
/// readers of the target directory: copy to a dotted temp sibling first, then
/// rename into place. Name collisions with different content get a `_1`,
/// `_2`, ... suffix before the extension.
fn relocate(path: &Path, target_dir: &Path, filename: &str) -> Result<PathBuf> {
    fs::create_dir_all(target_dir)
        .with_context(|| format!("creating {}", target_dir.display()))?;

    let target = next_free_name(target_dir, filename);
    let tmp = target_dir.join(format!(
        ".{}.tmp",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(filename)
    ));

    fs::copy(path, &tmp).with_context(|| format!("staging {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, &target) {
        fs::remove_file(&tmp).ok();
        return Err(e).with_context(|| format!("placing {}", target.display()));
    }
    fs::remove_file(path).with_context(|| format!("removing source {}", path.display()))?;

    Ok(target)
}

fn next_free_name(dir: &Path, filename: &str) -> PathBuf {
    let first = dir.join(filename);
    if !first.exists() {
        return first;
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_string(), format!(".{}", e)),
        _ => (filename.to_string(), String::new()),
    };
    for i in 1.. {
        let candidate = dir.join(format!("{}_{}{}", stem, i, ext));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::default_taxonomy;
    use crate::config::{DbConfig, PathsConfig};
    use crate::store::SqliteVectorIndex;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::io::Write;
    use std::str::FromStr;

    async fn memory_pool() -> sqlx::SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn test_config(root: &Path) -> Config {
        Config {
            db: DbConfig {
                path: root.join("db.sqlite"),
            },
            paths: PathsConfig {
                incoming: root.join("incoming"),
                sorted: root.join("sorted"),
            },
            chunking: Default::default(),
            classifier: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            llm: Default::default(),
            spell: Default::default(),
            sorting: Default::default(),
            watcher: Default::default(),
        }
    }

    #[tokio::test]
    async fn ingest_leaves_record_with_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(&config.paths.incoming).unwrap();
        let pool = memory_pool().await;
        let metadata = MetadataStore::new(pool.clone());
        let index =
            SqliteVectorIndex::new(pool.clone(), Default::default(), Default::default());
        let classifier = Classifier::new(default_taxonomy(), 15.0);
        let llm = LlmClient::disabled();
        let coordinator = Coordinator::new(&config, &metadata, &index, &classifier, &llm);

        let src = config.paths.incoming.join("notes.txt");
        fs::write(&src, "Plain meeting notes about the quarterly budget.").unwrap();

        let outcome = coordinator.process_one(&src).await.unwrap();
        let chunks = match outcome {
            IngestOutcome::Ingested { chunks, .. } => chunks,
            other => panic!("expected Ingested, got {:?}", other),
        };
        assert!(chunks > 0);

        let records = metadata.all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            index.count_by_source(&records[0].checksum).await.unwrap(),
            chunks as u64
        );
        assert!(!src.exists());
    }

    #[tokio::test]
    async fn vectorless_record_is_repaired_by_reconcile() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pool = memory_pool().await;
        let metadata = MetadataStore::new(pool.clone());
        let index =
            SqliteVectorIndex::new(pool.clone(), Default::default(), Default::default());
        let classifier = Classifier::new(default_taxonomy(), 15.0);
        let llm = LlmClient::disabled();
        let coordinator = Coordinator::new(&config, &metadata, &index, &classifier, &llm);

        // The residue of a crash between the metadata write and the vector
        // write: a stored file and its record, but no indexed chunks.
        let stored_dir = config.paths.sorted.join("Other");
        fs::create_dir_all(&stored_dir).unwrap();
        let stored = stored_dir.join("orphan.txt");
        fs::write(&stored, "Recovered text that was never indexed.").unwrap();
        let checksum = hash_file(&stored).unwrap();
        metadata
            .insert(&NewFileRecord {
                filename: "orphan.txt".to_string(),
                stored_path: stored.to_string_lossy().to_string(),
                checksum: checksum.clone(),
                category: "Other".to_string(),
                department: None,
                year: None,
                file_type: "text".to_string(),
                text_snippet: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(index.count_by_source(&checksum).await.unwrap(), 0);

        let report = coordinator.reconcile().await.unwrap();
        assert_eq!(report.reindexed, 1);
        assert_eq!(report.missing_files_purged, 0);
        assert!(index.count_by_source(&checksum).await.unwrap() > 0);
        assert!(metadata.find_by_checksum(&checksum).await.unwrap().is_some());
    }

    #[test]
    fn hashing_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let c = dir.path().join("c.txt");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        fs::write(&c, b"other bytes").unwrap();

        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        assert_ne!(hash_file(&a).unwrap(), hash_file(&c).unwrap());
    }

    #[test]
    fn hash_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty");
        fs::File::create(&p).unwrap();
        assert_eq!(
            hash_file(&p).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn relocate_moves_and_cleans_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("doc.txt");
        fs::write(&src, b"content").unwrap();
        let target_dir = dir.path().join("sorted").join("Other");

        let stored = relocate(&src, &target_dir, "doc.txt").unwrap();
        assert_eq!(stored, target_dir.join("doc.txt"));
        assert!(!src.exists());
        assert_eq!(fs::read(&stored).unwrap(), b"content");
        // No temp litter left behind.
        let leftovers: Vec<_> = fs::read_dir(&target_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn relocate_suffixes_on_name_collision() {
        let dir = tempfile::tempdir().unwrap();
        let target_dir = dir.path().join("sorted").join("Other");
        fs::create_dir_all(&target_dir).unwrap();
        fs::write(target_dir.join("doc.txt"), b"first").unwrap();
        fs::write(target_dir.join("doc_1.txt"), b"second").unwrap();

        let src = dir.path().join("doc.txt");
        fs::write(&src, b"third").unwrap();
        let stored = relocate(&src, &target_dir, "doc.txt").unwrap();

        assert_eq!(stored, target_dir.join("doc_2.txt"));
        assert_eq!(fs::read(target_dir.join("doc.txt")).unwrap(), b"first");
        assert_eq!(fs::read(&stored).unwrap(), b"third");
    }

    #[test]
    fn collision_suffix_handles_no_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), b"x").unwrap();
        let next = next_free_name(dir.path(), "README");
        assert_eq!(next, dir.path().join("README_1"));
    }

    #[test]
    fn junk_names_are_ignored() {
        assert!(should_ignore(".DS_Store"));
        assert!(should_ignore(".hidden"));
        assert!(should_ignore("download.part"));
        assert!(should_ignore("staging.tmp"));
        assert!(!should_ignore("report.pdf"));
    }

    #[test]
    fn temp_file_write_then_hash() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        f.flush().unwrap();
        assert_eq!(
            hash_file(f.path()).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
