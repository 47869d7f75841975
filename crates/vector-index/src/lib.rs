//! Embedding store + chunk-metadata store for the vector index (§4.5).
//!
//! Two stores share one directory: `vector_index/` holds the embedding
//! vectors (a flat, library-defined format persisted with `bincode`), and
//! `metadata.db` is a SQLite table keyed by `chunk_id` with a secondary
//! index on `source_path`. Both are kept behind a single [`VectorIndex`]
//! handle so `add_chunks`/`delete_by_source` stay atomic per call.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use core_types::{Chunk, FileMetadata, SemanticHit};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::warn;

const TEXT_PREVIEW_CHARS: usize = 200;
const EMBEDDING_DIMS: usize = 256;

/// One row of the embedding store: the chunk's vector plus the text it was
/// embedded from, kept alongside the vector so similarity search can return
/// a snippet without a second round-trip to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingRecord {
    source_path: String,
    chunk_index: usize,
    text: String,
    vector: Vec<f32>,
}

/// Deterministic, local, dependency-free text embedding.
///
/// Live re-embedding on model change is an explicit Non-goal, and nothing in
/// this workspace loads a neural embedding model from the network, so the
/// "embedding model" here is a fixed feature-hashing scheme: each lowercased
/// word is hashed into one of [`EMBEDDING_DIMS`] buckets and accumulated,
/// then the vector is L2-normalized. Two texts that share vocabulary land
/// close together under cosine similarity, which is all the rest of the
/// system (top-k search, threshold filtering) actually requires.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; EMBEDDING_DIMS];
    for word in text.split_whitespace() {
        let normalized: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if normalized.is_empty() {
            continue;
        }
        let bucket = hash_word(&normalized.to_ascii_lowercase()) % EMBEDDING_DIMS;
        vector[bucket] += 1.0;
    }
    normalize(&mut vector);
    vector
}

fn hash_word(word: &str) -> usize {
    // FNV-1a: small, deterministic, no external dependency.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as usize
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Aggregate counts reported by [`VectorIndex::stats`].
#[derive(Debug, Clone)]
pub struct VectorIndexStats {
    pub total_chunks: u64,
    pub unique_source_paths: u64,
    pub embedding_model: String,
    pub file_type_counts: HashMap<String, u64>,
}

pub struct VectorIndex {
    dir: PathBuf,
    embeddings_path: PathBuf,
    conn: Mutex<Connection>,
    embeddings: Mutex<HashMap<String, EmbeddingRecord>>,
    embedding_model: String,
}

impl VectorIndex {
    /// Open the vector index rooted at `dir`, creating `vector_index/` and
    /// `metadata.db` if this is the first run. Open/create failure is fatal,
    /// matching the keyword index's failure discipline (§7).
    pub fn open_or_create(dir: &Path, embedding_model: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).context("creating vector index directory")?;
        let vectors_dir = dir.join("vector_index");
        std::fs::create_dir_all(&vectors_dir).context("creating embedding store directory")?;
        let embeddings_path = vectors_dir.join("embeddings.bin");

        let conn = Connection::open(dir.join("metadata.db")).context("opening metadata.db")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunk_metadata (
                chunk_id      TEXT PRIMARY KEY,
                source_path   TEXT NOT NULL,
                chunk_index   INTEGER NOT NULL,
                start_char    INTEGER NOT NULL,
                end_char      INTEGER NOT NULL,
                text_preview  TEXT NOT NULL,
                file_metadata TEXT NOT NULL,
                indexed_time  INTEGER NOT NULL,
                embedding_model TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunk_metadata_source_path
                ON chunk_metadata(source_path);",
        )
        .context("creating chunk_metadata schema")?;

        let embeddings = load_embeddings(&embeddings_path);

        Ok(Self {
            dir: dir.to_path_buf(),
            embeddings_path,
            conn: Mutex::new(conn),
            embeddings: Mutex::new(embeddings),
            embedding_model: embedding_model.to_string(),
        })
    }

    /// Embed and insert every chunk, then persist. If embedding or insertion
    /// fails partway through, no chunk from this call is left visible.
    pub fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut staged = HashMap::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = embed(&chunk.text);
            staged.insert(
                chunk.chunk_id.clone(),
                EmbeddingRecord {
                    source_path: chunk.source_path.to_string_lossy().to_string(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    vector,
                },
            );
        }

        {
            let mut conn = self.conn.lock();
            let tx = conn
                .transaction()
                .context("beginning chunk_metadata transaction")?;
            for chunk in chunks {
                insert_metadata_row(&tx, chunk, &self.embedding_model)?;
            }
            tx.commit().context("committing chunk_metadata transaction")?;
        }

        {
            let mut embeddings = self.embeddings.lock();
            embeddings.extend(staged);
        }
        self.persist_embeddings()?;
        Ok(())
    }

    /// Delete every row (both stores) whose `source_path` equals `path`.
    /// Always returns `Ok(true)` once the call completes, including the
    /// zero-row case — matching §4.5's "completed" semantics.
    pub fn delete_by_source(&self, path: &Path) -> Result<bool> {
        let path_str = path.to_string_lossy().to_string();
        {
            let conn = self.conn.lock();
            conn.execute(
                "DELETE FROM chunk_metadata WHERE source_path = ?1",
                params![path_str],
            )
            .context("deleting chunk metadata by source_path")?;
        }
        {
            let mut embeddings = self.embeddings.lock();
            embeddings.retain(|_, record| record.source_path != path_str);
        }
        self.persist_embeddings()?;
        Ok(true)
    }

    /// Embed `query`, retrieve the top `top_k` nearest chunks by cosine
    /// similarity, filter by `score >= threshold`, tie-break by chunk id.
    pub fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SemanticHit>> {
        let query_vector = embed(query);
        let embeddings = self.embeddings.lock();

        let mut scored: Vec<(String, f32)> = embeddings
            .iter()
            .map(|(chunk_id, record)| (chunk_id.clone(), cosine_similarity(&query_vector, &record.vector)))
            .filter(|(_, score)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        let conn = self.conn.lock();
        let mut hits = Vec::with_capacity(scored.len());
        for (chunk_id, score) in scored {
            let Some(record) = embeddings.get(&chunk_id) else {
                continue;
            };
            let source_path = fetch_source_path(&conn, &chunk_id).unwrap_or_else(|| record.source_path.clone());
            hits.push(SemanticHit {
                chunk_id,
                source_path: PathBuf::from(source_path),
                chunk_index: record.chunk_index,
                text_preview: preview(&record.text),
                score,
            });
        }
        Ok(hits)
    }

    pub fn stats(&self) -> Result<VectorIndexStats> {
        let embeddings = self.embeddings.lock();
        let mut unique_sources: HashSet<&str> = HashSet::new();
        for record in embeddings.values() {
            unique_sources.insert(record.source_path.as_str());
        }

        let conn = self.conn.lock();
        let mut file_type_counts = HashMap::new();
        let mut stmt = conn
            .prepare("SELECT file_metadata FROM chunk_metadata")
            .context("preparing file-type histogram query")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows.flatten() {
            if let Ok(meta) = serde_json::from_str::<FileMetadata>(&row) {
                *file_type_counts.entry(meta.file_type).or_insert(0u64) += 1;
            }
        }

        Ok(VectorIndexStats {
            total_chunks: embeddings.len() as u64,
            unique_source_paths: unique_sources.len() as u64,
            embedding_model: self.embedding_model.clone(),
            file_type_counts,
        })
    }

    /// Root directory this index was opened against, for diagnostics.
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn persist_embeddings(&self) -> Result<()> {
        let embeddings = self.embeddings.lock();
        let encoded = bincode::serialize(&*embeddings).context("serializing embedding store")?;
        std::fs::write(&self.embeddings_path, encoded).context("persisting embedding store")?;
        Ok(())
    }
}

fn insert_metadata_row(conn: &Connection, chunk: &Chunk, embedding_model: &str) -> Result<()> {
    let file_metadata_json =
        serde_json::to_string(&chunk.metadata).context("serializing chunk file metadata")?;
    conn.execute(
        "INSERT OR REPLACE INTO chunk_metadata
            (chunk_id, source_path, chunk_index, start_char, end_char,
             text_preview, file_metadata, indexed_time, embedding_model)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            chunk.chunk_id,
            chunk.source_path.to_string_lossy(),
            chunk.chunk_index as i64,
            chunk.start_char as i64,
            chunk.end_char as i64,
            preview(&chunk.text),
            file_metadata_json,
            chunk.metadata.indexed_time,
            embedding_model,
        ],
    )
    .context("inserting chunk_metadata row")?;
    Ok(())
}

fn fetch_source_path(conn: &Connection, chunk_id: &str) -> Option<String> {
    conn.query_row(
        "SELECT source_path FROM chunk_metadata WHERE chunk_id = ?1",
        params![chunk_id],
        |row| row.get(0),
    )
    .ok()
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TEXT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn load_embeddings(path: &Path) -> HashMap<String, EmbeddingRecord> {
    match std::fs::read(path) {
        Ok(bytes) => bincode::deserialize(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "embedding store corrupt, starting empty");
            HashMap::new()
        }),
        Err(_) => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::FileMetadata;

    fn meta(path: &str) -> FileMetadata {
        FileMetadata::skeleton(PathBuf::from(path))
    }

    fn sample_chunk(path: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            chunk_id: Chunk::make_id(Path::new(path), index),
            source_path: PathBuf::from(path),
            chunk_index: index,
            start_char: 0,
            end_char: text.chars().count(),
            text: text.to_string(),
            metadata: meta(path),
        }
    }

    #[test]
    fn add_then_search_finds_similar_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path(), "test-model").unwrap();
        index
            .add_chunks(&[sample_chunk(
                "/docs/a.txt",
                0,
                "the quick brown fox jumps over the lazy dog",
            )])
            .unwrap();

        let hits = index.similarity_search("quick fox", 5, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_path, PathBuf::from("/docs/a.txt"));
    }

    #[test]
    fn threshold_filters_out_dissimilar_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path(), "test-model").unwrap();
        index
            .add_chunks(&[sample_chunk("/docs/a.txt", 0, "apples oranges bananas")])
            .unwrap();

        let hits = index.similarity_search("quantum physics lecture", 5, 0.5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn delete_by_source_removes_all_chunks_for_path() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path(), "test-model").unwrap();
        index
            .add_chunks(&[
                sample_chunk("/docs/a.txt", 0, "alpha beta"),
                sample_chunk("/docs/a.txt", 1, "gamma delta"),
            ])
            .unwrap();
        assert_eq!(index.stats().unwrap().total_chunks, 2);

        assert!(index.delete_by_source(Path::new("/docs/a.txt")).unwrap());
        assert_eq!(index.stats().unwrap().total_chunks, 0);
        // Idempotent: deleting again still reports completion, not failure.
        assert!(index.delete_by_source(Path::new("/docs/a.txt")).unwrap());
    }

    #[test]
    fn update_replaces_prior_chunk_set_for_source() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path(), "test-model").unwrap();
        index
            .add_chunks(&[sample_chunk("/docs/a.txt", 0, "version one content")])
            .unwrap();
        index.delete_by_source(Path::new("/docs/a.txt")).unwrap();
        index
            .add_chunks(&[sample_chunk("/docs/a.txt", 0, "version two content")])
            .unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.unique_source_paths, 1);
    }

    #[test]
    fn stats_reports_file_type_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path(), "test-model").unwrap();
        index
            .add_chunks(&[sample_chunk("/docs/a.txt", 0, "hello world")])
            .unwrap();
        let stats = index.stats().unwrap();
        assert_eq!(stats.file_type_counts.get("txt"), Some(&1));
    }

    #[test]
    fn embeddings_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = VectorIndex::open_or_create(dir.path(), "test-model").unwrap();
            index
                .add_chunks(&[sample_chunk("/docs/a.txt", 0, "persisted content here")])
                .unwrap();
        }
        let reopened = VectorIndex::open_or_create(dir.path(), "test-model").unwrap();
        let hits = reopened.similarity_search("persisted content", 5, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
