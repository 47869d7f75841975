//! Tantivy-backed keyword index over file metadata and extracted content
//! (§4.4). One document per indexed path, keyed by the path itself so a
//! re-index of an unchanged path is a delete-then-add rather than a
//! duplicate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use core_types::{FileMetadata, KeywordHit};
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, QueryParser};
use tantivy::schema::document::TantivyDocument;
use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};

const WRITER_HEAP_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
struct Fields {
    path: Field,
    filename: Field,
    content: Field,
    extension: Field,
    file_type: Field,
    mime_type: Field,
    size: Field,
    modified_time: Field,
    created_time: Field,
    indexed_time: Field,
    content_hash: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();

    let path = builder.add_text_field("path", STRING | STORED);
    let filename = builder.add_text_field("filename", TEXT | STORED);
    let content = builder.add_text_field("content", TEXT);
    let extension = builder.add_text_field("extension", STRING | STORED);
    let file_type = builder.add_text_field("file_type", STRING | STORED);
    let mime_type = builder.add_text_field("mime_type", STRING | STORED);
    let size = builder.add_u64_field("size", FAST | STORED);
    let modified_time = builder.add_i64_field("modified_time", FAST | STORED);
    let created_time = builder.add_i64_field("created_time", FAST | STORED);
    let indexed_time = builder.add_i64_field("indexed_time", FAST | STORED);
    let content_hash = builder.add_text_field("content_hash", STRING | STORED);

    let fields = Fields {
        path,
        filename,
        content,
        extension,
        file_type,
        mime_type,
        size,
        modified_time,
        created_time,
        indexed_time,
        content_hash,
    };
    (builder.build(), fields)
}

/// Aggregate counts reported by [`KeywordIndex::stats`] (§4.4).
#[derive(Debug, Clone)]
pub struct KeywordIndexStats {
    pub num_docs: u64,
    pub total_stored_size: u64,
    pub docs_by_file_type: HashMap<String, u64>,
    pub index_dir: PathBuf,
}

pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
    dir: PathBuf,
}

impl KeywordIndex {
    /// Open the index at `dir` if one exists, otherwise create it.
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).context("opening existing keyword index")?
        } else {
            Index::create_in_dir(dir, schema).context("creating keyword index")?
        };
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            dir: dir.to_path_buf(),
        })
    }

    fn to_document(&self, meta: &FileMetadata, content: &str) -> TantivyDocument {
        let f = &self.fields;
        let mut doc = TantivyDocument::default();
        doc.add_text(f.path, meta.path.to_string_lossy());
        doc.add_text(f.filename, &meta.filename);
        doc.add_text(f.content, content);
        doc.add_text(f.extension, &meta.extension);
        doc.add_text(f.file_type, &meta.file_type);
        doc.add_text(f.mime_type, &meta.mime_type);
        doc.add_u64(f.size, meta.size);
        doc.add_i64(f.modified_time, meta.modified_time);
        doc.add_i64(f.created_time, meta.created_time);
        doc.add_i64(f.indexed_time, meta.indexed_time);
        doc.add_text(f.content_hash, &meta.content_hash);
        doc
    }

    /// Add a new document. Does not check for an existing document at the
    /// same path; callers that may be re-indexing should call [`update`]
    /// instead.
    ///
    /// [`update`]: KeywordIndex::update
    pub fn add(&self, meta: &FileMetadata, content: &str) -> Result<()> {
        let doc = self.to_document(meta, content);
        let mut writer = self.writer.lock().expect("keyword index writer poisoned");
        writer.add_document(doc)?;
        writer.commit()?;
        Ok(())
    }

    /// Upsert: remove any existing document at `meta.path`, then add the new
    /// one, in a single commit.
    pub fn update(&self, meta: &FileMetadata, content: &str) -> Result<()> {
        let path_str = meta.path.to_string_lossy().to_string();
        let doc = self.to_document(meta, content);
        let mut writer = self.writer.lock().expect("keyword index writer poisoned");
        writer.delete_term(Term::from_field_text(self.fields.path, &path_str));
        writer.add_document(doc)?;
        writer.commit()?;
        Ok(())
    }

    /// Remove the document at `path`. Returns `true` if a document existed.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        let path_str = path.to_string_lossy().to_string();
        let existed = !self.search_by_path(&path_str)?.is_empty();
        let mut writer = self.writer.lock().expect("keyword index writer poisoned");
        writer.delete_term(Term::from_field_text(self.fields.path, &path_str));
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(existed)
    }

    fn search_by_path(&self, path_str: &str) -> Result<Vec<u32>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.fields.path, path_str);
        let query = tantivy::query::TermQuery::new(
            term,
            tantivy::schema::IndexRecordOption::Basic,
        );
        let hits = searcher.search(&query, &TopDocs::with_limit(1))?;
        Ok(hits.into_iter().map(|(_, addr)| addr.doc_id).collect())
    }

    /// Full-text search over the `content` field, ranked by Tantivy's BM25
    /// score.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        self.run_search(query, &[self.fields.content], limit)
    }

    /// Search restricted to the filename field only.
    pub fn search_by_filename(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        self.run_search(query, &[self.fields.filename], limit)
    }

    fn run_search(&self, query: &str, fields: &[Field], limit: usize) -> Result<Vec<KeywordHit>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, fields.to_vec());
        let parsed = parser
            .parse_query(query)
            .context("parsing keyword search query")?;
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            hits.push(self.to_hit(&doc, score));
        }
        Ok(hits)
    }

    fn to_hit(&self, doc: &TantivyDocument, score: f32) -> KeywordHit {
        let f = &self.fields;
        KeywordHit {
            path: text_value(doc, f.path).into(),
            filename: text_value(doc, f.filename),
            extension: text_value(doc, f.extension),
            file_type: text_value(doc, f.file_type),
            mime_type: text_value(doc, f.mime_type),
            size: u64_value(doc, f.size),
            modified_time: i64_value(doc, f.modified_time),
            created_time: i64_value(doc, f.created_time),
            content_hash: text_value(doc, f.content_hash),
            indexed_time: i64_value(doc, f.indexed_time),
            score,
        }
    }

    /// Commit any pending writes. Tantivy's default merge policy folds
    /// segments down on its own background threads after each commit; this
    /// just gives callers an explicit point to flush after a bulk scan.
    pub fn optimize(&self) -> Result<()> {
        let mut writer = self.writer.lock().expect("keyword index writer poisoned");
        writer.commit()?;
        Ok(())
    }

    /// Aggregate counts over the whole index: document count, summed stored
    /// size, and a histogram of documents by file type (§4.4).
    pub fn stats(&self) -> Result<KeywordIndexStats> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let num_docs = searcher.num_docs();

        let mut total_stored_size = 0u64;
        let mut docs_by_file_type: HashMap<String, u64> = HashMap::new();
        if num_docs > 0 {
            let top_docs = searcher.search(&AllQuery, &TopDocs::with_limit(num_docs as usize))?;
            for (_, addr) in top_docs {
                let doc: TantivyDocument = searcher.doc(addr)?;
                total_stored_size += u64_value(&doc, self.fields.size);
                let file_type = text_value(&doc, self.fields.file_type);
                *docs_by_file_type.entry(file_type).or_insert(0) += 1;
            }
        }

        Ok(KeywordIndexStats {
            num_docs,
            total_stored_size,
            docs_by_file_type,
            index_dir: self.dir.clone(),
        })
    }
}

fn text_value(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn u64_value(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

fn i64_value(doc: &TantivyDocument, field: Field) -> i64 {
    doc.get_first(field).and_then(|v| v.as_i64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_meta(path: &str) -> FileMetadata {
        let mut meta = FileMetadata::skeleton(PathBuf::from(path));
        meta.size = 42;
        meta.mime_type = "text/plain".into();
        meta.content_hash = "deadbeef".into();
        meta
    }

    #[test]
    fn add_and_search_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::open_or_create(dir.path()).unwrap();
        index
            .add(&sample_meta("/docs/report.txt"), "quarterly revenue summary")
            .unwrap();

        let hits = index.search("revenue", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "report.txt");
    }

    #[test]
    fn update_replaces_prior_document_at_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::open_or_create(dir.path()).unwrap();
        let meta = sample_meta("/docs/notes.txt");
        index.add(&meta, "alpha content").unwrap();
        index.update(&meta, "beta content").unwrap();

        assert!(index.search("alpha", 10).unwrap().is_empty());
        assert_eq!(index.search("beta", 10).unwrap().len(), 1);
        assert_eq!(index.stats().unwrap().num_docs, 1);
    }

    #[test]
    fn delete_removes_document_and_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::open_or_create(dir.path()).unwrap();
        let meta = sample_meta("/docs/temp.txt");
        index.add(&meta, "scratch content").unwrap();

        assert!(index.delete(&meta.path).unwrap());
        assert!(!index.delete(&meta.path).unwrap());
        assert_eq!(index.stats().unwrap().num_docs, 0);
    }

    #[test]
    fn search_by_filename_ignores_content_matches() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::open_or_create(dir.path()).unwrap();
        index
            .add(&sample_meta("/docs/budget.txt"), "mentions revenue inline")
            .unwrap();
        index
            .add(&sample_meta("/docs/revenue.txt"), "unrelated body text")
            .unwrap();

        let hits = index.search_by_filename("revenue", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "revenue.txt");
    }

    #[test]
    fn stats_reports_size_and_file_type_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let index = KeywordIndex::open_or_create(dir.path()).unwrap();
        let mut a = sample_meta("/docs/a.txt");
        a.size = 100;
        a.file_type = "txt".into();
        let mut b = sample_meta("/docs/b.pdf");
        b.size = 250;
        b.file_type = "pdf".into();
        index.add(&a, "alpha").unwrap();
        index.add(&b, "beta").unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.num_docs, 2);
        assert_eq!(stats.total_stored_size, 350);
        assert_eq!(stats.docs_by_file_type.get("txt"), Some(&1));
        assert_eq!(stats.docs_by_file_type.get("pdf"), Some(&1));
        assert_eq!(stats.index_dir, dir.path());
    }
}
