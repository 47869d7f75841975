//! Indexing manager: orchestrates bulk scan and live updates across the
//! extractor, chunker, keyword index, vector index, watcher, and scheduler
//! (§4.7, §5).

mod logging;

pub use logging::init_tracing;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use core_types::config::{expand_tilde, Config};
use core_types::{Job, Operation, Priority, SearchMode, SearchResult};
use keyword_index::{KeywordIndex, KeywordIndexStats};
use parking_lot::Mutex;
use scheduler::{PriorityQueue, WorkerPool, DEFAULT_CAPACITY};
use search::HybridSearcher;
use thiserror::Error;
use tracing::{debug, info, warn};
use vector_index::{VectorIndex, VectorIndexStats};
use watcher::Watcher;

/// Maximum time to wait for the queue to drain on shutdown (§5).
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Bulk scan has no shutdown-style deadline; this just bounds the wait so a
/// stuck worker cannot hang a test or a caller forever.
const BULK_SCAN_DRAIN_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("failed to open keyword index: {0}")]
    KeywordIndex(#[source] anyhow::Error),
    #[error("failed to start filesystem watcher: {0}")]
    Watcher(#[from] watcher::WatcherError),
}

#[derive(Debug, Default)]
struct Stats {
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    total_bytes: AtomicU64,
}

/// Session summary emitted when a bulk scan drains (§4.7a).
#[derive(Debug, Clone, Copy)]
pub struct ScanSummary {
    pub files_processed: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub files_per_sec: f64,
    pub mib_per_sec: f64,
    pub error_rate: f64,
}

/// Aggregate counts across both indexes, surfaced for operators.
#[derive(Debug, Clone)]
pub struct ManagerStats {
    pub keyword: KeywordIndexStats,
    pub vector: Option<VectorIndexStats>,
}

/// Shared state referenced by every worker thread and the manager itself.
/// Kept separate from [`IndexingManager`] so the worker-pool closure can hold
/// an `Arc<Inner>` without capturing the pool/watcher handles alongside it.
struct Inner {
    config: Config,
    keyword: KeywordIndex,
    vector: Option<VectorIndex>,
    indexed_paths: Mutex<HashSet<PathBuf>>,
    stats: Stats,
}

impl Inner {
    /// Per-job processing per §4.7's six-step algorithm. Failures at any
    /// step are isolated: they are logged and counted, never propagated to
    /// the worker pool or to other jobs.
    fn process_job(&self, job: Job) {
        let start = Instant::now();

        if job.operation == Operation::Delete {
            if let Err(e) = self.keyword.delete(&job.path) {
                warn!(path = %job.path.display(), error = %e, "keyword delete failed");
            }
            if let Some(vector) = &self.vector {
                if let Err(e) = vector.delete_by_source(&job.path) {
                    warn!(path = %job.path.display(), error = %e, "vector delete failed");
                }
            }
            self.indexed_paths.lock().remove(&job.path);
            return;
        }

        if !extractor::should_index(&job.path, &self.config) {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(mut metadata) = extractor::metadata_for(&job.path) else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let (text, media_type) = extractor::extract(&job.path);
        metadata.mime_type = media_type;

        let already_indexed = self.indexed_paths.lock().contains(&job.path);
        let keyword_result = if job.operation == Operation::Create || !already_indexed {
            self.keyword.add(&metadata, &text)
        } else {
            self.keyword.update(&metadata, &text)
        };
        match keyword_result {
            Ok(()) => {
                self.indexed_paths.lock().insert(job.path.clone());
            }
            Err(e) => {
                warn!(path = %job.path.display(), error = %e, "keyword index write failed");
            }
        }

        if !text.is_empty() {
            if let Some(vector) = &self.vector {
                if let Err(e) = vector.delete_by_source(&job.path) {
                    warn!(path = %job.path.display(), error = %e, "vector delete-before-add failed");
                } else {
                    let chunks = chunker::chunk(
                        &text,
                        &job.path,
                        &metadata,
                        self.config.embedding.chunk_size,
                        self.config.embedding.chunk_overlap,
                    );
                    if let Err(e) = vector.add_chunks(&chunks) {
                        warn!(path = %job.path.display(), error = %e, "vector index write failed");
                    }
                }
            }
        }

        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        self.stats.total_bytes.fetch_add(metadata.size, Ordering::Relaxed);
        debug!(path = %job.path.display(), elapsed_ms = start.elapsed().as_millis(), "job processed");
    }
}

/// Orchestrates the full indexing pipeline: bulk scan on startup, live
/// updates from the filesystem watcher, and the search surface over both
/// indexes.
pub struct IndexingManager {
    inner: Arc<Inner>,
    queue: Arc<PriorityQueue>,
    running: Arc<AtomicBool>,
    pool: Mutex<Option<WorkerPool>>,
    watcher: Mutex<Option<Watcher>>,
}

impl IndexingManager {
    /// Open both indexes and construct the manager. Keyword-index open
    /// failure is fatal (§7); vector-index open failure disables the
    /// semantic subsystem for the session rather than failing startup.
    pub fn new(config: Config) -> Result<Self, ManagerError> {
        let keyword_dir = expand_tilde(&config.index_dir);
        let keyword = KeywordIndex::open_or_create(&keyword_dir).map_err(ManagerError::KeywordIndex)?;

        let vector_dir = expand_tilde(&config.vector_db_path);
        let vector = match VectorIndex::open_or_create(&vector_dir, &config.embedding.model_name) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "vector index unavailable, falling back to keyword-only search for this session");
                None
            }
        };

        let inner = Arc::new(Inner {
            config,
            keyword,
            vector,
            indexed_paths: Mutex::new(HashSet::new()),
            stats: Stats::default(),
        });

        Ok(Self {
            inner,
            queue: Arc::new(PriorityQueue::new(DEFAULT_CAPACITY)),
            running: Arc::new(AtomicBool::new(false)),
            pool: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }

    /// Start the worker pool and filesystem watcher. If `perform_bulk_scan`
    /// is set, recursively enumerate every monitored root and wait for the
    /// initial scan to drain before returning.
    pub fn start(&self, perform_bulk_scan: bool) -> Result<(), ManagerError> {
        self.running.store(true, Ordering::Release);

        let inner = Arc::clone(&self.inner);
        let pool = WorkerPool::spawn(Arc::clone(&self.queue), inner.config.max_workers, move |job| {
            inner.process_job(job);
        });
        *self.pool.lock() = Some(pool);

        let roots: Vec<PathBuf> = self
            .inner
            .config
            .monitored_paths
            .iter()
            .map(|p| expand_tilde(p))
            .collect();

        let live_watcher = watcher::start(&roots, Arc::clone(&self.queue))?;
        *self.watcher.lock() = Some(live_watcher);

        if perform_bulk_scan {
            let summary = self.bulk_scan(&roots);
            log_scan_summary(&summary);
        }

        Ok(())
    }

    /// Recursively enumerate `roots`, enqueue `create` jobs at `low`
    /// priority, wait for the queue to drain, and report a session summary
    /// (§4.7, §4.7a).
    pub fn bulk_scan(&self, roots: &[PathBuf]) -> ScanSummary {
        let start = Instant::now();
        let before = (
            self.inner.stats.processed.load(Ordering::Relaxed),
            self.inner.stats.failed.load(Ordering::Relaxed),
            self.inner.stats.skipped.load(Ordering::Relaxed),
            self.inner.stats.total_bytes.load(Ordering::Relaxed),
        );

        let mut enumerated = 0u64;
        for root in roots {
            info!(path = %root.display(), "scanning monitored root");
            enumerated += self.enqueue_tree(root);
        }
        info!(count = enumerated, "bulk scan enumeration complete, waiting for drain");

        self.wait_for_drain(BULK_SCAN_DRAIN_TIMEOUT);

        let elapsed = start.elapsed();
        let (processed, failed, skipped, total_bytes) = (
            self.inner.stats.processed.load(Ordering::Relaxed) - before.0,
            self.inner.stats.failed.load(Ordering::Relaxed) - before.1,
            self.inner.stats.skipped.load(Ordering::Relaxed) - before.2,
            self.inner.stats.total_bytes.load(Ordering::Relaxed) - before.3,
        );
        let seconds = elapsed.as_secs_f64().max(f64::EPSILON);
        let attempted = (processed + failed).max(1);
        ScanSummary {
            files_processed: processed,
            files_failed: failed,
            files_skipped: skipped,
            total_bytes,
            elapsed,
            files_per_sec: processed as f64 / seconds,
            mib_per_sec: (total_bytes as f64 / (1024.0 * 1024.0)) / seconds,
            error_rate: failed as f64 / attempted as f64,
        }
    }

    /// Recursively walk `root`, pruning descent into excluded directories,
    /// enqueueing eligible files at `Priority::Low`. Returns the count of
    /// files enqueued.
    fn enqueue_tree(&self, root: &Path) -> u64 {
        if !root.exists() {
            warn!(path = %root.display(), "monitored path does not exist, skipping");
            return 0;
        }

        let mut count = 0u64;
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    let excluded = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|name| self.inner.config.excluded_dirs.contains(name));
                    if !excluded {
                        stack.push(path);
                    }
                    continue;
                }
                if extractor::should_index(&path, &self.inner.config) {
                    self.queue.enqueue_blocking(path, Operation::Create, Priority::Low);
                    count += 1;
                    if count % self.inner.config.batch_size as u64 == 0 {
                        debug!(enqueued = count, "bulk scan progress");
                    }
                }
            }
        }
        count
    }

    fn wait_for_drain(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let queue_empty = self.queue.is_empty();
            let idle = self
                .pool
                .lock()
                .as_ref()
                .map(|p| p.in_flight() == 0)
                .unwrap_or(true);
            if queue_empty && idle {
                return;
            }
            if Instant::now() >= deadline {
                warn!("drain wait timed out, proceeding with whatever has completed");
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Stop the watcher, wait up to 30 s for the queue to drain, then join
    /// every worker thread. In-flight jobs finish their current step; none
    /// are forcibly aborted mid-write (§5).
    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);

        if let Some(w) = self.watcher.lock().take() {
            drop(w);
        }

        self.wait_for_drain(SHUTDOWN_DRAIN_TIMEOUT);

        if let Some(pool) = self.pool.lock().take() {
            pool.shutdown();
        }

        info!("indexing manager stopped");
        Ok(())
    }

    /// Run a search in the requested mode (§4.8).
    pub fn search(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
        w_k: f32,
        w_s: f32,
    ) -> Result<Vec<SearchResult>> {
        let searcher = HybridSearcher::new(&self.inner.keyword, self.inner.vector.as_ref());
        searcher.search(query, mode, limit, w_k, w_s, self.inner.config.embedding.similarity_threshold)
    }

    /// Filename-only search (§4.8).
    pub fn search_by_filename(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let searcher = HybridSearcher::new(&self.inner.keyword, self.inner.vector.as_ref());
        searcher.search_by_filename(query, limit)
    }

    /// Aggregate counts from both indexes.
    pub fn stats(&self) -> Result<ManagerStats> {
        Ok(ManagerStats {
            keyword: self.inner.keyword.stats()?,
            vector: self.inner.vector.as_ref().map(VectorIndex::stats).transpose()?,
        })
    }
}

fn log_scan_summary(summary: &ScanSummary) {
    info!(
        files_processed = summary.files_processed,
        files_failed = summary.files_failed,
        files_skipped = summary.files_skipped,
        total_bytes = summary.total_bytes,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        files_per_sec = summary.files_per_sec,
        mib_per_sec = summary.mib_per_sec,
        error_rate = summary.error_rate,
        "bulk scan session summary"
    );
}
