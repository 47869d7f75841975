//! Cross-platform recursive filesystem watcher (§4.6).
//!
//! Converts native `notify` events into [`Job`]s at `Priority::High` and
//! pushes them onto the shared [`PriorityQueue`]. If the queue is full the
//! event is dropped and the queue's own overflow counter increments — this
//! is the watcher's only backpressure action; it never blocks on a full
//! queue.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use std::sync::Arc;

use core_types::Operation;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use scheduler::PriorityQueue;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("failed to create filesystem watcher: {0}")]
    Create(#[from] notify::Error),
}

/// A running watch over one or more monitored roots. Dropping this value
/// stops the underlying OS watch and the dispatch thread.
pub struct Watcher {
    _inner: RecommendedWatcher,
}

/// Start a recursive watch on every path in `roots`, feeding typed jobs into
/// `queue`. Paths that do not exist are logged and skipped rather than
/// failing the whole call, mirroring the classifier's "probe failure means
/// don't index" discipline (§4.1) rather than propagating an I/O error for
/// one bad root among many.
pub fn start(roots: &[PathBuf], queue: Arc<PriorityQueue>) -> Result<Watcher, WatcherError> {
    let (tx, rx) = mpsc::channel::<Event>();

    let mut inner = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => error!(error = %e, "filesystem watch error"),
        },
        notify::Config::default(),
    )?;

    for root in roots {
        if !root.exists() {
            warn!(path = %root.display(), "monitored path does not exist, skipping watch");
            continue;
        }
        if let Err(e) = inner.watch(root, RecursiveMode::Recursive) {
            warn!(path = %root.display(), error = %e, "failed to watch path");
        } else {
            debug!(path = %root.display(), "watching path");
        }
    }

    std::thread::Builder::new()
        .name("fs-watcher-dispatch".into())
        .spawn(move || dispatch_loop(rx, queue))
        .expect("failed to spawn watcher dispatch thread");

    Ok(Watcher { _inner: inner })
}

fn dispatch_loop(rx: mpsc::Receiver<Event>, queue: Arc<PriorityQueue>) {
    loop {
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => handle_event(&event, &queue),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn handle_event(event: &Event, queue: &PriorityQueue) {
    use notify::event::{ModifyKind, RenameMode};

    match &event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                if is_directory_event(path) {
                    continue;
                }
                enqueue(queue, path, Operation::Create);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                enqueue(queue, from, Operation::Delete);
                enqueue(queue, to, Operation::Create);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                enqueue(queue, path, Operation::Delete);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                if is_directory_event(path) {
                    continue;
                }
                enqueue(queue, path, Operation::Create);
            }
        }
        EventKind::Modify(_) => {
            for path in &event.paths {
                if is_directory_event(path) {
                    continue;
                }
                enqueue(queue, path, Operation::Update);
            }
        }
        EventKind::Remove(_) => {
            // The path is already gone, so there is no way to probe whether
            // it was a file or a directory. Enqueueing a delete for a path
            // that was never indexed is a harmless no-op downstream.
            for path in &event.paths {
                enqueue(queue, path, Operation::Delete);
            }
        }
        _ => {}
    }
}

fn is_directory_event(path: &Path) -> bool {
    path.is_dir()
}

fn enqueue(queue: &PriorityQueue, path: &Path, operation: Operation) {
    if !queue.try_enqueue(path.to_path_buf(), operation, core_types::Priority::High) {
        warn!(path = %path.display(), "indexing queue full, dropping watcher event");
    }
}
