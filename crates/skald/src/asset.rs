//! # Asset Loading
//!
//! Files are read on a small pool of worker threads and handed back to the
//! main thread through a channel. Nothing ever calls into the world from a
//! worker: the owner polls once per tick and applies what arrived.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  AssetLoader                                             │
//! │                                                          │
//! │  request(path) ──► jobs ──► worker 0..n  (read + decode) │
//! │                                │                         │
//! │  poll() ◄──────── results ◄────┘                         │
//! │                                                          │
//! │  watcher (notify) ──► events ──► pending_reloads         │
//! │  changed_files() ◄── entries quiet for 100ms             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//!
//! Every request gets a [`Ticket`]. Cancelling forgets the ticket and raises
//! the job's flag so a worker that hasn't started it skips the read. A
//! result whose ticket is no longer in flight is dropped by [`poll`], so a
//! cancelled or superseded request can never surface.
//!
//! ## Hot Reload
//!
//! With `hot_reload` enabled, loaded files are watched. Editors save in
//! bursts (write temp, rename), so events per path are debounced: a path is
//! reported once it has been quiet for 100ms. If the watcher can't start
//! the loader still works, it just never reports changes.
//!
//! [`poll`]: AssetLoader::poll

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::config::AssetConfig;

/// The debounce window for file change events.
const DEBOUNCE_DURATION: Duration = Duration::from_millis(100);

/// Identifies one load request.
pub type Ticket = u64;

/// Decoded file contents.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetPayload {
    /// `.json` files, parsed.
    Json(serde_json::Value),
    /// Everything else, raw.
    Bytes(Vec<u8>),
}

impl AssetPayload {
    pub fn len(&self) -> usize {
        match self {
            AssetPayload::Json(value) => value.to_string().len(),
            AssetPayload::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a load failed.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    #[error("load cancelled")]
    Cancelled,

    #[error("asset loader is shut down")]
    ShutDown,
}

/// A finished request.
#[derive(Debug)]
pub struct Completed {
    pub ticket: Ticket,
    pub path: PathBuf,
    pub result: Result<AssetPayload, AssetError>,
}

struct Job {
    ticket: Ticket,
    path: PathBuf,
    cancelled: Arc<AtomicBool>,
}

/// Threaded file loader with optional change watching.
pub struct AssetLoader {
    root: PathBuf,
    jobs: Option<mpsc::Sender<Job>>,
    results: mpsc::Receiver<Completed>,
    workers: Vec<JoinHandle<()>>,
    in_flight: HashMap<Ticket, Arc<AtomicBool>>,
    next_ticket: Ticket,
    /// The filesystem watcher. `None` if hot reload is off or it failed to start.
    watcher: Option<RecommendedWatcher>,
    events: Option<mpsc::Receiver<notify::Result<notify::Event>>>,
    watched: HashSet<PathBuf>,
    /// Debounce buffer: canonical path → time of the last event.
    pending_reloads: HashMap<PathBuf, Instant>,
}

impl AssetLoader {
    pub fn new(config: &AssetConfig) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, results) = mpsc::channel();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..config.worker_threads.max(1))
            .filter_map(|i| {
                let jobs = Arc::clone(&job_rx);
                let results = result_tx.clone();
                std::thread::Builder::new()
                    .name(format!("skald-asset-{i}"))
                    .spawn(move || worker_loop(&jobs, &results))
                    .map_err(|e| log::warn!("failed to spawn asset worker {i}: {e}"))
                    .ok()
            })
            .collect();

        let (watcher, events) = if config.hot_reload {
            start_watcher()
        } else {
            (None, None)
        };

        Self {
            root: PathBuf::from(&config.root),
            jobs: Some(job_tx),
            results,
            workers,
            in_flight: HashMap::new(),
            next_ticket: 0,
            watcher,
            events,
            watched: HashSet::new(),
            pending_reloads: HashMap::new(),
        }
    }

    /// `path` resolved against the configured root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Queue a load of `path` (relative to the root).
    ///
    /// Fails with [`AssetError::ShutDown`] once the loader has been shut
    /// down or has no worker left to run the job.
    pub fn request(&mut self, path: impl AsRef<Path>) -> Result<Ticket, AssetError> {
        let Some(jobs) = self.jobs.as_ref().filter(|_| !self.workers.is_empty()) else {
            return Err(AssetError::ShutDown);
        };

        let ticket = self.next_ticket;
        let cancelled = Arc::new(AtomicBool::new(false));
        let job = Job {
            ticket,
            path: self.root.join(path),
            cancelled: Arc::clone(&cancelled),
        };
        jobs.send(job).map_err(|_| AssetError::ShutDown)?;

        self.next_ticket += 1;
        self.in_flight.insert(ticket, cancelled);
        Ok(ticket)
    }

    /// Forget a request. Its result, if any, will never be returned.
    pub fn cancel(&mut self, ticket: Ticket) -> bool {
        match self.in_flight.remove(&ticket) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Drain finished requests without blocking.
    pub fn poll(&mut self) -> Vec<Completed> {
        let mut done = Vec::new();
        while let Ok(completed) = self.results.try_recv() {
            if self.in_flight.remove(&completed.ticket).is_some() {
                done.push(completed);
            }
        }
        done
    }

    /// Requests queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Watch `path` (relative to the root) for changes. No-op without a watcher.
    pub fn watch(&mut self, path: impl AsRef<Path>) {
        let Some(watcher) = &mut self.watcher else {
            return;
        };
        let path = self.root.join(path);
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                log::warn!("cannot watch '{}': {e}", path.display());
                return;
            }
        };
        if self.watched.contains(&canonical) {
            return;
        }
        if let Err(e) = watcher.watch(&canonical, RecursiveMode::NonRecursive) {
            log::warn!("failed to watch '{}': {e}", canonical.display());
            return;
        }
        self.watched.insert(canonical);
    }

    /// Canonical paths of watched files that changed and have settled.
    pub fn changed_files(&mut self) -> Vec<PathBuf> {
        self.poll_events();

        let now = Instant::now();
        let mut ready = Vec::new();
        self.pending_reloads.retain(|path, last| {
            if now.duration_since(*last) >= DEBOUNCE_DURATION {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });
        ready
    }

    fn poll_events(&mut self) {
        let Some(events) = &self.events else {
            return;
        };
        loop {
            match events.try_recv() {
                Ok(Ok(event)) => {
                    use notify::EventKind;
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        continue;
                    }
                    for path in &event.paths {
                        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
                        if self.watched.contains(&canonical) {
                            self.pending_reloads.insert(canonical, Instant::now());
                        }
                    }
                }
                Ok(Err(e)) => log::warn!("file watcher error: {e}"),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::warn!("file watcher disconnected, hot reload disabled");
                    self.events = None;
                    self.watcher = None;
                    break;
                }
            }
        }
    }

    /// Cancel everything and join the workers.
    pub fn shutdown(&mut self) {
        for (_, flag) in self.in_flight.drain() {
            flag.store(true, Ordering::Relaxed);
        }
        self.jobs = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("asset worker panicked");
            }
        }
        self.watcher = None;
        self.events = None;
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn start_watcher() -> (
    Option<RecommendedWatcher>,
    Option<mpsc::Receiver<notify::Result<notify::Event>>>,
) {
    let (tx, rx) = mpsc::channel();
    let watcher = notify::recommended_watcher(move |res| {
        // Receiver dropped means the loader is gone.
        let _ = tx.send(res);
    });
    match watcher {
        Ok(w) => (Some(w), Some(rx)),
        Err(e) => {
            log::warn!("failed to create file watcher: {e}, hot reload disabled");
            (None, None)
        }
    }
}

fn worker_loop(jobs: &Mutex<mpsc::Receiver<Job>>, results: &mpsc::Sender<Completed>) {
    loop {
        let job = jobs.lock().recv();
        let Ok(job) = job else {
            return;
        };
        let result = if job.cancelled.load(Ordering::Relaxed) {
            Err(AssetError::Cancelled)
        } else {
            load_file(&job.path)
        };
        let completed = Completed {
            ticket: job.ticket,
            path: job.path,
            result,
        };
        if results.send(completed).is_err() {
            return;
        }
    }
}

/// Read and decode one file.
pub fn load_file(path: &Path) -> Result<AssetPayload, AssetError> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_slice(&bytes)
            .map(AssetPayload::Json)
            .map_err(|e| AssetError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    } else {
        Ok(AssetPayload::Bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("skald-asset-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn loader(root: &Path) -> AssetLoader {
        AssetLoader::new(&AssetConfig {
            worker_threads: 2,
            hot_reload: false,
            root: root.display().to_string(),
        })
    }

    fn wait_for(loader: &mut AssetLoader, count: usize) -> Vec<Completed> {
        let mut done = Vec::new();
        for _ in 0..400 {
            done.extend(loader.poll());
            if done.len() >= count {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done
    }

    #[test]
    fn loads_json_and_bytes() {
        let root = temp_root("formats");
        std::fs::write(root.join("level.json"), r#"{ "name": "intro" }"#).unwrap();
        std::fs::write(root.join("blob.bin"), [1u8, 2, 3]).unwrap();
        let mut loader = loader(&root);

        let json = loader.request("level.json").unwrap();
        let bytes = loader.request("blob.bin").unwrap();
        let mut done = wait_for(&mut loader, 2);
        done.sort_by_key(|c| c.ticket);

        assert_eq!(done.len(), 2);
        assert_eq!(done[0].ticket, json);
        assert_eq!(
            done[0].result.as_ref().unwrap(),
            &AssetPayload::Json(serde_json::json!({ "name": "intro" }))
        );
        assert_eq!(done[1].ticket, bytes);
        assert_eq!(done[1].result.as_ref().unwrap(), &AssetPayload::Bytes(vec![1, 2, 3]));
        assert_eq!(loader.in_flight(), 0);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn reports_io_and_decode_errors() {
        let root = temp_root("errors");
        std::fs::write(root.join("bad.json"), "{ nope").unwrap();
        let mut loader = loader(&root);

        loader.request("missing.bin").unwrap();
        loader.request("bad.json").unwrap();
        let done = wait_for(&mut loader, 2);

        assert_eq!(done.len(), 2);
        for completed in done {
            match completed.result {
                Err(AssetError::Io { path, .. }) => assert!(path.ends_with("missing.bin")),
                Err(AssetError::Decode { path, .. }) => assert!(path.ends_with("bad.json")),
                other => panic!("unexpected result {other:?}"),
            }
        }
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn cancelled_requests_never_surface() {
        let root = temp_root("cancel");
        std::fs::write(root.join("a.bin"), [0u8; 4]).unwrap();
        let mut loader = loader(&root);

        let dropped = loader.request("a.bin").unwrap();
        let kept = loader.request("a.bin").unwrap();
        assert!(loader.cancel(dropped));
        assert!(!loader.cancel(dropped));

        let done = wait_for(&mut loader, 1);
        std::thread::sleep(Duration::from_millis(20));
        let late = loader.poll();

        assert!(done.iter().chain(late.iter()).all(|c| c.ticket == kept));
        assert_eq!(done.len() + late.len(), 1);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn requests_after_shutdown_are_refused() {
        let root = temp_root("shutdown");
        let mut loader = loader(&root);
        loader.shutdown();
        assert!(matches!(loader.request("anything.bin"), Err(AssetError::ShutDown)));
        assert_eq!(loader.in_flight(), 0);
        assert!(loader.poll().is_empty());
        std::fs::remove_dir_all(&root).ok();
    }
}
