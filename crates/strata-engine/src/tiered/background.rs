//! Background compilation workers
//!
//! Promotion requests travel over a bounded channel to dedicated worker
//! threads. Dropping the handle closes the channel; the workers drain what
//! is queued, exit, and are joined.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use super::backend::CompilerBackend;
use super::engine::{compile_and_install, EngineStats};
use super::method::TieredMethod;

/// A request to compile a method on a background thread
pub struct CompileRequest {
    /// The method being promoted; already in the `Promoting` state
    pub method: Arc<TieredMethod>,
}

/// Handle to the background compiler threads
pub struct BackgroundCompiler {
    tx: Option<Sender<CompileRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl BackgroundCompiler {
    /// Start `threads` workers behind a queue of `capacity` requests.
    /// Returns `None` if no worker thread could be spawned.
    pub(crate) fn start(
        threads: usize,
        capacity: usize,
        backend: Arc<dyn CompilerBackend>,
        stats: Arc<EngineStats>,
    ) -> Option<Self> {
        let (tx, rx) = channel::bounded(capacity);
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let backend = Arc::clone(&backend);
            let stats = Arc::clone(&stats);
            match thread::Builder::new()
                .name(format!("strata-compiler-{}", i))
                .spawn(move || worker_loop(rx, backend, stats))
            {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!(worker = i, error = %err, "failed to spawn compiler thread"),
            }
        }
        if workers.is_empty() {
            return None;
        }
        debug!(workers = workers.len(), capacity, "background compiler started");
        Some(BackgroundCompiler {
            tx: Some(tx),
            workers,
        })
    }

    /// Submit a compilation request. Returns false if the queue is full or
    /// closed.
    pub fn try_submit(&self, request: CompileRequest) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.try_send(request).is_ok())
    }

    /// Number of running worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for BackgroundCompiler {
    fn drop(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: Receiver<CompileRequest>, backend: Arc<dyn CompilerBackend>, stats: Arc<EngineStats>) {
    while let Ok(request) = rx.recv() {
        compile_and_install(&request.method, backend.as_ref(), &stats);
        stats.finish_pending();
    }
}
