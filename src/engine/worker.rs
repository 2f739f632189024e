// Tue Jan 13 2026 - Alex

use crate::engine::scheduler::{Executor, ExecutorError, Job};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    running: AtomicBool,
    pending: AtomicUsize,
    completed: AtomicUsize,
}

/// Fixed-size pool of named threads pulling jobs from one FIFO queue.
///
/// Shutting down stops intake, lets workers drain the jobs already queued,
/// then joins every thread. Dropping the pool shuts it down.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize, prefix: &str) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            running: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let shared = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", prefix, i))
                .spawn(move || WorkerPool::worker_loop(i, shared));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to spawn worker {}: {}", i, e),
            }
        }

        log::debug!("Worker pool started with {} threads", handles.len());

        Self {
            shared,
            handles: Mutex::new(handles),
            size,
        }
    }

    fn worker_loop(id: usize, shared: Arc<Shared>) {
        loop {
            let job = {
                let mut queue = shared.queue.lock();
                loop {
                    if let Some(job) = queue.pop_front() {
                        break Some(job);
                    }
                    if !shared.running.load(Ordering::Acquire) {
                        break None;
                    }
                    shared.condvar.wait(&mut queue);
                }
            };

            let Some(job) = job else {
                log::trace!("Worker {} exiting", id);
                return;
            };

            // Task bodies catch their own panics; this guards raw jobs.
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::warn!("Worker {} recovered from a panicking job", id);
            }

            shared.pending.fetch_sub(1, Ordering::SeqCst);
            shared.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> usize {
        self.shared.completed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        {
            let _queue = self.shared.queue.lock();
            if !self.shared.running.swap(false, Ordering::AcqRel) {
                return;
            }
            self.shared.condvar.notify_all();
        }

        let current = thread::current().id();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            // A job that drops the last engine handle runs on a worker.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }

        log::debug!("Worker pool stopped after {} jobs", self.completed_count());
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        let mut queue = self.shared.queue.lock();
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(ExecutorError::Stopped {
                executor: self.name().to_string(),
            });
        }

        queue.push_back(job);
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.condvar.notify_one();
        Ok(())
    }

    fn name(&self) -> &str {
        "worker-pool"
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
