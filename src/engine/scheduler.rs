// Tue Jan 13 2026 - Alex

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use thiserror::Error;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("{executor} is shut down")]
    Stopped { executor: String },
    #[error("{executor} could not spawn a thread: {source}")]
    Spawn {
        executor: String,
        #[source]
        source: std::io::Error,
    },
}

/// Decides which thread runs a task body. A task hands the executor one
/// job per run slice; resuming a paused task submits a fresh job.
///
/// A rejected job is dropped without running.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job) -> Result<(), ExecutorError>;

    fn name(&self) -> &str {
        "executor"
    }
}

/// Runs the job on the submitting thread before `execute` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        job();
        Ok(())
    }

    fn name(&self) -> &str {
        "inline"
    }
}

/// Spawns a fresh named thread per job.
#[derive(Debug)]
pub struct ThreadPerTask {
    prefix: String,
    spawned: AtomicU64,
}

impl ThreadPerTask {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            spawned: AtomicU64::new(0),
        }
    }

    pub fn spawned_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for ThreadPerTask {
    fn default() -> Self {
        Self::new("seqtask")
    }
}

impl Executor for ThreadPerTask {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.prefix, n);

        thread::Builder::new()
            .name(name)
            .spawn(job)
            .map(|_| ())
            .map_err(|source| ExecutorError::Spawn {
                executor: self.name().to_string(),
                source,
            })
    }

    fn name(&self) -> &str {
        "thread-per-task"
    }
}

impl Executor for rayon::ThreadPool {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        self.spawn(job);
        Ok(())
    }

    fn name(&self) -> &str {
        "rayon"
    }
}

pub fn build_rayon_pool(threads: usize, prefix: &str) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    let prefix = prefix.to_string();
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("{}-{}", prefix, i))
        .build()
}
