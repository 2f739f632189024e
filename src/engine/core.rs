// Tue Jan 13 2026 - Alex

use crate::config::{ConfigError, EngineConfig, ExecutorKind};
use crate::engine::pipeline::PipelineBuilder;
use crate::engine::scheduler::{build_rayon_pool, Executor, InlineExecutor, ThreadPerTask};
use crate::engine::worker::WorkerPool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to build rayon pool: {0}")]
    RayonPool(#[from] rayon::ThreadPoolBuildError),
}

/// Owns the default executor that builders submit to.
///
/// Construct one at the entry point and pass it (or builders made from it)
/// to whoever needs to start tasks. The worker pool is torn down by
/// `shutdown`, or once the engine and every task submitted to it are gone.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    executor: Arc<dyn Executor>,
    pool: Option<Arc<WorkerPool>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let mut pool = None;
        let executor: Arc<dyn Executor> = match config.executor {
            ExecutorKind::Pool => {
                let worker_pool = Arc::new(WorkerPool::new(config.worker_threads, &config.thread_name_prefix));
                pool = Some(worker_pool.clone());
                worker_pool
            }
            ExecutorKind::Rayon => Arc::new(build_rayon_pool(config.worker_threads, &config.thread_name_prefix)?),
            ExecutorKind::ThreadPerTask => Arc::new(ThreadPerTask::new(&config.thread_name_prefix)),
            ExecutorKind::Inline => Arc::new(InlineExecutor),
        };

        log::info!(
            "Engine started with {} executor ({} threads)",
            executor.name(),
            config.worker_threads
        );

        Ok(Self {
            config: Arc::new(config),
            executor,
            pool,
        })
    }

    /// An engine backed by an executor the caller already owns.
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            config: Arc::new(EngineConfig::default()),
            executor,
            pool: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }

    pub fn pool(&self) -> Option<&WorkerPool> {
        self.pool.as_deref()
    }

    pub fn from_iter<T, I>(&self, source: I) -> PipelineBuilder<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        PipelineBuilder::new(source, self.executor.clone())
    }

    pub fn of<T, V>(&self, values: V) -> PipelineBuilder<T>
    where
        T: Send + 'static,
        V: Into<Vec<T>>,
    {
        PipelineBuilder::new(values.into(), self.executor.clone())
    }

    /// Stops the owned worker pool, letting queued jobs finish first. Tasks
    /// submitted or resumed afterwards fail with `ExecutorError::Stopped`.
    pub fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }
}
