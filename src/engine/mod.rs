// Tue Jan 13 2026 - Alex

pub mod core;
pub(crate) mod runner;
pub mod scheduler;
pub mod worker;
pub mod task;
pub mod result;
pub mod pipeline;
pub mod stage;

pub use self::core::{Engine, EngineError};
pub use scheduler::{Executor, ExecutorError, InlineExecutor, Job, ThreadPerTask};
pub use worker::WorkerPool;
pub use task::{Callback, TaskHandle, TaskState};
pub use result::{Failure, TaskError};
pub use pipeline::{PipelineBuilder, TaskBuilder};
pub use stage::Sequence;
