// Tue Jan 15 2026 - Alex

//! Off-thread pipelines over lazy sequences.
//!
//! A [`PipelineBuilder`] stacks stages (`map`, `filter`, `distinct`,
//! `sorted`, ...) over a sequence; choosing a terminal operation yields a
//! [`TaskBuilder`], and submitting that runs the pipeline on an
//! [`Executor`] as a task that can be paused, resumed, cancelled and
//! awaited through its [`TaskHandle`].

pub mod config;
pub mod engine;
pub mod utils;

pub use config::{EngineConfig, ExecutorKind};
pub use engine::{
    Engine, EngineError, Executor, Failure, PipelineBuilder, TaskBuilder, TaskError, TaskHandle,
    TaskState,
};
