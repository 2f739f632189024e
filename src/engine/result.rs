// Tue Jan 13 2026 - Alex

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How a task ended when it did not produce a value, or why a blocking
/// getter gave up.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("Task was cancelled")]
    Cancelled,
    #[error("Timed out after {0:?} waiting for task result")]
    Timeout(Duration),
    #[error("Task failed: {0}")]
    Failed(Failure),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            TaskError::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// The original cause of a failed task.
#[derive(Debug, Clone)]
pub enum Failure {
    /// A user closure panicked; holds the panic message.
    Panic(String),
    /// A fallible action returned an error.
    Error(Arc<anyhow::Error>),
}

impl Failure {
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Failure::Panic(message)
    }

    pub fn from_error(error: anyhow::Error) -> Self {
        Failure::Error(Arc::new(error))
    }

    pub fn panic_message(&self) -> Option<&str> {
        match self {
            Failure::Panic(message) => Some(message),
            Failure::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            Failure::Error(error) => Some(error),
            Failure::Panic(_) => None,
        }
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error().and_then(|e| e.downcast_ref::<E>())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Panic(message) => write!(f, "panicked: {}", message),
            Failure::Error(error) => write!(f, "{:#}", error),
        }
    }
}
