// Tue Jan 13 2026 - Alex

use crate::engine::result::{Failure, TaskError};
use crate::engine::runner::{Step, TaskBody};
use crate::engine::scheduler::Executor;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a task.
///
/// `Created -> Running <-> Pausing -> Paused -> Running ... -> Finishing ->
/// Finished | Exceptionally`, with `Cancelled` reachable from every
/// non-terminal state. Exactly one terminal state is ever reached.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created = 0,
    Running = 1,
    Pausing = 2,
    Paused = 3,
    Finishing = 4,
    Finished = 5,
    Exceptionally = 6,
    Cancelled = 7,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Created,
            1 => TaskState::Running,
            2 => TaskState::Pausing,
            3 => TaskState::Paused,
            4 => TaskState::Finishing,
            5 => TaskState::Finished,
            6 => TaskState::Exceptionally,
            _ => TaskState::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Exceptionally | TaskState::Cancelled
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::Running => "running",
            TaskState::Pausing => "pausing",
            TaskState::Paused => "paused",
            TaskState::Finishing => "finishing",
            TaskState::Finished => "finished",
            TaskState::Exceptionally => "exceptionally",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type Callback<R> = Box<dyn FnOnce(&TaskHandle<R>) + Send + 'static>;

struct Task<R> {
    id: u64,
    name: &'static str,
    state: AtomicU8,
    // Held by the worker for a whole run slice; this is what keeps a task
    // on one thread at a time even when a resume races a finishing pause.
    body: Mutex<Option<Box<dyn TaskBody<R>>>>,
    // Every transition other than Created -> Running happens while this
    // lock is held, and every one of them notifies `changed`.
    outcome: Mutex<Option<Result<R, TaskError>>>,
    changed: Condvar,
    callback: Mutex<Option<Callback<R>>>,
    executor: Arc<dyn Executor>,
}

/// Shared handle to a submitted task.
pub struct TaskHandle<R> {
    inner: Arc<Task<R>>,
}

impl<R> Clone for TaskHandle<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

impl<R> TaskHandle<R> {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Name of the terminal operation this task runs.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.state() == TaskState::Paused
    }

    pub fn is_successful(&self) -> bool {
        self.state() == TaskState::Finished
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<R: Send + 'static> TaskHandle<R> {
    pub(crate) fn new(
        body: Box<dyn TaskBody<R>>,
        executor: Arc<dyn Executor>,
        callback: Option<Callback<R>>,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let name = body.name();
        Self {
            inner: Arc::new(Task {
                id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
                name,
                state: AtomicU8::new(TaskState::Created as u8),
                body: Mutex::new(Some(body)),
                outcome: Mutex::new(None),
                changed: Condvar::new(),
                callback: Mutex::new(callback),
                executor,
            }),
        }
    }

    pub(crate) fn begin(&self) {
        if self.transition(TaskState::Created, TaskState::Running) {
            log::debug!("Task {} ({}) submitted to {}", self.id(), self.name(), self.inner.executor.name());
            self.schedule();
        }
    }

    /// Hands one run slice to the executor. A rejected submission fails
    /// the task so that no waiter is left blocked on it.
    fn schedule(&self) -> bool {
        let handle = self.clone();
        match self.inner.executor.execute(Box::new(move || handle.run())) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Task {} ({}) could not be scheduled: {}", self.id(), self.name(), e);
                if let Some(mut body) = self.inner.body.try_lock() {
                    *body = None;
                }
                self.complete(Err(TaskError::Failed(Failure::from_error(e.into()))));
                false
            }
        }
    }

    /// One run slice: steps the body until it completes, fails, or a
    /// pause or cancellation is observed at a suspension point.
    fn run(&self) {
        let mut slot = self.inner.body.lock();

        loop {
            match self.state() {
                TaskState::Running => {}
                TaskState::Pausing => {
                    if self.settle_pause() {
                        return;
                    }
                    continue;
                }
                TaskState::Cancelled => {
                    *slot = None;
                    log::trace!("Task {} worker observed cancellation", self.id());
                    return;
                }
                _ => return,
            }

            let Some(body) = slot.as_mut() else {
                return;
            };

            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body.step())) {
                Ok(Step::Continue) => continue,
                Ok(Step::Done(value)) => Ok(value),
                Ok(Step::Failed(e)) => Err(TaskError::Failed(Failure::from_error(e))),
                Err(payload) => Err(TaskError::Failed(Failure::from_panic(payload))),
            };

            *slot = None;
            drop(slot);
            self.complete(outcome);
            return;
        }
    }

    /// Publishes `Paused` if the pause request still stands. Returns false
    /// when a resume retracted it first.
    fn settle_pause(&self) -> bool {
        let _outcome = self.inner.outcome.lock();
        if self.transition(TaskState::Pausing, TaskState::Paused) {
            log::trace!("Task {} paused", self.id());
            self.inner.changed.notify_all();
            true
        } else {
            false
        }
    }

    fn complete(&self, outcome: Result<R, TaskError>) {
        let target = if outcome.is_ok() {
            TaskState::Finished
        } else {
            TaskState::Exceptionally
        };

        {
            let mut slot = self.inner.outcome.lock();
            loop {
                let current = self.state();
                match current {
                    TaskState::Running | TaskState::Pausing => {
                        if self.transition(current, TaskState::Finishing) {
                            break;
                        }
                    }
                    _ => {
                        log::debug!("Task {} outcome discarded, state is {}", self.id(), current);
                        return;
                    }
                }
            }

            if let Err(e) = &outcome {
                log::warn!("Task {} ({}) failed: {}", self.id(), self.name(), e);
            }

            *slot = Some(outcome);
            self.inner.state.store(target as u8, Ordering::Release);
            self.inner.changed.notify_all();
        }

        log::debug!("Task {} ({}) {}", self.id(), self.name(), target);
        self.fire_callback();
    }

    fn fire_callback(&self) {
        let callback = self.inner.callback.lock().take();
        if let Some(callback) = callback {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(self))).is_err() {
                log::warn!("Completion callback of task {} panicked", self.id());
            }
        }
    }

    /// Requests a pause. The worker honours it before pulling its next
    /// element; returns false if the task is not running.
    pub fn pause(&self) -> bool {
        let _outcome = self.inner.outcome.lock();
        match self.state() {
            TaskState::Running => {
                let requested = self.transition(TaskState::Running, TaskState::Pausing);
                if requested {
                    log::trace!("Task {} pause requested", self.id());
                    self.inner.changed.notify_all();
                }
                requested
            }
            TaskState::Pausing | TaskState::Paused => true,
            _ => false,
        }
    }

    /// Resumes a paused task on its executor, or retracts a pause request
    /// the worker has not acted on yet. Returns false if there was nothing
    /// to resume or the executor refused the task, which then fails.
    pub fn resume(&self) -> bool {
        let resubmit = {
            let _outcome = self.inner.outcome.lock();
            let resubmit = match self.state() {
                TaskState::Pausing => {
                    if !self.transition(TaskState::Pausing, TaskState::Running) {
                        return false;
                    }
                    false
                }
                TaskState::Paused => {
                    if !self.transition(TaskState::Paused, TaskState::Running) {
                        return false;
                    }
                    true
                }
                _ => return false,
            };
            self.inner.changed.notify_all();
            resubmit
        };

        log::trace!("Task {} resumed", self.id());
        if resubmit {
            return self.schedule();
        }
        true
    }

    /// Requests a pause and blocks until the worker parks. Returns false if
    /// the task ended, was resumed, or was never running.
    pub fn await_pausing(&self) -> bool {
        let mut outcome = self.inner.outcome.lock();
        if self.state() == TaskState::Running {
            self.transition(TaskState::Running, TaskState::Pausing);
        }

        while self.state() == TaskState::Pausing {
            self.inner.changed.wait(&mut outcome);
        }

        self.state() == TaskState::Paused
    }

    /// Cancels the task. A running task is only cancelled when `force` is
    /// set; the element callback in flight still runs to completion.
    pub fn cancel(&self, force: bool) -> bool {
        {
            let _outcome = self.inner.outcome.lock();
            loop {
                let current = self.state();
                let allowed = match current {
                    TaskState::Created | TaskState::Paused => true,
                    TaskState::Running | TaskState::Pausing => force,
                    _ => false,
                };

                if !allowed {
                    return false;
                }
                if self.transition(current, TaskState::Cancelled) {
                    break;
                }
            }
            self.inner.changed.notify_all();
        }

        // Paused tasks give back their sequence now; a running worker drops
        // it at its next suspension point.
        if let Some(mut body) = self.inner.body.try_lock() {
            *body = None;
        }

        log::debug!("Task {} ({}) cancelled", self.id(), self.name());
        self.fire_callback();
        true
    }

    /// Non-blocking poll; `None` until the task reaches a terminal state.
    pub fn try_get(&self) -> Option<Result<R, TaskError>>
    where
        R: Clone,
    {
        let outcome = self.inner.outcome.lock();
        self.read_outcome(&outcome)
    }

    /// Blocks until the task reaches a terminal state.
    pub fn get(&self) -> Result<R, TaskError>
    where
        R: Clone,
    {
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(result) = self.read_outcome(&outcome) {
                return result;
            }
            self.inner.changed.wait(&mut outcome);
        }
    }

    /// Blocks for at most `timeout`. Timing out leaves the task running; a
    /// timeout past the clock's range waits without a deadline.
    pub fn get_timeout(&self, timeout: Duration) -> Result<R, TaskError>
    where
        R: Clone,
    {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.get();
        };
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(result) = self.read_outcome(&outcome) {
                return result;
            }
            if self.inner.changed.wait_until(&mut outcome, deadline).timed_out() {
                return self
                    .read_outcome(&outcome)
                    .unwrap_or(Err(TaskError::Timeout(timeout)));
            }
        }
    }

    fn read_outcome(&self, outcome: &Option<Result<R, TaskError>>) -> Option<Result<R, TaskError>>
    where
        R: Clone,
    {
        match self.state() {
            TaskState::Cancelled => Some(Err(TaskError::Cancelled)),
            TaskState::Finished | TaskState::Exceptionally => outcome.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runner::{Count, ForEach};
    use crate::engine::scheduler::{ExecutorError, InlineExecutor, Job, ThreadPerTask};
    use crate::engine::stage::Sequence;
    use crate::utils::logging::LoggingUtils;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::{channel, Receiver};
    use std::thread;

    /// Accepts the first `accept` jobs and runs them inline, then refuses.
    struct Refusing {
        accept: AtomicUsize,
    }

    impl Executor for Refusing {
        fn execute(&self, job: Job) -> Result<(), ExecutorError> {
            let left = self.accept.load(Ordering::SeqCst);
            if left == 0 {
                return Err(ExecutorError::Stopped {
                    executor: "refusing".to_string(),
                });
            }
            self.accept.store(left - 1, Ordering::SeqCst);
            job();
            Ok(())
        }
    }

    fn threaded() -> Arc<dyn Executor> {
        Arc::new(ThreadPerTask::new("task-unit"))
    }

    fn recorded(range: std::ops::Range<i32>, log: Arc<Mutex<Vec<i32>>>) -> Sequence<i32> {
        Box::new(range.inspect(move |v| log.lock().push(*v)))
    }

    /// Task whose action blocks on the first element until `gate` fires.
    fn gated_task(executor: Arc<dyn Executor>) -> (TaskHandle<()>, Receiver<()>, std::sync::mpsc::Sender<()>) {
        let (started_tx, started_rx) = channel();
        let (gate_tx, gate_rx) = channel::<()>();
        let mut first = true;
        let body = ForEach::new(Box::new(0..3) as Sequence<i32>, move |_v: i32| {
            if first {
                first = false;
                let _ = started_tx.send(());
                let _ = gate_rx.recv();
            }
        });
        (TaskHandle::new(Box::new(body), executor, None), started_rx, gate_tx)
    }

    #[test]
    fn test_inline_task_completes_before_begin_returns() {
        let body = Count::new(Box::new(0..10) as Sequence<i32>, |v: &i32| v % 3 == 0);
        let task = TaskHandle::new(Box::new(body), Arc::new(InlineExecutor), None);
        assert_eq!(task.state(), TaskState::Created);
        assert!(!task.is_done());

        task.begin();
        assert!(task.is_done());
        assert!(task.is_successful());
        assert_eq!(task.try_get().unwrap().unwrap(), 4);
        assert_eq!(task.name(), "count");
    }

    #[test]
    fn test_is_done_never_reverts() {
        let body = ForEach::new(Box::new(0..3) as Sequence<i32>, |_v: i32| {});
        let task = TaskHandle::new(Box::new(body), Arc::new(InlineExecutor), None);
        task.begin();
        assert!(task.is_done());

        assert!(!task.pause());
        assert!(!task.resume());
        assert!(!task.cancel(true));
        assert!(task.is_done());
        assert!(task.is_successful());
    }

    #[test]
    fn test_panic_in_action_fails_task() {
        let body = ForEach::new(Box::new(0..3) as Sequence<i32>, |v: i32| {
            if v == 1 {
                panic!("element {} rejected", v);
            }
        });
        let task = TaskHandle::new(Box::new(body), threaded(), None);
        task.begin();

        let err = task.get().unwrap_err();
        assert_eq!(task.state(), TaskState::Exceptionally);
        assert_eq!(err.failure().and_then(Failure::panic_message), Some("element 1 rejected"));
    }

    #[test]
    fn test_cancel_running_requires_force() {
        LoggingUtils::init_test_logger();
        let (task, started, gate) = gated_task(threaded());
        task.begin();
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(!task.cancel(false));
        assert_eq!(task.state(), TaskState::Running);

        assert!(task.cancel(true));
        assert!(task.is_cancelled());
        assert!(task.get().unwrap_err().is_cancelled());

        gate.send(()).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_cancel_before_begin_prevents_execution() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let body = ForEach::new(Box::new(0..3) as Sequence<i32>, move |_v: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let task = TaskHandle::new(Box::new(body), Arc::new(InlineExecutor), None);

        assert!(task.cancel(false));
        task.begin();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(task.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_pause_resume_loses_no_elements() {
        let pulled = Arc::new(Mutex::new(Vec::new()));
        let visited = Arc::new(Mutex::new(Vec::new()));
        let sink = visited.clone();
        let body = ForEach::new(recorded(0..30, pulled.clone()), move |v: i32| {
            thread::sleep(Duration::from_millis(2));
            sink.lock().push(v);
        });
        let task = TaskHandle::new(Box::new(body), threaded(), None);
        task.begin();

        while visited.lock().len() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(task.await_pausing());
        assert!(task.is_paused());

        let snapshot = visited.lock().clone();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(*visited.lock(), snapshot);
        assert_eq!(*pulled.lock(), snapshot);

        assert!(task.resume());
        task.get().unwrap();

        let expected: Vec<i32> = (0..30).collect();
        assert_eq!(*visited.lock(), expected);
        assert_eq!(*pulled.lock(), expected);
    }

    #[test]
    fn test_resume_retracts_pending_pause() {
        let (task, started, gate) = gated_task(threaded());
        task.begin();
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(task.pause());
        assert_eq!(task.state(), TaskState::Pausing);
        assert!(task.resume());
        assert_eq!(task.state(), TaskState::Running);

        gate.send(()).unwrap();
        task.get().unwrap();
        assert!(task.is_successful());
    }

    #[test]
    fn test_cancel_paused_task() {
        let (task, started, gate) = gated_task(threaded());
        task.begin();
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(task.pause());
        gate.send(()).unwrap();
        while !task.is_paused() {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(task.cancel(false));
        assert!(!task.resume());
        assert!(task.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_timed_get_leaves_task_running() {
        let body = ForEach::new(Box::new(0..10) as Sequence<i32>, |_v: i32| {
            thread::sleep(Duration::from_millis(5));
        });
        let task = TaskHandle::new(Box::new(body), threaded(), None);
        task.begin();

        let err = task.get_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_timeout());
        assert!(!task.is_done());

        task.get().unwrap();
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[test]
    fn test_concurrent_joiners_all_wake() {
        let body = Count::new(Box::new(0..50) as Sequence<i32>, |_v: &i32| {
            thread::sleep(Duration::from_millis(1));
            true
        });
        let task = TaskHandle::new(Box::new(body), threaded(), None);

        let joiners: Vec<_> = (0..8)
            .map(|_| {
                let task = task.clone();
                thread::spawn(move || task.get())
            })
            .collect();

        task.begin();
        for joiner in joiners {
            assert_eq!(joiner.join().unwrap().unwrap(), 50);
        }
    }

    #[test]
    fn test_callback_fires_once_after_waiters_released() {
        let (tx, rx) = channel();
        let callback: Callback<usize> = Box::new(move |task: &TaskHandle<usize>| {
            tx.send((task.state(), task.try_get().map(|r| r.ok()))).unwrap();
        });
        let body = Count::new(Box::new(0..4) as Sequence<i32>, |_v: &i32| true);
        let task = TaskHandle::new(Box::new(body), threaded(), Some(callback));
        task.begin();

        assert_eq!(task.get().unwrap(), 4);
        let (state, value) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(state, TaskState::Finished);
        assert_eq!(value, Some(Some(4)));
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_rejected_submission_fails_task() {
        let (tx, rx) = channel();
        let callback: Callback<usize> = Box::new(move |task: &TaskHandle<usize>| tx.send(task.state()).unwrap());
        let body = Count::new(Box::new(0..4) as Sequence<i32>, |_v: &i32| true);
        let refusing = Arc::new(Refusing { accept: AtomicUsize::new(0) });
        let task = TaskHandle::new(Box::new(body), refusing, Some(callback));
        task.begin();

        assert_eq!(task.state(), TaskState::Exceptionally);
        let err = task.get_timeout(Duration::from_secs(5)).unwrap_err();
        let failure = err.failure().unwrap();
        assert!(matches!(failure.downcast_ref::<ExecutorError>(), Some(ExecutorError::Stopped { .. })));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), TaskState::Exceptionally);
    }

    #[test]
    fn test_rejected_resume_fails_paused_task() {
        let visited = Arc::new(AtomicUsize::new(0));
        let counter = visited.clone();
        let body = ForEach::new(Box::new(0..5) as Sequence<i32>, move |_v: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let refusing = Arc::new(Refusing { accept: AtomicUsize::new(1) });
        let task = TaskHandle::new(Box::new(body), refusing, None);

        // Inline first slice: park before the first pull.
        assert!(task.transition(TaskState::Created, TaskState::Pausing));
        assert!(task.schedule());
        assert!(task.is_paused());

        assert!(!task.resume());
        assert_eq!(task.state(), TaskState::Exceptionally);
        assert!(task.get().unwrap_err().failure().is_some());
        assert_eq!(visited.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unbounded_timeout_waits_for_result() {
        let body = Count::new(Box::new(0..3) as Sequence<i32>, |_v: &i32| {
            thread::sleep(Duration::from_millis(2));
            true
        });
        let task = TaskHandle::new(Box::new(body), threaded(), None);
        task.begin();
        assert_eq!(task.get_timeout(Duration::MAX).unwrap(), 3);
    }
}
