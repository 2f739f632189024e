// Tue Jan 13 2026 - Alex

use crate::engine::result::TaskError;
use crate::engine::runner::{
    Collect, Count, FindFirst, Fold, ForEach, Match, MatchMode, Reduce, TaskBody, TryForEach,
};
use crate::engine::scheduler::Executor;
use crate::engine::stage::{Distinct, Limit, Repeat, Sequence, Sorted};
use crate::engine::task::{Callback, TaskHandle};
use ahash::AHashSet;
use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Chains pipeline stages over a sequence until a terminal operation is
/// chosen. Every method consumes the builder, so a sequence can only ever
/// feed one task.
pub struct PipelineBuilder<T> {
    sequence: Sequence<T>,
    executor: Arc<dyn Executor>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    pub fn new<I>(source: I, executor: Arc<dyn Executor>) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            sequence: Box::new(source.into_iter()),
            executor,
        }
    }

    fn stage<U, I, F>(self, wrap: F) -> PipelineBuilder<U>
    where
        I: Iterator<Item = U> + Send + 'static,
        F: FnOnce(Sequence<T>) -> I,
    {
        PipelineBuilder {
            sequence: Box::new(wrap(self.sequence)),
            executor: self.executor,
        }
    }

    pub fn map<U, F>(self, mapper: F) -> PipelineBuilder<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        self.stage(|s| s.map(mapper))
    }

    pub fn flat_map<U, I, F>(self, mapper: F) -> PipelineBuilder<U>
    where
        U: Send + 'static,
        I: IntoIterator<Item = U> + Send + 'static,
        I::IntoIter: Send + 'static,
        F: FnMut(T) -> I + Send + 'static,
    {
        self.stage(|s| s.flat_map(mapper))
    }

    /// `flat_map` for mappers that produce an owned buffer per element.
    pub fn array_flat_map<U, F>(self, mapper: F) -> PipelineBuilder<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Vec<U> + Send + 'static,
    {
        self.flat_map(mapper)
    }

    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.stage(|s| s.filter(predicate))
    }

    pub fn distinct(self) -> Self
    where
        T: Hash + Eq + Clone,
    {
        self.stage(|s| Distinct::new(s))
    }

    /// Replays the whole sequence `repeats` additional times.
    pub fn repeat(self, repeats: usize) -> Self
    where
        T: Clone,
    {
        self.stage(|s| Repeat::new(s, repeats))
    }

    pub fn limit(self, limit: usize) -> Self {
        self.stage(|s| Limit::new(s, limit))
    }

    /// Natural-order sort. Buffers the entire upstream on first pull; see
    /// [`Sorted`].
    pub fn sorted(self) -> Self
    where
        T: Ord,
    {
        self.stage(|s| Sorted::natural(s))
    }

    /// Sort with `comparator`. Buffers the entire upstream on first pull.
    pub fn sorted_by<C>(self, comparator: C) -> Self
    where
        C: FnMut(&T, &T) -> Ordering + Send + 'static,
    {
        self.stage(|s| Sorted::by(s, Box::new(comparator)))
    }

    /// Calls `action` on each element before downstream sees it.
    pub fn peek<F>(self, action: F) -> Self
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.stage(|s| s.inspect(action))
    }

    fn terminal<R, B, F>(self, bind: F) -> TaskBuilder<R>
    where
        R: Send + 'static,
        B: TaskBody<R> + 'static,
        F: FnOnce(Sequence<T>) -> B,
    {
        TaskBuilder {
            body: Box::new(bind(self.sequence)),
            executor: self.executor,
            callback: None,
        }
    }

    pub fn for_each<F>(self, action: F) -> TaskBuilder<()>
    where
        F: FnMut(T) + Send + 'static,
    {
        self.terminal(|s| ForEach::new(s, action))
    }

    /// Like `for_each`, but an `Err` from `action` fails the task with that
    /// error as its cause.
    pub fn try_for_each<F>(self, action: F) -> TaskBuilder<()>
    where
        F: FnMut(T) -> anyhow::Result<()> + Send + 'static,
    {
        self.terminal(|s| TryForEach::new(s, action))
    }

    /// Left fold seeded from the first element; `None` for an empty sequence.
    pub fn reduce<F>(self, op: F) -> TaskBuilder<Option<T>>
    where
        F: FnMut(T, T) -> T + Send + 'static,
    {
        self.terminal(|s| Reduce::new(s, op))
    }

    pub fn fold<A, F>(self, identity: A, op: F) -> TaskBuilder<A>
    where
        A: Send + 'static,
        F: FnMut(A, T) -> A + Send + 'static,
    {
        self.terminal(|s| Fold::new(s, identity, op))
    }

    /// Appends every element to `into`; the task's result is `into` itself.
    pub fn collect<C>(self, into: C) -> TaskBuilder<C>
    where
        C: Extend<T> + Send + 'static,
    {
        self.terminal(|s| Collect::new(s, into))
    }

    pub fn collect_vec(self) -> TaskBuilder<Vec<T>> {
        self.collect(Vec::new())
    }

    pub fn collect_set(self) -> TaskBuilder<AHashSet<T>>
    where
        T: Hash + Eq,
    {
        self.collect(AHashSet::new())
    }

    pub fn count<P>(self, predicate: P) -> TaskBuilder<usize>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.terminal(|s| Count::new(s, predicate))
    }

    pub fn count_all(self) -> TaskBuilder<usize> {
        self.count(|_| true)
    }

    pub fn match_any<P>(self, predicate: P) -> TaskBuilder<bool>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.matching(predicate, MatchMode::Any)
    }

    pub fn match_none<P>(self, predicate: P) -> TaskBuilder<bool>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.matching(predicate, MatchMode::None)
    }

    pub fn match_all<P>(self, predicate: P) -> TaskBuilder<bool>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.matching(predicate, MatchMode::All)
    }

    fn matching<P>(self, predicate: P, mode: MatchMode) -> TaskBuilder<bool>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.terminal(|s| Match::new(s, predicate, mode))
    }

    pub fn find_first<P>(self, predicate: P) -> TaskBuilder<Option<T>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.terminal(|s| FindFirst::new(s, predicate))
    }
}

/// A terminal operation waiting to be submitted. Configuration is only
/// reachable from here, after the operation has been chosen.
pub struct TaskBuilder<R> {
    body: Box<dyn TaskBody<R>>,
    executor: Arc<dyn Executor>,
    callback: Option<Callback<R>>,
}

impl<R: Send + 'static> TaskBuilder<R> {
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Runs once after the task finishes, fails, or is cancelled, on the
    /// thread that made the transition. Replaces any earlier callback.
    pub fn on_completion<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&TaskHandle<R>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Submits the task and returns without waiting.
    pub fn execute(self) -> TaskHandle<R> {
        let handle = TaskHandle::new(self.body, self.executor, self.callback);
        handle.begin();
        handle
    }

    pub fn join(self) -> Result<R, TaskError>
    where
        R: Clone,
    {
        self.execute().get()
    }

    /// On timeout the task keeps running in the background.
    pub fn join_timeout(self, timeout: Duration) -> Result<R, TaskError>
    where
        R: Clone,
    {
        self.execute().get_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::{InlineExecutor, ThreadPerTask};
    use parking_lot::Mutex;
    use std::thread;

    fn inline<T, I>(source: I) -> PipelineBuilder<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        PipelineBuilder::new(source, Arc::new(InlineExecutor))
    }

    #[test]
    fn test_for_each_visits_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        inline(vec![4, 8, 15, 16, 23, 42])
            .for_each(move |v| sink.lock().push(v))
            .join()
            .unwrap();
        assert_eq!(*seen.lock(), vec![4, 8, 15, 16, 23, 42]);
    }

    #[test]
    fn test_distinct_limit_fold() {
        let out = inline(vec![5, 3, 5, 2, 8, 3]).distinct().collect_vec().join().unwrap();
        assert_eq!(out, vec![5, 3, 2, 8]);

        let out = inline(vec![5, 3, 5, 2, 8, 3]).distinct().limit(3).collect_vec().join().unwrap();
        assert_eq!(out, vec![5, 3, 2]);

        let sum = inline(vec![5, 3, 5, 2, 8, 3]).distinct().limit(3).fold(0, |a, b| a + b).join().unwrap();
        assert_eq!(sum, 10);
    }

    #[test]
    fn test_reduce_without_identity() {
        assert_eq!(inline(vec![9]).reduce(|a, b| a + b).join().unwrap(), Some(9));
        assert_eq!(inline(vec![1, 2, 3]).reduce(|a, b| a + b).join().unwrap(), Some(6));
        assert_eq!(inline(Vec::<i32>::new()).reduce(|a, b| a + b).join().unwrap(), None);
    }

    #[test]
    fn test_match_defaults_on_empty() {
        assert!(!inline(Vec::<i32>::new()).match_any(|_| true).join().unwrap());
        assert!(inline(Vec::<i32>::new()).match_all(|_| false).join().unwrap());
        assert!(inline(Vec::<i32>::new()).match_none(|_| true).join().unwrap());
    }

    #[test]
    fn test_match_any_stops_infinite_source() {
        let found = inline(0u64..).map(|v| v * 3).match_any(|v| *v > 100).join().unwrap();
        assert!(found);
    }

    #[test]
    fn test_stage_chain() {
        let peeked = Arc::new(Mutex::new(Vec::new()));
        let sink = peeked.clone();

        let out = inline(vec![3, 1, 2])
            .map(|v| v * 10)
            .flat_map(|v| vec![v, v + 1])
            .filter(|v| v % 2 == 0)
            .peek(move |v| sink.lock().push(*v))
            .sorted_by(|a, b| b.cmp(a))
            .repeat(1)
            .collect_vec()
            .join()
            .unwrap();

        assert_eq!(out, vec![30, 20, 10, 30, 20, 10]);
        assert_eq!(*peeked.lock(), vec![30, 10, 20]);
    }

    #[test]
    fn test_array_flat_map_and_sorted() {
        let out = inline(vec!["b a", "c"])
            .array_flat_map(|s| s.split(' ').map(str::to_string).collect::<Vec<String>>())
            .sorted()
            .collect_vec()
            .join()
            .unwrap();
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_collect_into_existing_collection() {
        let out = inline(vec![3, 4]).collect(vec![1, 2]).join().unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);

        let set = inline(vec![1, 1, 2]).collect_set().join().unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_count_and_find_first() {
        assert_eq!(inline(1..=10).count(|v| v % 2 == 0).join().unwrap(), 5);
        assert_eq!(inline(1..=10).count_all().join().unwrap(), 10);
        assert_eq!(inline(vec![1, 4, 6]).find_first(|v| *v > 3).join().unwrap(), Some(4));
        assert_eq!(inline(vec![1, 2]).find_first(|v| *v > 3).join().unwrap(), None);
    }

    #[test]
    fn test_try_for_each_error_is_cause() {
        let err = inline(vec![1, 2, 3])
            .try_for_each(|v| {
                anyhow::ensure!(v < 2, "value {} too large", v);
                Ok(())
            })
            .join()
            .unwrap_err();

        let failure = err.failure().unwrap();
        assert_eq!(failure.to_string(), "value 2 too large");
    }

    #[test]
    fn test_panicking_mapper_fails_task() {
        let err = inline(vec![1, 0, 2])
            .map(|v| 10 / v)
            .collect_vec()
            .join()
            .unwrap_err();
        assert!(err.failure().and_then(|f| f.panic_message()).is_some());
    }

    #[test]
    fn test_executor_override_moves_work_off_caller() {
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let sink = ran_on.clone();

        inline(vec![1])
            .for_each(move |_| *sink.lock() = Some(thread::current().id()))
            .executor(Arc::new(ThreadPerTask::new("override")))
            .join()
            .unwrap();

        let worker = ran_on.lock().expect("task ran");
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_on_completion_sees_result() {
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();

        let handle = inline(vec![1, 2, 3])
            .fold(0, |a, b| a + b)
            .on_completion(move |task| *sink.lock() = task.try_get().and_then(|r| r.ok()))
            .execute();

        assert!(handle.is_successful());
        assert_eq!(*observed.lock(), Some(6));
    }

    #[test]
    fn test_join_timeout_then_join_again() {
        let handle = inline(0..10)
            .for_each(|_| thread::sleep(Duration::from_millis(5)))
            .executor(Arc::new(ThreadPerTask::new("slow")))
            .execute();

        assert!(handle.get_timeout(Duration::from_millis(10)).unwrap_err().is_timeout());
        assert!(!handle.is_done());
        handle.get().unwrap();
        assert!(handle.is_successful());
    }

    #[test]
    fn test_join_after_forced_cancel() {
        let handle = inline(0..1000)
            .for_each(|_| thread::sleep(Duration::from_millis(1)))
            .executor(Arc::new(ThreadPerTask::new("cancel")))
            .execute();

        assert!(handle.cancel(true));
        assert!(handle.get().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_join_timeout() {
        let slow = inline(0..10)
            .for_each(|_| thread::sleep(Duration::from_millis(5)))
            .executor(Arc::new(ThreadPerTask::new("join-slow")))
            .join_timeout(Duration::from_millis(10));
        assert!(slow.unwrap_err().is_timeout());

        let sum = inline(vec![1, 2, 3])
            .fold(0, |a, b| a + b)
            .executor(Arc::new(ThreadPerTask::new("join-fast")))
            .join_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(sum, 6);
    }

    #[test]
    fn test_join_timeout_without_deadline() {
        let count = inline(vec![1, 2, 3])
            .count_all()
            .executor(Arc::new(ThreadPerTask::new("join-max")))
            .join_timeout(Duration::MAX)
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_huge_lazy_source_streams() {
        let out = inline(0..u64::MAX).repeat(1).limit(3).collect_vec().join().unwrap();
        assert_eq!(out, vec![0, 1, 2]);

        let out = inline(0..u64::MAX).limit(4).sorted_by(|a, b| b.cmp(a)).collect_vec().join().unwrap();
        assert_eq!(out, vec![3, 2, 1, 0]);

        // Selecting the terminal must not allocate for the whole source.
        let pending = inline(0u64..2_000_000_000_000).collect_vec();
        drop(pending);
    }
}
