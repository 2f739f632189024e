// Tue Jan 13 2026 - Alex

use crate::engine::stage::Sequence;
use anyhow::anyhow;

/// Outcome of pulling at most one element through a terminal operation.
pub enum Step<R> {
    Continue,
    Done(R),
    Failed(anyhow::Error),
}

/// A terminal operation bound to its sequence. The task calls `step`
/// once per suspension point; everything the operation accumulates lives
/// in the body, so a paused task resumes exactly where it stopped.
pub trait TaskBody<R>: Send {
    fn step(&mut self) -> Step<R>;

    fn name(&self) -> &'static str;
}

fn finish<V>(slot: &mut Option<V>, op: &str) -> Step<V> {
    match slot.take() {
        Some(value) => Step::Done(value),
        None => Step::Failed(anyhow!("{} accumulator was lost by an earlier failure", op)),
    }
}

pub struct ForEach<T, F> {
    sequence: Sequence<T>,
    action: F,
}

impl<T, F> ForEach<T, F>
where
    F: FnMut(T),
{
    pub fn new(sequence: Sequence<T>, action: F) -> Self {
        Self { sequence, action }
    }
}

impl<T, F> TaskBody<()> for ForEach<T, F>
where
    T: Send,
    F: FnMut(T) + Send,
{
    fn step(&mut self) -> Step<()> {
        match self.sequence.next() {
            Some(item) => {
                (self.action)(item);
                Step::Continue
            }
            None => Step::Done(()),
        }
    }

    fn name(&self) -> &'static str {
        "for_each"
    }
}

pub struct TryForEach<T, F> {
    sequence: Sequence<T>,
    action: F,
}

impl<T, F> TryForEach<T, F>
where
    F: FnMut(T) -> anyhow::Result<()>,
{
    pub fn new(sequence: Sequence<T>, action: F) -> Self {
        Self { sequence, action }
    }
}

impl<T, F> TaskBody<()> for TryForEach<T, F>
where
    T: Send,
    F: FnMut(T) -> anyhow::Result<()> + Send,
{
    fn step(&mut self) -> Step<()> {
        match self.sequence.next() {
            Some(item) => match (self.action)(item) {
                Ok(()) => Step::Continue,
                Err(e) => Step::Failed(e),
            },
            None => Step::Done(()),
        }
    }

    fn name(&self) -> &'static str {
        "try_for_each"
    }
}

/// Left fold seeded from the first element. `None` over an empty sequence.
pub struct Reduce<T, F> {
    sequence: Sequence<T>,
    op: F,
    acc: Option<T>,
}

impl<T, F> Reduce<T, F>
where
    F: FnMut(T, T) -> T,
{
    pub fn new(sequence: Sequence<T>, op: F) -> Self {
        Self {
            sequence,
            op,
            acc: None,
        }
    }
}

impl<T, F> TaskBody<Option<T>> for Reduce<T, F>
where
    T: Send,
    F: FnMut(T, T) -> T + Send,
{
    fn step(&mut self) -> Step<Option<T>> {
        match self.sequence.next() {
            Some(item) => {
                self.acc = Some(match self.acc.take() {
                    Some(acc) => (self.op)(acc, item),
                    None => item,
                });
                Step::Continue
            }
            None => Step::Done(self.acc.take()),
        }
    }

    fn name(&self) -> &'static str {
        "reduce"
    }
}

pub struct Fold<T, A, F> {
    sequence: Sequence<T>,
    op: F,
    acc: Option<A>,
}

impl<T, A, F> Fold<T, A, F>
where
    F: FnMut(A, T) -> A,
{
    pub fn new(sequence: Sequence<T>, identity: A, op: F) -> Self {
        Self {
            sequence,
            op,
            acc: Some(identity),
        }
    }
}

impl<T, A, F> TaskBody<A> for Fold<T, A, F>
where
    T: Send,
    A: Send,
    F: FnMut(A, T) -> A + Send,
{
    fn step(&mut self) -> Step<A> {
        match self.sequence.next() {
            Some(item) => {
                if let Some(acc) = self.acc.take() {
                    self.acc = Some((self.op)(acc, item));
                }
                Step::Continue
            }
            None => finish(&mut self.acc, "fold"),
        }
    }

    fn name(&self) -> &'static str {
        "fold"
    }
}

/// Appends into the caller's collection and hands that same collection back.
pub struct Collect<T, C> {
    sequence: Sequence<T>,
    into: Option<C>,
}

impl<T, C> Collect<T, C> {
    pub fn new(sequence: Sequence<T>, into: C) -> Self {
        Self {
            sequence,
            into: Some(into),
        }
    }
}

impl<T, C> TaskBody<C> for Collect<T, C>
where
    T: Send,
    C: Extend<T> + Send,
{
    fn step(&mut self) -> Step<C> {
        match self.sequence.next() {
            Some(item) => {
                if let Some(into) = self.into.as_mut() {
                    into.extend(std::iter::once(item));
                }
                Step::Continue
            }
            None => finish(&mut self.into, "collect"),
        }
    }

    fn name(&self) -> &'static str {
        "collect"
    }
}

pub struct Count<T, P> {
    sequence: Sequence<T>,
    predicate: P,
    count: usize,
}

impl<T, P> Count<T, P>
where
    P: FnMut(&T) -> bool,
{
    pub fn new(sequence: Sequence<T>, predicate: P) -> Self {
        Self {
            sequence,
            predicate,
            count: 0,
        }
    }
}

impl<T, P> TaskBody<usize> for Count<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn step(&mut self) -> Step<usize> {
        match self.sequence.next() {
            Some(item) => {
                if (self.predicate)(&item) {
                    self.count += 1;
                }
                Step::Continue
            }
            None => Step::Done(self.count),
        }
    }

    fn name(&self) -> &'static str {
        "count"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Any,
    None,
    All,
}

impl MatchMode {
    /// The answer when the sequence runs out without a deciding element.
    fn exhausted(self) -> bool {
        match self {
            MatchMode::Any => false,
            MatchMode::None | MatchMode::All => true,
        }
    }

    fn decide(self, hit: bool) -> Option<bool> {
        match (self, hit) {
            (MatchMode::Any, true) => Some(true),
            (MatchMode::None, true) => Some(false),
            (MatchMode::All, false) => Some(false),
            _ => None,
        }
    }
}

/// Short-circuits on the first deciding element.
pub struct Match<T, P> {
    sequence: Sequence<T>,
    predicate: P,
    mode: MatchMode,
}

impl<T, P> Match<T, P>
where
    P: FnMut(&T) -> bool,
{
    pub fn new(sequence: Sequence<T>, predicate: P, mode: MatchMode) -> Self {
        Self {
            sequence,
            predicate,
            mode,
        }
    }
}

impl<T, P> TaskBody<bool> for Match<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn step(&mut self) -> Step<bool> {
        match self.sequence.next() {
            Some(item) => match self.mode.decide((self.predicate)(&item)) {
                Some(answer) => Step::Done(answer),
                None => Step::Continue,
            },
            None => Step::Done(self.mode.exhausted()),
        }
    }

    fn name(&self) -> &'static str {
        match self.mode {
            MatchMode::Any => "match_any",
            MatchMode::None => "match_none",
            MatchMode::All => "match_all",
        }
    }
}

/// Tests each pulled element exactly once and returns the first match.
pub struct FindFirst<T, P> {
    sequence: Sequence<T>,
    predicate: P,
}

impl<T, P> FindFirst<T, P>
where
    P: FnMut(&T) -> bool,
{
    pub fn new(sequence: Sequence<T>, predicate: P) -> Self {
        Self { sequence, predicate }
    }
}

impl<T, P> TaskBody<Option<T>> for FindFirst<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn step(&mut self) -> Step<Option<T>> {
        match self.sequence.next() {
            Some(item) if (self.predicate)(&item) => Step::Done(Some(item)),
            Some(_) => Step::Continue,
            None => Step::Done(None),
        }
    }

    fn name(&self) -> &'static str {
        "find_first"
    }
}
