// Tue Jan 13 2026 - Alex

//! Pipeline stages over a lazy, single-pass [`Sequence`].
//!
//! Stateless stages (`map`, `filter`, `flat_map`, `peek`) are the standard
//! iterator adapters. The stages here carry state of their own: `Distinct`
//! remembers every value it has emitted, `Limit` counts, `Sorted` and
//! `Repeat` buffer.

use crate::utils::logging::scoped_timer;
use ahash::AHashSet;
use std::cmp::Ordering;
use std::hash::Hash;

/// A lazy, single-pass producer of elements in source order. Owned
/// exclusively by whichever builder or task currently holds it.
pub type Sequence<T> = Box<dyn Iterator<Item = T> + Send + 'static>;

pub type Comparator<T> = Box<dyn FnMut(&T, &T) -> Ordering + Send + 'static>;

/// Emits the first occurrence of each value, in first-occurrence order.
/// Memory grows with the number of distinct values seen.
pub struct Distinct<I: Iterator> {
    upstream: I,
    seen: AHashSet<I::Item>,
}

impl<I> Distinct<I>
where
    I: Iterator,
    I::Item: Hash + Eq + Clone,
{
    pub fn new(upstream: I) -> Self {
        Self {
            upstream,
            seen: AHashSet::new(),
        }
    }
}

impl<I> Iterator for Distinct<I>
where
    I: Iterator,
    I::Item: Hash + Eq + Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.upstream.next()?;
            if self.seen.insert(item.clone()) {
                return Some(item);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (_, upper) = self.upstream.size_hint();
        (0, upper)
    }
}

/// Emits at most `limit` elements. Upstream is never pulled once the
/// limit is reached, so an infinite source is safe.
pub struct Limit<I> {
    upstream: I,
    remaining: usize,
}

impl<I: Iterator> Limit<I> {
    pub fn new(upstream: I, limit: usize) -> Self {
        Self {
            upstream,
            remaining: limit,
        }
    }
}

impl<I: Iterator> Iterator for Limit<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.upstream.next()?;
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.upstream.size_hint();
        let upper = upper.map_or(self.remaining, |u| u.min(self.remaining));
        (lower.min(self.remaining), Some(upper))
    }
}

/// Eager buffering stage, not a streaming one.
///
/// The first pull drains the whole upstream into a buffer (O(n) memory),
/// sorts it (O(n log n)) and then replays it. An infinite upstream never
/// yields. The drain runs on whichever thread pulls first, which for a
/// task is its worker, and cannot be paused or cancelled part way.
pub struct Sorted<T> {
    upstream: Option<Sequence<T>>,
    comparator: Option<Comparator<T>>,
    buffer: std::vec::IntoIter<T>,
}

impl<T: Send + 'static> Sorted<T> {
    pub fn by(upstream: Sequence<T>, comparator: Comparator<T>) -> Self {
        Self {
            upstream: Some(upstream),
            comparator: Some(comparator),
            buffer: Vec::new().into_iter(),
        }
    }

    fn materialize(&mut self) {
        let Some(upstream) = self.upstream.take() else {
            return;
        };

        let _timer = scoped_timer("sorted stage materialization");
        // Grown by push; `extend` would reserve from the upstream's hint.
        let mut buffer: Vec<T> = Vec::new();
        for item in upstream {
            buffer.push(item);
        }

        if let Some(mut comparator) = self.comparator.take() {
            buffer.sort_by(|a, b| comparator(a, b));
        }

        log::trace!("Sorted stage buffered {} elements", buffer.len());
        self.buffer = buffer.into_iter();
    }
}

impl<T: Ord + Send + 'static> Sorted<T> {
    pub fn natural(upstream: Sequence<T>) -> Self {
        Self::by(upstream, Box::new(|a: &T, b: &T| a.cmp(b)))
    }
}

impl<T: Send + 'static> Iterator for Sorted<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.materialize();
        self.buffer.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.upstream {
            Some(upstream) => upstream.size_hint(),
            None => self.buffer.size_hint(),
        }
    }
}

/// Streams the source once while recording it, then replays the recording
/// `repeats` more times in the same order.
pub struct Repeat<I: Iterator> {
    upstream: Option<I>,
    recorded: Vec<I::Item>,
    repeats: usize,
    cursor: usize,
}

impl<I> Repeat<I>
where
    I: Iterator,
    I::Item: Clone,
{
    pub fn new(upstream: I, repeats: usize) -> Self {
        Self {
            upstream: Some(upstream),
            recorded: Vec::new(),
            repeats,
            cursor: 0,
        }
    }
}

impl<I> Iterator for Repeat<I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(upstream) = self.upstream.as_mut() {
            match upstream.next() {
                Some(item) => {
                    if self.repeats > 0 {
                        self.recorded.push(item.clone());
                    }
                    return Some(item);
                }
                None => self.upstream = None,
            }
        }

        loop {
            if self.repeats == 0 || self.recorded.is_empty() {
                return None;
            }
            if self.cursor < self.recorded.len() {
                let item = self.recorded[self.cursor].clone();
                self.cursor += 1;
                return Some(item);
            }
            self.cursor = 0;
            self.repeats -= 1;
        }
    }
}
