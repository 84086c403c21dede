//! Merging of lazily produced, ascending time streams.
//!
//! Two modes:
//! - [`OrderedMerge`] merges independent ascending sources into one ascending
//!   stream, pulling from a source only when its previous value was consumed.
//! - [`DynamicTimes`] re-derives its candidates from scratch on every step and
//!   yields only values strictly after the last one it produced. This suits
//!   streams that depend on evolving state, such as "next completion time".

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::iter::FusedIterator;

use crate::error::ValidationError;
use crate::time::SimTime;

/// A boxed, sendable source of scheduling points.
pub type TimeSource = Box<dyn Iterator<Item = SimTime> + Send>;

/// Ascending merge of several ascending sources.
///
/// Duplicates are preserved; ties are emitted in source order. Exhausted
/// sources are dropped permanently and the merge ends once none remain.
///
/// # Examples
///
/// ```
/// use forgecast::merge::OrderedMerge;
///
/// let sources = vec![vec![1, 3, 5].into_iter(), vec![2, 4, 6].into_iter()];
/// let merged: Vec<u32> = OrderedMerge::new(sources).collect();
/// assert_eq!(merged, vec![1, 2, 3, 4, 5, 6]);
/// ```
pub struct OrderedMerge<I: Iterator> {
    sources: Vec<I>,
    heads: BinaryHeap<Reverse<(I::Item, usize)>>,
    primed: bool,
}

impl<I> OrderedMerge<I>
where
    I: Iterator,
    I::Item: Ord,
{
    /// Creates a merge over `sources`. Nothing is pulled until the first `next`.
    pub fn new(sources: impl IntoIterator<Item = I>) -> Self {
        let sources: Vec<I> = sources.into_iter().collect();
        Self {
            heads: BinaryHeap::with_capacity(sources.len()),
            sources,
            primed: false,
        }
    }

    /// Number of sources that may still produce values.
    #[must_use]
    pub fn active_sources(&self) -> usize {
        if self.primed {
            self.heads.len()
        } else {
            self.sources.len()
        }
    }

    fn prime(&mut self) {
        if self.primed {
            return;
        }
        self.primed = true;
        for (idx, source) in self.sources.iter_mut().enumerate() {
            if let Some(value) = source.next() {
                self.heads.push(Reverse((value, idx)));
            }
        }
    }
}

impl<I> Iterator for OrderedMerge<I>
where
    I: Iterator,
    I::Item: Ord,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.prime();
        let Reverse((value, idx)) = self.heads.pop()?;
        if let Some(next) = self.sources[idx].next() {
            self.heads.push(Reverse((next, idx)));
        }
        Some(value)
    }
}

impl<I> FusedIterator for OrderedMerge<I>
where
    I: Iterator,
    I::Item: Ord,
{
}

/// Smallest candidate strictly greater than `after` (any candidate if `None`).
pub fn earliest_after<T, C>(after: Option<&T>, candidates: C) -> Option<T>
where
    T: Ord,
    C: IntoIterator<Item = T>,
{
    candidates
        .into_iter()
        .filter(|c| after.map_or(true, |a| c > a))
        .min()
}

/// A stream re-derived from its source after every step.
///
/// The source closure is queried afresh each time; values at or before the
/// last yielded point are ignored, so re-scanning the same data never
/// yields a point twice.
pub struct DynamicTimes<T, F> {
    source: F,
    last: Option<T>,
    done: bool,
}

impl<T, F, C> DynamicTimes<T, F>
where
    T: Ord + Clone,
    F: FnMut() -> C,
    C: IntoIterator<Item = T>,
{
    /// Creates a stream over the candidates returned by `source`.
    pub fn new(source: F) -> Self {
        Self {
            source,
            last: None,
            done: false,
        }
    }

    /// The last value produced, if any.
    pub fn last_yielded(&self) -> Option<&T> {
        self.last.as_ref()
    }
}

impl<T, F, C> Iterator for DynamicTimes<T, F>
where
    T: Ord + Clone,
    F: FnMut() -> C,
    C: IntoIterator<Item = T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        match earliest_after(self.last.as_ref(), (self.source)()) {
            Some(value) => {
                self.last = Some(value.clone());
                Some(value)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl<T, F, C> FusedIterator for DynamicTimes<T, F>
where
    T: Ord + Clone,
    F: FnMut() -> C,
    C: IntoIterator<Item = T>,
{
}

/// Evenly spaced ticks: `start`, `start + step`, ... up to an optional end (inclusive).
#[derive(Debug, Clone)]
pub struct FixedInterval {
    start: f64,
    step: f64,
    end: Option<SimTime>,
    index: u32,
}

impl FixedInterval {
    /// Creates an interval source.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonPositiveAmount` unless `step` is finite and positive.
    pub fn new(start: SimTime, step: f64, end: Option<SimTime>) -> Result<Self, ValidationError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(ValidationError::NonPositiveAmount {
                field: "step".to_string(),
                value: step,
            });
        }
        Ok(Self {
            start: start.value(),
            step,
            end,
            index: 0,
        })
    }
}

impl Iterator for FixedInterval {
    type Item = SimTime;

    fn next(&mut self) -> Option<SimTime> {
        // Multiply rather than accumulate so ticks do not drift.
        let t = SimTime::new(self.start + self.step * f64::from(self.index)).ok()?;
        if self.end.is_some_and(|end| t > end) {
            return None;
        }
        self.index = self.index.checked_add(1)?;
        Some(t)
    }
}

/// A finite, explicitly listed set of scheduling points.
#[derive(Debug, Clone)]
pub struct TimePoints {
    points: std::vec::IntoIter<SimTime>,
}

impl TimePoints {
    /// Sorts the given points into an ascending source.
    pub fn new(points: impl IntoIterator<Item = SimTime>) -> Self {
        let mut points: Vec<SimTime> = points.into_iter().collect();
        points.sort();
        Self {
            points: points.into_iter(),
        }
    }

    /// Convenience constructor from raw numbers.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTime` for any negative or non-finite value.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Result<Self, ValidationError> {
        let points = values.into_iter().map(SimTime::new).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(points))
    }
}

impl Iterator for TimePoints {
    type Item = SimTime;

    fn next(&mut self) -> Option<SimTime> {
        self.points.next()
    }
}
