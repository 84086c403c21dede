//! Discrete probability distributions over structurally comparable states.
//!
//! `Distribution::map` is the bind of a discrete probability monad: each state
//! expands into a conditional sub-distribution and results landing on equal
//! states are merged by summing their mass. The number of entries is therefore
//! bounded by the number of distinct reachable states, not by the number of
//! paths leading to them.
//!
//! Accumulation order is the insertion order of the bucket map, so repeated
//! runs over identical input produce bit-identical masses. Total mass is never
//! renormalized; drift stays visible to callers.

use std::fmt;
use std::hash::Hash;

use indexmap::map::Entry;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A probability in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Probability(f64);

impl Probability {
    /// Impossible.
    pub const ZERO: Self = Self(0.0);
    /// Certain.
    pub const ONE: Self = Self(1.0);

    /// Creates a validated probability.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ProbabilityOutOfRange` outside `[0.0, 1.0]` or for NaN.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::ProbabilityOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// The raw value.
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Probability of the opposite outcome.
    #[must_use]
    pub fn complement(self) -> Self {
        Self(1.0 - self.0)
    }
}

impl TryFrom<f64> for Probability {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Probability> for f64 {
    fn from(value: Probability) -> Self {
        value.0
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mapping from states to probability mass.
///
/// # Examples
///
/// ```
/// use forgecast::{Distribution, Probability};
///
/// let coin = Distribution::bernoulli("heads", "tails", Probability::new(0.5).unwrap());
/// // Two flips, counting heads: paths HT and TH merge into one entry.
/// let heads = coin.map(|first| {
///     let base = u8::from(*first == "heads");
///     Distribution::bernoulli(base + 1, base, Probability::new(0.5).unwrap())
/// });
/// assert_eq!(heads.len(), 3);
/// assert!((heads.probability_of(&1) - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution<S: Eq + Hash> {
    entries: IndexMap<S, f64>,
}

impl<S: Eq + Hash> Default for Distribution<S> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<S: Eq + Hash> Distribution<S> {
    /// An empty distribution (no mass anywhere).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Puts all mass on a single state.
    #[must_use]
    pub fn wrap(state: S) -> Self {
        let mut entries = IndexMap::with_capacity(1);
        entries.insert(state, 1.0);
        Self { entries }
    }

    /// Alias of [`Distribution::wrap`].
    #[must_use]
    pub fn singleton(state: S) -> Self {
        Self::wrap(state)
    }

    /// Two outcomes: `success` with probability `p`, `failure` otherwise.
    ///
    /// Equal outcomes merge into one entry of mass 1.
    #[must_use]
    pub fn bernoulli(success: S, failure: S, p: Probability) -> Self {
        let mut dist = Self::empty();
        dist.accumulate(success, p.value());
        dist.accumulate(failure, p.complement().value());
        dist
    }

    /// Builds a distribution from weighted states, merging equal states.
    ///
    /// Masses are taken as given; callers are responsible for their sum.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
    {
        let mut dist = Self::empty();
        for (state, mass) in entries {
            dist.accumulate(state, mass);
        }
        dist
    }

    /// Adds mass to a state's bucket, creating it on first sight.
    ///
    /// Zero contributions are dropped so impossible branches never
    /// materialize as entries.
    fn accumulate(&mut self, state: S, mass: f64) {
        if mass == 0.0 {
            return;
        }
        match self.entries.entry(state) {
            Entry::Occupied(mut e) => *e.get_mut() += mass,
            Entry::Vacant(e) => {
                e.insert(mass);
            }
        }
    }

    /// Monadic bind: expands every state through `f` and merges equal results.
    ///
    /// `f(state)` is the conditional distribution given `state`; each of its
    /// entries `(sub, q)` contributes `p * q` to the bucket of `sub`.
    pub fn map<T, F>(&self, mut f: F) -> Distribution<T>
    where
        T: Eq + Hash,
        F: FnMut(&S) -> Distribution<T>,
    {
        let mut result = Distribution::empty();
        for (state, p) in &self.entries {
            for (sub, q) in f(state).entries {
                result.accumulate(sub, p * q);
            }
        }
        result
    }

    /// Fallible bind; stops at the first error.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_map<T, E, F>(&self, mut f: F) -> Result<Distribution<T>, E>
    where
        T: Eq + Hash,
        F: FnMut(&S) -> Result<Distribution<T>, E>,
    {
        let mut result = Distribution::empty();
        for (state, p) in &self.entries {
            for (sub, q) in f(state)?.entries {
                result.accumulate(sub, p * q);
            }
        }
        Ok(result)
    }

    /// Parallel fallible bind.
    ///
    /// Sub-distributions are computed concurrently, then merged in entry
    /// order so the result is identical to [`Distribution::try_map`].
    ///
    /// # Errors
    ///
    /// Returns the error of the earliest failing entry.
    pub fn par_try_map<T, E, F>(&self, f: F) -> Result<Distribution<T>, E>
    where
        S: Sync,
        T: Eq + Hash + Send,
        E: Send,
        F: Fn(&S) -> Result<Distribution<T>, E> + Sync,
    {
        let expanded: Vec<(f64, Result<Distribution<T>, E>)> = self
            .entries
            .par_iter()
            .map(|(state, p)| (*p, f(state)))
            .collect();

        let mut result = Distribution::empty();
        for (p, sub) in expanded {
            for (state, q) in sub?.entries {
                result.accumulate(state, p * q);
            }
        }
        Ok(result)
    }

    /// Number of distinct states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is no state at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all masses.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.entries.values().sum()
    }

    /// Mass assigned to `state`, zero if absent.
    #[must_use]
    pub fn probability_of(&self, state: &S) -> f64 {
        self.entries.get(state).copied().unwrap_or(0.0)
    }

    /// Expected value of `f` over the distribution.
    pub fn expectation<F>(&self, mut f: F) -> f64
    where
        F: FnMut(&S) -> f64,
    {
        self.entries.iter().map(|(s, p)| p * f(s)).sum()
    }

    /// The entry with the highest mass; ties go to the earliest entry.
    #[must_use]
    pub fn most_likely(&self) -> Option<(&S, f64)> {
        let mut best: Option<(&S, f64)> = None;
        for (s, p) in &self.entries {
            if best.map_or(true, |(_, bp)| *p > bp) {
                best = Some((s, *p));
            }
        }
        best
    }

    /// Iterates `(state, mass)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&S, f64)> {
        self.entries.iter().map(|(s, p)| (s, *p))
    }

    /// Consumes the distribution into `(state, mass)` pairs.
    #[must_use]
    pub fn into_entries(self) -> Vec<(S, f64)> {
        self.entries.into_iter().collect()
    }
}

impl<S: Eq + Hash> FromIterator<(S, f64)> for Distribution<S> {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}
