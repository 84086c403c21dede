//! Processes: timed jobs that transform an inventory.
//!
//! A process is a duration, an ordered list of behaviors and a success
//! probability. Behaviors run in order at start and at end; a start is
//! atomic, so a rejected admission never leaves partial effects behind.

pub mod behavior;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::distribution::Probability;
use crate::error::{BehaviorError, InventoryError, ValidationError};
use crate::inventory::Inventory;
use crate::item::{ItemInstance, ItemKind};
use crate::time::SimTime;

pub use behavior::{
    Balance, BalanceKey, Behavior, ConsumeItems, CustomBehavior, DamageItems, ProcessBehavior,
    ProduceItem, ProduceItems,
};

/// Stable, caller-chosen identifier of a process definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessId(Arc<str>);

impl ProcessId {
    /// Creates a process id.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyProcessId` for blank ids.
    pub fn new(id: impl AsRef<str>) -> Result<Self, ValidationError> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(ValidationError::EmptyProcessId);
        }
        Ok(Self(Arc::from(id)))
    }

    /// The id as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProcessId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProcessId> for String {
    fn from(value: ProcessId) -> Self {
        value.0.to_string()
    }
}

/// An immutable process definition.
///
/// Identity is the `id`: two processes with the same id are considered the
/// same process when world states are compared.
///
/// # Examples
///
/// ```
/// use forgecast::{Inventory, ItemKind, Process};
///
/// let ore = ItemKind::new("Ore").unwrap();
/// let bar = ItemKind::new("Bar").unwrap();
/// let smelt = Process::builder("smelt")
///     .duration(5.0)
///     .success_probability(0.8)
///     .consumes_items(ore.clone(), 10)
///     .produces_items(bar.clone(), 5)
///     .build()
///     .unwrap();
///
/// let mut inv = Inventory::from_stacks([(ore.clone(), 10)]);
/// smelt.start(&mut inv).unwrap();
/// assert_eq!(inv.quantity(&ore), 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    /// Identity of the process.
    pub id: ProcessId,
    /// Time between admission and completion.
    pub duration: SimTime,
    /// Effects, applied in order.
    pub behaviors: Vec<Behavior>,
    /// Chance that a completed run succeeds.
    pub success_probability: Probability,
}

impl Process {
    /// Starts a builder for a process with the given id.
    pub fn builder(id: impl AsRef<str>) -> ProcessBuilder {
        ProcessBuilder::new(id)
    }

    /// Runs every behavior's start effect.
    ///
    /// Effects are applied to a scratch copy and committed only if all of
    /// them succeed.
    ///
    /// # Errors
    ///
    /// Returns the first behavior error; `inventory` is unchanged in that case.
    pub fn start(&self, inventory: &mut Inventory) -> Result<(), InventoryError> {
        let mut scratch = inventory.clone();
        for behavior in &self.behaviors {
            behavior.start(&mut scratch)?;
        }
        *inventory = scratch;
        Ok(())
    }

    /// Runs every behavior's end effect for the given outcome.
    ///
    /// # Errors
    ///
    /// Returns the first behavior error together with that behavior's
    /// position. Callers own `inventory` as a branch copy, so a partially
    /// applied end is discarded with it.
    pub fn end(&self, inventory: &mut Inventory, succeeded: bool) -> Result<(), BehaviorError> {
        for (index, behavior) in self.behaviors.iter().enumerate() {
            behavior.end(inventory, succeeded).map_err(|source| BehaviorError {
                index,
                behavior: behavior.name(),
                source,
            })?;
        }
        Ok(())
    }

    /// Expected item balance of one run at this process's own success probability.
    #[must_use]
    pub fn expected_balance(&self) -> Balance {
        self.expected_balance_with(self.success_probability)
    }

    /// Expected item balance of one run at an arbitrary success probability.
    #[must_use]
    pub fn expected_balance_with(&self, chance: Probability) -> Balance {
        let mut total = Balance::new();
        for behavior in &self.behaviors {
            total.merge(behavior.expected_balance(chance));
        }
        total
    }

    /// Time at which a run started at `start` completes.
    #[must_use]
    pub fn completes_at(&self, start: SimTime) -> SimTime {
        start + self.duration
    }
}

impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Process {}

/// Fluent builder for [`Process`].
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    id: String,
    duration: f64,
    success_probability: f64,
    behaviors: Vec<Behavior>,
    error: Option<ValidationError>,
}

impl ProcessBuilder {
    /// Creates a builder with zero duration and certain success.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self {
            id: id.as_ref().to_string(),
            duration: 0.0,
            success_probability: 1.0,
            behaviors: Vec::new(),
            error: None,
        }
    }

    /// Sets the duration; validated on `build`.
    #[must_use]
    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the success probability; validated on `build`.
    #[must_use]
    pub fn success_probability(mut self, p: f64) -> Self {
        self.success_probability = p;
        self
    }

    /// Appends an already constructed behavior.
    #[must_use]
    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Appends [`Behavior::consume`].
    #[must_use]
    pub fn consumes_items(self, kind: ItemKind, amount: u64) -> Self {
        self.push(Behavior::consume(kind, amount))
    }

    /// Appends [`Behavior::produce`].
    #[must_use]
    pub fn produces_items(self, kind: ItemKind, amount: u64) -> Self {
        self.push(Behavior::produce(kind, amount))
    }

    /// Appends [`Behavior::produce_item`].
    #[must_use]
    pub fn produces_item(self, template: ItemInstance) -> Self {
        self.behavior(Behavior::produce_item(template))
    }

    /// Appends [`Behavior::damage`].
    #[must_use]
    pub fn damages_items(self, kind: ItemKind, amount: f64) -> Self {
        self.push(Behavior::damage(kind, amount))
    }

    fn push(mut self, behavior: Result<Behavior, ValidationError>) -> Self {
        match behavior {
            Ok(b) => self.behaviors.push(b),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Validates and builds the process.
    ///
    /// # Errors
    ///
    /// Returns the first invalid input recorded by the builder.
    pub fn build(self) -> Result<Process, ValidationError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(Process {
            id: ProcessId::new(&self.id)?,
            duration: SimTime::new(self.duration)?,
            behaviors: self.behaviors,
            success_probability: Probability::new(self.success_probability)?,
        })
    }
}
