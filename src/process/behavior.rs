//! Process behaviors: the units of effect a process applies to an inventory.
//!
//! The built-in set is closed (`Behavior`), dispatching by match. Additional
//! effects plug in through `ProcessBehavior` and `Behavior::Custom` without
//! touching the scheduler.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::distribution::Probability;
use crate::error::{InventoryError, ValidationError};
use crate::inventory::Inventory;
use crate::item::{ItemInstance, ItemKind, WEAR_EPSILON};

/// What a balance entry refers to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BalanceKey {
    /// Any unit of the kind.
    Kind(ItemKind),
    /// Instances matching a template.
    Instance(ItemInstance),
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind(k) => write!(f, "{k}"),
            Self::Instance(i) => write!(f, "{i}"),
        }
    }
}

/// Expected signed quantity change per item, given a success probability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Balance {
    entries: BTreeMap<BalanceKey, f64>,
}

impl Balance {
    /// Creates an empty balance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates `delta` onto `key`.
    pub fn add(&mut self, key: BalanceKey, delta: f64) {
        *self.entries.entry(key).or_insert(0.0) += delta;
    }

    /// Folds another balance into this one.
    pub fn merge(&mut self, other: Self) {
        for (key, delta) in other.entries {
            self.add(key, delta);
        }
    }

    /// Accumulated change for `key`, zero if absent.
    #[must_use]
    pub fn get(&self, key: &BalanceKey) -> f64 {
        self.entries.get(key).copied().unwrap_or(0.0)
    }

    /// Shortcut for `get(&BalanceKey::Kind(kind))`.
    #[must_use]
    pub fn of_kind(&self, kind: &ItemKind) -> f64 {
        self.get(&BalanceKey::Kind(kind.clone()))
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&BalanceKey, f64)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    /// Whether no entry was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Effect contract shared by every behavior.
pub trait ProcessBehavior: fmt::Debug + Send + Sync {
    /// Applied when the process begins.
    ///
    /// Must leave `inventory` untouched when returning an error.
    fn start(&self, inventory: &mut Inventory) -> Result<(), InventoryError>;

    /// Applied when the process duration has elapsed.
    fn end(&self, inventory: &mut Inventory, succeeded: bool) -> Result<(), InventoryError>;

    /// Expected item change for one run with the given success probability.
    fn expected_balance(&self, chance: Probability) -> Balance;
}

/// Removes fresh units when the process starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumeItems {
    /// Kind to take.
    pub kind: ItemKind,
    /// Fresh units taken per run.
    pub amount: u64,
}

impl ProcessBehavior for ConsumeItems {
    fn start(&self, inventory: &mut Inventory) -> Result<(), InventoryError> {
        inventory.remove(&self.kind, self.amount)
    }

    fn end(&self, _inventory: &mut Inventory, _succeeded: bool) -> Result<(), InventoryError> {
        Ok(())
    }

    fn expected_balance(&self, _chance: Probability) -> Balance {
        let mut balance = Balance::new();
        balance.add(BalanceKey::Kind(self.kind.clone()), -(self.amount as f64));
        balance
    }
}

/// Adds fresh units when the process succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProduceItems {
    /// Kind to add.
    pub kind: ItemKind,
    /// Fresh units added per successful run.
    pub amount: u64,
}

impl ProcessBehavior for ProduceItems {
    fn start(&self, _inventory: &mut Inventory) -> Result<(), InventoryError> {
        Ok(())
    }

    fn end(&self, inventory: &mut Inventory, succeeded: bool) -> Result<(), InventoryError> {
        if succeeded {
            inventory.put(&self.kind, self.amount);
        }
        Ok(())
    }

    fn expected_balance(&self, chance: Probability) -> Balance {
        let mut balance = Balance::new();
        balance.add(BalanceKey::Kind(self.kind.clone()), self.amount as f64 * chance.value());
        balance
    }
}

/// Adds one copy of a template instance when the process succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProduceItem {
    /// Instance copied into the inventory.
    pub template: ItemInstance,
}

impl ProcessBehavior for ProduceItem {
    fn start(&self, _inventory: &mut Inventory) -> Result<(), InventoryError> {
        Ok(())
    }

    fn end(&self, inventory: &mut Inventory, succeeded: bool) -> Result<(), InventoryError> {
        if succeeded {
            inventory.put_instance(self.template.clone(), 1);
        }
        Ok(())
    }

    fn expected_balance(&self, chance: Probability) -> Balance {
        let mut balance = Balance::new();
        balance.add(BalanceKey::Instance(self.template.clone()), chance.value());
        balance
    }
}

/// Wears down items of a kind by `amount` units of health when the process starts.
///
/// Damage goes to the most damaged instance first. Fresh stack units are only
/// broken out into tracked instances once every damaged instance is spent, so
/// stacks keep holding fresh units only. A unit reaching full wear is removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DamageItems {
    /// Kind to wear down.
    pub kind: ItemKind,
    /// Health removed per run, in units of one fresh item.
    pub amount: f64,
}

impl ProcessBehavior for DamageItems {
    fn start(&self, inventory: &mut Inventory) -> Result<(), InventoryError> {
        let available = inventory.find(&self.kind).remaining_health();
        if available + WEAR_EPSILON < self.amount {
            return Err(InventoryError::Insufficient {
                item: self.kind.clone(),
                requested: self.amount,
                available,
            });
        }

        let mut remaining = self.amount;
        while remaining > WEAR_EPSILON {
            let most_damaged = inventory.find(&self.kind).damaged.into_iter().next();

            if let Some((item, _)) = most_damaged {
                let applied = item.wear.remaining().min(remaining);
                inventory.remove_instance(&item, 1)?;
                let worn = ItemInstance::new(item.kind.clone(), item.wear.add(applied));
                inventory.put_instance(worn, 1);
                remaining -= applied;
                continue;
            }

            let fresh = inventory.fresh(&self.kind);
            if fresh == 0 {
                // Only reachable through the epsilon slack of the check above.
                break;
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let whole = (remaining.floor() as u64).min(fresh);
            if whole > 0 {
                inventory.remove(&self.kind, whole)?;
                remaining -= whole as f64;
                continue;
            }

            inventory.remove(&self.kind, 1)?;
            inventory.put_instance(self.kind.create_item().with_damage(remaining), 1);
            remaining = 0.0;
        }
        Ok(())
    }

    fn end(&self, _inventory: &mut Inventory, _succeeded: bool) -> Result<(), InventoryError> {
        Ok(())
    }

    fn expected_balance(&self, _chance: Probability) -> Balance {
        let mut balance = Balance::new();
        balance.add(BalanceKey::Kind(self.kind.clone()), -self.amount);
        balance
    }
}

impl ItemInstance {
    fn with_damage(mut self, amount: f64) -> Self {
        self.wear = self.wear.add(amount);
        self
    }
}

/// A behavior implemented outside this crate.
#[derive(Debug, Clone)]
pub struct CustomBehavior(
    /// The shared implementation.
    pub Arc<dyn ProcessBehavior>,
);

/// The behaviors a process can carry.
///
/// Deserialization validates amounts the same way the constructors do.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Behavior {
    /// See [`ConsumeItems`].
    Consume(ConsumeItems),
    /// See [`ProduceItems`].
    Produce(ProduceItems),
    /// See [`ProduceItem`].
    ProduceItem(ProduceItem),
    /// See [`DamageItems`].
    Damage(DamageItems),
    /// A behavior supplied by the caller; never serialized.
    #[serde(skip)]
    Custom(CustomBehavior),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BehaviorDef {
    Consume { kind: ItemKind, amount: u64 },
    Produce { kind: ItemKind, amount: u64 },
    ProduceItem { template: ItemInstance },
    Damage { kind: ItemKind, amount: f64 },
}

impl TryFrom<BehaviorDef> for Behavior {
    type Error = ValidationError;

    fn try_from(def: BehaviorDef) -> Result<Self, Self::Error> {
        match def {
            BehaviorDef::Consume { kind, amount } => Self::consume(kind, amount),
            BehaviorDef::Produce { kind, amount } => Self::produce(kind, amount),
            BehaviorDef::ProduceItem { template } => Ok(Self::produce_item(template)),
            BehaviorDef::Damage { kind, amount } => Self::damage(kind, amount),
        }
    }
}

impl<'de> Deserialize<'de> for Behavior {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let def = BehaviorDef::deserialize(deserializer)?;
        Self::try_from(def).map_err(serde::de::Error::custom)
    }
}

impl Behavior {
    /// Consumes `amount` fresh units of `kind` at start.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonPositiveAmount` if `amount` is zero.
    pub fn consume(kind: ItemKind, amount: u64) -> Result<Self, ValidationError> {
        ensure_positive("consume", amount)?;
        Ok(Self::Consume(ConsumeItems { kind, amount }))
    }

    /// Produces `amount` fresh units of `kind` on success.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonPositiveAmount` if `amount` is zero.
    pub fn produce(kind: ItemKind, amount: u64) -> Result<Self, ValidationError> {
        ensure_positive("produce", amount)?;
        Ok(Self::Produce(ProduceItems { kind, amount }))
    }

    /// Adds one copy of `template` on success.
    #[must_use]
    pub fn produce_item(template: ItemInstance) -> Self {
        Self::ProduceItem(ProduceItem { template })
    }

    /// Wears down `amount` units of health of `kind` at start.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonPositiveAmount` unless `amount` is finite and positive.
    pub fn damage(kind: ItemKind, amount: f64) -> Result<Self, ValidationError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount {
                field: "damage".to_string(),
                value: amount,
            });
        }
        Ok(Self::Damage(DamageItems { kind, amount }))
    }

    /// Wraps a caller-defined behavior.
    pub fn custom(behavior: impl ProcessBehavior + 'static) -> Self {
        Self::Custom(CustomBehavior(Arc::new(behavior)))
    }

    /// Short name of the behavior type, as used in definitions.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Consume(_) => "consume",
            Self::Produce(_) => "produce",
            Self::ProduceItem(_) => "produce_item",
            Self::Damage(_) => "damage",
            Self::Custom(_) => "custom",
        }
    }

    fn inner(&self) -> &dyn ProcessBehavior {
        match self {
            Self::Consume(b) => b,
            Self::Produce(b) => b,
            Self::ProduceItem(b) => b,
            Self::Damage(b) => b,
            Self::Custom(b) => b.0.as_ref(),
        }
    }
}

impl ProcessBehavior for Behavior {
    fn start(&self, inventory: &mut Inventory) -> Result<(), InventoryError> {
        self.inner().start(inventory)
    }

    fn end(&self, inventory: &mut Inventory, succeeded: bool) -> Result<(), InventoryError> {
        self.inner().end(inventory, succeeded)
    }

    fn expected_balance(&self, chance: Probability) -> Balance {
        self.inner().expected_balance(chance)
    }
}

fn ensure_positive(field: &str, amount: u64) -> Result<(), ValidationError> {
    if amount == 0 {
        return Err(ValidationError::NonPositiveAmount {
            field: field.to_string(),
            value: 0.0,
        });
    }
    Ok(())
}
