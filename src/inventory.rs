//! Item inventory.
//!
//! Key invariants:
//! - Stack entries hold only fresh (undamaged) units.
//! - Damaged units are grouped by identical condition with a positive count.
//! - Zero-count entries never survive a mutation, so derived equality and
//!   hashing are structural.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::item::{ItemInstance, ItemKind};

/// Stock of a single item kind, as returned by [`Inventory::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stock {
    /// Fresh units held as a stack.
    pub fresh: u64,
    /// Damaged instances, most damaged first.
    pub damaged: Vec<(ItemInstance, u64)>,
}

impl Stock {
    /// Total number of units regardless of condition.
    #[must_use]
    pub fn units(&self) -> u64 {
        self.fresh + self.damaged.iter().map(|(_, n)| *n).sum::<u64>()
    }

    /// Total health left, in units of one fresh item.
    #[must_use]
    pub fn remaining_health(&self) -> f64 {
        let damaged: f64 = self.damaged.iter().map(|(i, n)| i.wear.remaining() * *n as f64).sum();
        self.fresh as f64 + damaged
    }
}

/// A canonical collection of stacked and individually tracked items.
///
/// # Examples
///
/// ```
/// use forgecast::{Inventory, ItemKind};
///
/// let ore = ItemKind::new("Ore").unwrap();
/// let mut inv = Inventory::new();
/// inv.put(&ore, 10);
/// inv.remove(&ore, 4).unwrap();
/// assert_eq!(inv.quantity(&ore), 6);
/// assert!(inv.remove(&ore, 7).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "InventorySnapshot")]
pub struct Inventory {
    stacks: BTreeMap<ItemKind, u64>,
    #[serde(serialize_with = "instance_entries::serialize")]
    instances: BTreeMap<ItemInstance, u64>,
}

/// Wire form of an inventory, normalized on the way in.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InventorySnapshot {
    #[serde(default)]
    stacks: BTreeMap<ItemKind, u64>,
    #[serde(default, deserialize_with = "instance_entries::deserialize")]
    instances: BTreeMap<ItemInstance, u64>,
}

impl From<InventorySnapshot> for Inventory {
    fn from(raw: InventorySnapshot) -> Self {
        let mut inv = Self {
            stacks: raw.stacks,
            instances: raw.instances,
        };
        inv.clean();
        inv
    }
}

impl Inventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an inventory from a snapshot of stack counts.
    pub fn from_stacks<I>(stacks: I) -> Self
    where
        I: IntoIterator<Item = (ItemKind, u64)>,
    {
        let mut inv = Self::new();
        for (kind, count) in stacks {
            inv.put(&kind, count);
        }
        inv
    }

    /// Adds fresh units to the stack of `kind`.
    pub fn put(&mut self, kind: &ItemKind, count: u64) {
        if count == 0 {
            return;
        }
        *self.stacks.entry(kind.clone()).or_insert(0) += count;
    }

    /// Adds `count` copies of an individual instance.
    ///
    /// Fresh instances are folded into the stack of their kind.
    pub fn put_instance(&mut self, instance: ItemInstance, count: u64) {
        if count == 0 || instance.wear.is_spent() {
            return;
        }
        if instance.wear.is_fresh() {
            self.put(&instance.kind, count);
            return;
        }
        *self.instances.entry(instance).or_insert(0) += count;
    }

    /// Removes fresh units from the stack of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Insufficient` if fewer than `count` fresh
    /// units are present. The inventory is unchanged on error.
    pub fn remove(&mut self, kind: &ItemKind, count: u64) -> Result<(), InventoryError> {
        if count == 0 {
            return Ok(());
        }
        let available = self.stacks.get(kind).copied().unwrap_or(0);
        if available < count {
            return Err(InventoryError::Insufficient {
                item: kind.clone(),
                requested: count as f64,
                available: available as f64,
            });
        }
        self.set_stack(kind, available - count);
        Ok(())
    }

    /// Removes `count` copies of a specific damaged instance.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Insufficient` if fewer copies are present.
    pub fn remove_instance(
        &mut self,
        instance: &ItemInstance,
        count: u64,
    ) -> Result<(), InventoryError> {
        if instance.wear.is_fresh() {
            return self.remove(&instance.kind, count);
        }
        if count == 0 {
            return Ok(());
        }
        let available = self.instances.get(instance).copied().unwrap_or(0);
        if available < count {
            return Err(InventoryError::Insufficient {
                item: instance.kind.clone(),
                requested: count as f64,
                available: available as f64,
            });
        }
        if available == count {
            self.instances.remove(instance);
        } else {
            self.instances.insert(instance.clone(), available - count);
        }
        Ok(())
    }

    /// Looks up everything held of `kind`.
    #[must_use]
    pub fn find(&self, kind: &ItemKind) -> Stock {
        let mut damaged: Vec<(ItemInstance, u64)> = self
            .instances
            .iter()
            .filter(|(i, _)| &i.kind == kind)
            .map(|(i, n)| (i.clone(), *n))
            .collect();
        damaged.sort_by(|(a, _), (b, _)| b.wear.cmp(&a.wear));

        Stock {
            fresh: self.stacks.get(kind).copied().unwrap_or(0),
            damaged,
        }
    }

    /// Total units of `kind`, fresh and damaged.
    #[must_use]
    pub fn quantity(&self, kind: &ItemKind) -> u64 {
        self.find(kind).units()
    }

    /// Fresh units of `kind`.
    #[must_use]
    pub fn fresh(&self, kind: &ItemKind) -> u64 {
        self.stacks.get(kind).copied().unwrap_or(0)
    }

    /// Restores the canonical form: prunes zero-count and spent entries and
    /// folds fresh instances into their stacks.
    ///
    /// Mutators keep the inventory clean already; deserialization goes
    /// through here as well.
    pub fn clean(&mut self) {
        self.stacks.retain(|_, n| *n > 0);
        for (instance, n) in std::mem::take(&mut self.instances) {
            self.put_instance(instance, n);
        }
    }

    /// Whether nothing at all is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty() && self.instances.is_empty()
    }

    /// Iterates stack entries in canonical order.
    pub fn stacks(&self) -> impl Iterator<Item = (&ItemKind, u64)> {
        self.stacks.iter().map(|(k, n)| (k, *n))
    }

    /// Iterates damaged instance groups in canonical order.
    pub fn instances(&self) -> impl Iterator<Item = (&ItemInstance, u64)> {
        self.instances.iter().map(|(i, n)| (i, *n))
    }

    /// Distinct item kinds present.
    #[must_use]
    pub fn kinds(&self) -> Vec<ItemKind> {
        let mut kinds: Vec<ItemKind> = self.stacks.keys().cloned().collect();
        kinds.extend(self.instances.keys().map(|i| i.kind.clone()));
        kinds.sort();
        kinds.dedup();
        kinds
    }

    fn set_stack(&mut self, kind: &ItemKind, count: u64) {
        if count == 0 {
            self.stacks.remove(kind);
        } else {
            self.stacks.insert(kind.clone(), count);
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        let mut first = true;
        for (kind, n) in &self.stacks {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{kind}: {n}")?;
        }
        for (instance, n) in &self.instances {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{instance}: {n}")?;
        }
        f.write_str("}")
    }
}

// JSON object keys must be strings, so instance groups serialize as a list.
mod instance_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::item::ItemInstance;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<ItemInstance, u64>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<(&ItemInstance, &u64)> = map.iter().collect();
        entries.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<ItemInstance, u64>, D::Error> {
        let entries = Vec::<(ItemInstance, u64)>::deserialize(d)?;
        let mut map = BTreeMap::new();
        for (instance, n) in entries {
            *map.entry(instance).or_insert(0) += n;
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::item::Wear;

    fn kind(name: &str) -> ItemKind {
        ItemKind::new(name).unwrap()
    }

    #[test]
    fn put_and_remove_prune_zero_entries() {
        let ore = kind("Ore");
        let mut inv = Inventory::new();
        inv.put(&ore, 3);
        inv.remove(&ore, 3).unwrap();
        assert!(inv.is_empty());
        assert_eq!(inv, Inventory::new());
    }

    #[test]
    fn failed_remove_leaves_inventory_untouched() {
        let ore = kind("Ore");
        let mut inv = Inventory::from_stacks([(ore.clone(), 2)]);
        let before = inv.clone();
        let err = inv.remove(&ore, 5).unwrap_err();
        assert!(err.is_insufficient());
        assert_eq!(inv, before);
    }

    #[test]
    fn fresh_instances_fold_into_stacks() {
        let drill = kind("Drill");
        let mut a = Inventory::new();
        a.put_instance(drill.create_item(), 2);
        let b = Inventory::from_stacks([(drill.clone(), 2)]);
        assert_eq!(a, b);
    }

    #[test]
    fn find_orders_most_damaged_first() {
        let drill = kind("Drill");
        let mut inv = Inventory::new();
        inv.put(&drill, 1);
        inv.put_instance(ItemInstance::new(drill.clone(), Wear::new(0.2).unwrap()), 1);
        inv.put_instance(ItemInstance::new(drill.clone(), Wear::new(0.7).unwrap()), 2);

        let stock = inv.find(&drill);
        assert_eq!(stock.fresh, 1);
        assert_eq!(stock.damaged[0].0.wear.value(), 0.7);
        assert_eq!(stock.units(), 4);
        assert!((stock.remaining_health() - (1.0 + 0.8 + 0.6)).abs() < 1e-12);
    }

    #[test]
    fn clone_is_independent() {
        let ore = kind("Ore");
        let inv = Inventory::from_stacks([(ore.clone(), 4)]);
        let mut copy = inv.clone();
        copy.remove(&ore, 4).unwrap();
        assert_eq!(inv.quantity(&ore), 4);
        assert_eq!(copy.quantity(&ore), 0);
    }

    #[test]
    fn snapshots_are_normalized_on_load() {
        let json = r#"{"stacks":{"Ore":0,"Bar":2},"instances":[]}"#;
        let inv: Inventory = serde_json::from_str(json).unwrap();
        assert_eq!(inv, Inventory::from_stacks([(kind("Bar"), 2)]));
    }

    #[test]
    fn fresh_instances_in_snapshot_become_removable_stack() {
        let drill = kind("Drill");
        let json = r#"{"stacks":{},"instances":[[{"kind":"Drill","wear":0.0},2]]}"#;
        let mut inv: Inventory = serde_json::from_str(json).unwrap();
        assert_eq!(inv, Inventory::from_stacks([(drill.clone(), 2)]));
        inv.remove(&drill, 1).unwrap();
        assert_eq!(inv.fresh(&drill), 1);
    }

    #[test]
    fn clean_folds_fresh_and_drops_spent_instances() {
        let drill = kind("Drill");
        let mut inv = Inventory::from_stacks([(drill.clone(), 1)]);
        inv.instances.insert(drill.create_item(), 2);
        inv.instances.insert(ItemInstance::new(drill.clone(), Wear::new(1.0).unwrap()), 1);
        inv.instances.insert(ItemInstance::new(drill.clone(), Wear::new(0.4).unwrap()), 0);
        inv.clean();

        assert_eq!(inv, Inventory::from_stacks([(drill.clone(), 3)]));
    }

    #[test]
    fn serialized_inventory_loads_back_equal() {
        let drill = kind("Drill");
        let mut inv = Inventory::from_stacks([(drill.clone(), 1)]);
        inv.put_instance(ItemInstance::new(drill, Wear::new(0.3).unwrap()), 2);
        let json = serde_json::to_string(&inv).unwrap();
        assert_eq!(serde_json::from_str::<Inventory>(&json).unwrap(), inv);
    }

    #[test]
    fn display_is_canonical() {
        let inv = Inventory::from_stacks([(kind("Ore"), 1), (kind("Bar"), 5)]);
        assert_eq!(inv.to_string(), "{Bar: 5, Ore: 1}");
    }
}
