//! Item identities and individually tracked item instances.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tolerance under which accumulated wear is considered complete.
pub const WEAR_EPSILON: f64 = 1e-9;

/// Opaque identity of a category of item.
///
/// Item kinds are supplied by an external catalog; the core only compares
/// them for equality and orders them to build canonical inventories.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemKind(Arc<str>);

impl ItemKind {
    /// Creates a new item kind.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyItemKind` for blank names.
    pub fn new(name: impl AsRef<str>) -> Result<Self, ValidationError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyItemKind);
        }
        Ok(Self(Arc::from(name)))
    }

    /// The kind name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creates a fresh, undamaged instance of this kind.
    #[must_use]
    pub fn create_item(&self) -> ItemInstance {
        ItemInstance {
            kind: self.clone(),
            wear: Wear::FRESH,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ItemKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ItemKind> for String {
    fn from(value: ItemKind) -> Self {
        value.0.to_string()
    }
}

/// Accumulated damage of a single item, in `[0.0, 1.0]`.
///
/// `0.0` is a fresh item; an item reaching `1.0` is used up. Wear compares
/// and hashes by bit pattern so instances can be merge keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Wear(f64);

impl Wear {
    /// No damage.
    pub const FRESH: Self = Self(0.0);

    /// Creates a validated wear value.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::WearOutOfRange` outside `[0.0, 1.0]`.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::WearOutOfRange { value });
        }
        Ok(Self(value + 0.0))
    }

    /// The raw wear value.
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Health left before the item is used up.
    #[must_use]
    pub fn remaining(self) -> f64 {
        1.0 - self.0
    }

    /// True for an undamaged item.
    #[must_use]
    pub fn is_fresh(self) -> bool {
        self.0 <= 0.0
    }

    /// True once wear reaches one, within `WEAR_EPSILON`.
    #[must_use]
    pub fn is_spent(self) -> bool {
        self.0 >= 1.0 - WEAR_EPSILON
    }

    /// Adds damage, saturating at fully spent.
    #[must_use]
    pub(crate) fn add(self, amount: f64) -> Self {
        let next = (self.0 + amount).clamp(0.0, 1.0);
        if next >= 1.0 - WEAR_EPSILON {
            Self(1.0)
        } else {
            Self(next)
        }
    }
}

impl PartialEq for Wear {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Wear {}

impl PartialOrd for Wear {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Wear {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Wear {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl TryFrom<f64> for Wear {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Wear> for f64 {
    fn from(value: Wear) -> Self {
        value.0
    }
}

/// An individually tracked unit of an item kind.
///
/// Instances with equal kind and wear are interchangeable, so inventories
/// group them by value and keep a count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemInstance {
    /// Category of the item.
    pub kind: ItemKind,
    /// Damage accumulated so far.
    pub wear: Wear,
}

impl ItemInstance {
    /// Creates an instance with the given wear.
    #[must_use]
    pub fn new(kind: ItemKind, wear: Wear) -> Self {
        Self { kind, wear }
    }
}

impl fmt::Display for ItemInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:.3}", self.kind, self.wear.value())
    }
}
