//! Error types for Forgecast.
//!
//! All errors in Forgecast are strongly typed using thiserror.
//! Admission failures are ordinary `InventoryError`s that the scheduler
//! swallows; everything surfacing from a completion phase is fatal.

use thiserror::Error;

use crate::item::ItemKind;
use crate::process::ProcessId;

/// Validation errors that occur during input validation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Probability {value} is out of range [0.0, 1.0]")]
    ProbabilityOutOfRange {
        value: f64,
    },

    #[error("Wear {value} is out of range [0.0, 1.0]")]
    WearOutOfRange {
        value: f64,
    },

    #[error("Time value {value} must be finite and non-negative")]
    InvalidTime {
        value: f64,
    },

    #[error("Amount for '{field}' must be positive, got {value}")]
    NonPositiveAmount {
        field: String,
        value: f64,
    },

    #[error("Process id cannot be empty")]
    EmptyProcessId,

    #[error("Item kind cannot be empty")]
    EmptyItemKind,

    #[error("Invalid scheduler configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised by inventory mutation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InventoryError {
    #[error("Insufficient inventory for {item}: requested {requested}, available {available}")]
    Insufficient {
        item: ItemKind,
        requested: f64,
        available: f64,
    },

    #[error("Inventory invariant violated: {reason}")]
    InvariantViolation {
        reason: String,
    },
}

impl InventoryError {
    /// Returns true for a plain shortage, the only recoverable inventory error.
    #[must_use]
    pub const fn is_insufficient(&self) -> bool {
        matches!(self, Self::Insufficient { .. })
    }
}

/// A behavior effect that failed while ending a process.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("behavior #{index} ({behavior}) failed: {source}")]
pub struct BehaviorError {
    /// Position of the behavior within its process.
    pub index: usize,
    /// Name of the behavior type, e.g. `consume`.
    pub behavior: &'static str,
    /// The underlying inventory error.
    pub source: InventoryError,
}

/// Fatal errors raised while driving a simulation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(
        "Completion of process '{process}' failed in behavior #{index} ({behavior}): {reason} \
         (inventory: {inventory})"
    )]
    CompletionFailed {
        process: ProcessId,
        index: usize,
        behavior: &'static str,
        reason: String,
        inventory: String,
    },

    #[error("Admission of process '{process}' failed: {reason} (inventory: {inventory})")]
    AdmissionFailed {
        process: ProcessId,
        reason: String,
        inventory: String,
    },

    #[error("Simulation limit exceeded: {limit} (max: {max}, actual: {actual})")]
    LimitExceeded {
        limit: String,
        max: u64,
        actual: u64,
    },

    #[error("Simulation worker disconnected")]
    Disconnected,

    #[error("Simulation worker failed: {message}")]
    Worker {
        message: String,
    },
}

/// Top-level error type for Forgecast.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForgecastError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ForgecastError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an inventory error.
    #[must_use]
    pub const fn is_inventory(&self) -> bool {
        matches!(self, Self::Inventory(_))
    }

    /// Returns true if this is a simulation error.
    #[must_use]
    pub const fn is_simulation(&self) -> bool {
        matches!(self, Self::Simulation(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the error aborts a running simulation.
    ///
    /// Shortages are recoverable (the scheduler treats them as a rejected
    /// admission); every other error is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Inventory(e) => !e.is_insufficient(),
            Self::Validation(_) | Self::Simulation(_) | Self::Internal { .. } => true,
        }
    }
}

/// Result type alias for Forgecast operations.
pub type ForgecastResult<T> = Result<T, ForgecastError>;
