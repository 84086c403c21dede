//! # Forgecast - Probabilistic Discrete-Event Scheduling
//!
//! Forgecast predicts how an item inventory evolves when processes with
//! uncertain outcomes run over simulated time. Instead of sampling, it tracks
//! the exact probability distribution over world states.
//!
//! ## Core Concepts
//!
//! - **Inventory**: Canonical collection of stacked fresh items and tracked damaged instances
//! - **Process**: A unit of work with a duration, a success probability, and behaviors
//! - **Distribution**: A finite discrete probability distribution that merges equal states
//! - **OrderedMerge**: Lazy ordered merge of scheduling-point streams
//! - **Scheduler**: Completion then admission at every scheduling point
//!
//! ## Usage
//!
//! ```rust
//! use forgecast::{Inventory, ItemKind, Process, Scheduler, SchedulerConfig, WorldState};
//! use forgecast::merge::TimePoints;
//!
//! let ore = ItemKind::new("Ore")?;
//! let bar = ItemKind::new("Bar")?;
//!
//! let smelt = Process::builder("smelt")
//!     .duration(5.0)
//!     .success_probability(0.8)
//!     .consumes_items(ore.clone(), 10)
//!     .produces_items(bar.clone(), 5)
//!     .build()?;
//!
//! let mut scheduler = Scheduler::new(
//!     vec![smelt],
//!     Inventory::from_stacks([(ore, 10)]),
//!     SchedulerConfig::default(),
//! )?;
//! let dist = scheduler.run([TimePoints::from_values([0.0, 5.0])?])?;
//!
//! let success = WorldState::idle(Inventory::from_stacks([(bar, 5)]));
//! assert!((dist.probability_of(&success) - 0.8).abs() < 1e-12);
//! # Ok::<(), forgecast::ForgecastError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

// Core types
pub mod error;
pub mod item;
pub mod time;

// Model
pub mod distribution;
pub mod inventory;
pub mod process;

// Scheduling
pub mod merge;
pub mod runtime;
pub mod scheduler;

pub use distribution::{Distribution, Probability};
pub use error::{
    BehaviorError, ForgecastError, ForgecastResult, InventoryError, SimulationError,
    ValidationError,
};
pub use inventory::{Inventory, Stock};
pub use item::{ItemInstance, ItemKind, Wear, WEAR_EPSILON};
pub use merge::{OrderedMerge, TimeSource};
pub use process::{
    Balance, BalanceKey, Behavior, ConsumeItems, DamageItems, Process, ProcessBehavior,
    ProcessBuilder, ProcessId, ProduceItem, ProduceItems,
};
pub use runtime::{RuntimeConfig, SimulationHandle, SimulationRuntime};
pub use scheduler::{
    expected_quantities, expected_quantity, expected_running, RunId, RunningProcess, Scheduler,
    SchedulerConfig, StateFingerprint, StepReport, WorldState,
};
pub use time::SimTime;
