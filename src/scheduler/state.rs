//! World states tracked by the scheduler.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inventory::Inventory;
use crate::process::Process;
use crate::time::SimTime;

/// Identifier of one scheduling run, attached to its log span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process admitted at `started_at`.
///
/// `slot` is the position of the process in the scheduler's candidate list.
/// Identity and ordering use `(started_at, slot)`, which makes running sets
/// order-independent and completion order follow input order.
#[derive(Debug, Clone)]
pub struct RunningProcess {
    /// The admitted definition.
    pub process: Arc<Process>,
    /// Position among the scheduler's candidates.
    pub slot: usize,
    /// Scheduling point of admission.
    pub started_at: SimTime,
}

impl RunningProcess {
    /// Time at which this run completes.
    #[must_use]
    pub fn completes_at(&self) -> SimTime {
        self.process.completes_at(self.started_at)
    }

    /// True once the process duration has fully elapsed at `t`.
    #[must_use]
    pub fn is_finished_at(&self, t: SimTime) -> bool {
        self.completes_at() <= t
    }

    fn key(&self) -> (SimTime, usize) {
        (self.started_at, self.slot)
    }
}

impl PartialEq for RunningProcess {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RunningProcess {}

impl PartialOrd for RunningProcess {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RunningProcess {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for RunningProcess {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Compact, stable digest of a world state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateFingerprint([u8; 32]);

impl StateFingerprint {
    /// The full blake3 digest.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for StateFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// One possible outcome: the processes still running and the inventory.
///
/// Equality is structural and is the merge key of the scheduler's distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WorldState {
    /// Processes admitted and not yet completed.
    pub running: BTreeSet<RunningProcess>,
    /// Items held.
    pub inventory: Inventory,
}

impl WorldState {
    /// A state with nothing running.
    #[must_use]
    pub fn idle(inventory: Inventory) -> Self {
        Self {
            running: BTreeSet::new(),
            inventory,
        }
    }

    /// Completion times of every running process.
    pub fn completion_times(&self) -> impl Iterator<Item = SimTime> + '_ {
        self.running.iter().map(RunningProcess::completes_at)
    }

    /// Number of running processes finished at `t`.
    #[must_use]
    pub fn finished_at(&self, t: SimTime) -> usize {
        self.running.iter().filter(|r| r.is_finished_at(t)).count()
    }

    /// Number of processes admitted exactly at `t`.
    #[must_use]
    pub fn started_at(&self, t: SimTime) -> usize {
        self.running.iter().filter(|r| r.started_at == t).count()
    }

    /// blake3 digest over the canonical encoding of this state.
    #[must_use]
    pub fn fingerprint(&self) -> StateFingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"running");
        for r in &self.running {
            hasher.update(&r.started_at.value().to_bits().to_le_bytes());
            hasher.update(&(r.slot as u64).to_le_bytes());
            hasher.update(r.process.id.as_str().as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(b"stacks");
        for (kind, n) in self.inventory.stacks() {
            hasher.update(kind.as_str().as_bytes());
            hasher.update(&[0]);
            hasher.update(&n.to_le_bytes());
        }
        hasher.update(b"instances");
        for (instance, n) in self.inventory.instances() {
            hasher.update(instance.kind.as_str().as_bytes());
            hasher.update(&[0]);
            hasher.update(&instance.wear.value().to_bits().to_le_bytes());
            hasher.update(&n.to_le_bytes());
        }
        StateFingerprint(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, r) in self.running.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}@{}", r.process.id, r.started_at.value())?;
        }
        write!(f, "] {}", self.inventory)
    }
}
