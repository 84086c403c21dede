//! Per-step summaries and expectation helpers over world-state distributions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::item::ItemKind;
use crate::time::SimTime;

use super::state::WorldState;

/// Summary of one processed scheduling point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// The scheduling point.
    pub time: SimTime,
    /// Distinct world states after the step.
    pub states: usize,
    /// Total probability mass after the step.
    pub total_mass: f64,
    /// Expected number of processes that completed at this point.
    pub expected_completions: f64,
    /// Expected number of processes admitted at this point.
    pub expected_admissions: f64,
    /// Expected number of processes running after the step.
    pub expected_running: f64,
}

impl StepReport {
    /// Renders the report as a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Expected number of units of `kind` across all states.
#[must_use]
pub fn expected_quantity(dist: &Distribution<WorldState>, kind: &ItemKind) -> f64 {
    dist.expectation(|s| s.inventory.quantity(kind) as f64)
}

/// Expected number of units of every kind present in any state.
#[must_use]
pub fn expected_quantities(dist: &Distribution<WorldState>) -> BTreeMap<ItemKind, f64> {
    let mut out: BTreeMap<ItemKind, f64> = BTreeMap::new();
    for (state, p) in dist.iter() {
        for kind in state.inventory.kinds() {
            let units = state.inventory.quantity(&kind) as f64;
            *out.entry(kind).or_insert(0.0) += p * units;
        }
    }
    out
}

/// Expected number of running processes.
#[must_use]
pub fn expected_running(dist: &Distribution<WorldState>) -> f64 {
    dist.expectation(|s| s.running.len() as f64)
}
