//! Probabilistic discrete-event scheduler.
//!
//! The scheduler carries a `Distribution<WorldState>` through simulated time.
//! At every scheduling point it first resolves completed processes, branching
//! each state into success and failure outcomes, then tries to admit every
//! candidate process against each resulting inventory.
//!
//! Key invariants:
//! - Completion always precedes admission for the same instant, and a given
//!   instant is processed at most once.
//! - Admission is independent per state; a rejected admission leaves the
//!   state's inventory exactly as it was.
//! - Any error while resolving completions aborts the step.

pub mod config;
pub mod report;
pub mod state;

pub use config::SchedulerConfig;
pub use report::{expected_quantities, expected_quantity, expected_running, StepReport};
pub use state::{RunId, RunningProcess, StateFingerprint, WorldState};

use std::collections::{BTreeSet, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info, info_span, trace, warn};

use crate::distribution::Distribution;
use crate::error::{ForgecastResult, SimulationError, ValidationError};
use crate::inventory::Inventory;
use crate::merge::OrderedMerge;
use crate::process::Process;
use crate::time::SimTime;

/// Drives a distribution of world states through scheduling points.
///
/// # Examples
///
/// ```
/// use forgecast::{Inventory, ItemKind, Process, Scheduler, SchedulerConfig, SimTime};
/// use forgecast::merge::TimePoints;
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
/// let mut scheduler = Scheduler::new(
///     vec![smelt],
///     Inventory::from_stacks([(ore, 10)]),
///     SchedulerConfig::default(),
/// )
/// .unwrap();
/// let dist = scheduler.run([TimePoints::from_values([0.0, 5.0]).unwrap()]).unwrap();
/// assert_eq!(dist.len(), 2);
/// ```
#[derive(Debug)]
pub struct Scheduler {
    id: RunId,
    config: SchedulerConfig,
    processes: Vec<Arc<Process>>,
    state: Distribution<WorldState>,
    now: Option<SimTime>,
    steps: usize,
}

impl Scheduler {
    /// Creates a scheduler with nothing running and all mass on `initial`.
    ///
    /// `processes` are the admission candidates, tried in the given order.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid configuration or duplicate process ids.
    pub fn new(
        processes: impl IntoIterator<Item = Process>,
        mut initial: Inventory,
        config: SchedulerConfig,
    ) -> ForgecastResult<Self> {
        config.validate()?;

        let processes: Vec<Arc<Process>> = processes.into_iter().map(Arc::new).collect();
        {
            let mut seen = HashSet::with_capacity(processes.len());
            for process in &processes {
                if !seen.insert(&process.id) {
                    return Err(ValidationError::InvalidConfig {
                        reason: format!("duplicate process id '{}'", process.id),
                    }
                    .into());
                }
            }
        }

        initial.clean();
        Ok(Self {
            id: RunId::new(),
            config,
            processes,
            state: Distribution::wrap(WorldState::idle(initial)),
            now: None,
            steps: 0,
        })
    }

    /// Id used in log spans and reports.
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Admission candidates in admission order.
    #[must_use]
    pub fn processes(&self) -> &[Arc<Process>] {
        &self.processes
    }

    /// The current distribution of world states.
    #[must_use]
    pub const fn state(&self) -> &Distribution<WorldState> {
        &self.state
    }

    /// The last processed scheduling point.
    #[must_use]
    pub const fn now(&self) -> Option<SimTime> {
        self.now
    }

    /// Number of processed scheduling points.
    #[must_use]
    pub const fn steps(&self) -> usize {
        self.steps
    }

    /// Consumes the scheduler, returning the current distribution.
    #[must_use]
    pub fn into_distribution(self) -> Distribution<WorldState> {
        self.state
    }

    /// Earliest completion strictly after the last processed point, over all states.
    ///
    /// This is re-derived from the current distribution on every call.
    #[must_use]
    pub fn next_completion(&self) -> Option<SimTime> {
        crate::merge::earliest_after(
            self.now.as_ref(),
            self.state.iter().flat_map(|(s, _)| s.completion_times()),
        )
    }

    /// Processes one scheduling point: completions, then admissions.
    ///
    /// Points at or before the last processed point, and points past the
    /// configured horizon, are ignored and yield `None`.
    ///
    /// # Errors
    ///
    /// Fatal errors from completion or admission, and configured limits. The
    /// scheduler state is left as it was before the call.
    pub fn step(&mut self, t: SimTime) -> ForgecastResult<Option<StepReport>> {
        if let Some(now) = self.now {
            if t <= now {
                trace!(%t, %now, "scheduling point already processed");
                return Ok(None);
            }
        }
        if self.config.horizon.is_some_and(|horizon| t > horizon) {
            trace!(%t, "scheduling point past horizon");
            return Ok(None);
        }

        if self.steps >= self.config.max_steps {
            return Err(SimulationError::LimitExceeded {
                limit: "max_steps".to_string(),
                max: self.config.max_steps as u64,
                actual: self.steps as u64 + 1,
            }
            .into());
        }

        let expected_completions = self.state.expectation(|s| s.finished_at(t) as f64);
        let completed = self.complete(t)?;
        let admitted = self.admit(&completed, t)?;

        if admitted.len() > self.config.max_states {
            return Err(SimulationError::LimitExceeded {
                limit: "max_states".to_string(),
                max: self.config.max_states as u64,
                actual: admitted.len() as u64,
            }
            .into());
        }

        let report = StepReport {
            time: t,
            states: admitted.len(),
            total_mass: admitted.total_mass(),
            expected_completions,
            expected_admissions: admitted.expectation(|s| s.started_at(t) as f64),
            expected_running: expected_running(&admitted),
        };

        self.state = admitted;
        self.now = Some(t);
        self.steps += 1;

        debug!(
            %t,
            states = report.states,
            total_mass = report.total_mass,
            completions = report.expected_completions,
            admissions = report.expected_admissions,
            "scheduling point processed"
        );
        if let Some((likely, p)) = self.state.most_likely() {
            trace!(%t, fingerprint = %likely.fingerprint(), p, "most likely state");
        }
        if (report.total_mass - 1.0).abs() > self.config.mass_tolerance {
            warn!(%t, total_mass = report.total_mass, "probability mass drifted");
        }

        Ok(Some(report))
    }

    /// Runs until the merged sources are exhausted or the horizon is passed.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal step error.
    pub fn run<S>(
        &mut self,
        sources: impl IntoIterator<Item = S>,
    ) -> ForgecastResult<&Distribution<WorldState>>
    where
        S: Iterator<Item = SimTime>,
    {
        self.run_with(sources, |_, _| ControlFlow::Continue(()))?;
        Ok(&self.state)
    }

    /// Like [`Scheduler::run`], reporting every processed point to `observer`.
    ///
    /// The observer may return `ControlFlow::Break` to stop early. Returns the
    /// number of points processed by this call.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal step error.
    pub fn run_with<S, F>(
        &mut self,
        sources: impl IntoIterator<Item = S>,
        mut observer: F,
    ) -> ForgecastResult<usize>
    where
        S: Iterator<Item = SimTime>,
        F: FnMut(&StepReport, &Distribution<WorldState>) -> ControlFlow<()>,
    {
        let span = info_span!("simulation", run = %self.id);
        let _guard = span.enter();

        let mut external = OrderedMerge::new(sources).peekable();
        let mut processed = 0usize;

        loop {
            // Coalesce ties and drop points that are already behind us.
            while let Some(t) = external.peek() {
                if self.now.is_some_and(|now| *t <= now) {
                    external.next();
                } else {
                    break;
                }
            }

            let from_sources = external.peek().copied();
            let from_completions = if self.config.follow_completions {
                self.next_completion()
            } else {
                None
            };

            let Some(t) = from_sources.into_iter().chain(from_completions).min() else {
                break;
            };
            if self.config.horizon.is_some_and(|horizon| t > horizon) {
                debug!(%t, "horizon reached");
                break;
            }
            if from_sources == Some(t) {
                external.next();
            }

            let Some(report) = self.step(t)? else {
                continue;
            };
            processed += 1;

            if observer(&report, &self.state).is_break() {
                debug!(%t, "stopped by observer");
                break;
            }
        }

        info!(steps = processed, states = self.state.len(), "simulation finished");
        Ok(processed)
    }

    fn complete(&self, t: SimTime) -> Result<Distribution<WorldState>, SimulationError> {
        let resolve = |state: &WorldState| resolve_completions(state, t);
        if self.config.parallel {
            self.state.par_try_map(resolve)
        } else {
            self.state.try_map(resolve)
        }
    }

    fn admit(
        &self,
        completed: &Distribution<WorldState>,
        t: SimTime,
    ) -> Result<Distribution<WorldState>, SimulationError> {
        let admit = |state: &WorldState| self.admit_state(state, t).map(Distribution::wrap);
        if self.config.parallel {
            completed.par_try_map(admit)
        } else {
            completed.try_map(admit)
        }
    }

    /// Tries every candidate in order against a copy of the state's inventory.
    fn admit_state(&self, state: &WorldState, t: SimTime) -> Result<WorldState, SimulationError> {
        let mut next = state.clone();
        for (slot, process) in self.processes.iter().enumerate() {
            match process.start(&mut next.inventory) {
                Ok(()) => {
                    next.running.insert(RunningProcess {
                        process: Arc::clone(process),
                        slot,
                        started_at: t,
                    });
                }
                Err(e) if e.is_insufficient() => {
                    trace!(%t, process = %process.id, reason = %e, "admission rejected");
                }
                Err(e) => {
                    return Err(SimulationError::AdmissionFailed {
                        process: process.id.clone(),
                        reason: e.to_string(),
                        inventory: next.inventory.to_string(),
                    });
                }
            }
        }
        Ok(next)
    }
}

/// Splits a state into the outcomes of every process finished at `t`.
///
/// K simultaneous completions compose by repeated bind, giving up to 2^K
/// inventories before equal ones merge.
fn resolve_completions(
    state: &WorldState,
    t: SimTime,
) -> Result<Distribution<WorldState>, SimulationError> {
    let mut finished = Vec::new();
    let mut still_running = BTreeSet::new();
    for r in &state.running {
        if r.is_finished_at(t) {
            finished.push(r);
        } else {
            still_running.insert(r.clone());
        }
    }

    if finished.is_empty() {
        return Ok(Distribution::wrap(state.clone()));
    }

    let mut inventories = Distribution::wrap(state.inventory.clone());
    for r in finished {
        inventories = inventories.try_map(|inv| branch_outcomes(&r.process, inv))?;
    }

    Ok(inventories.map(|inv| {
        Distribution::wrap(WorldState {
            running: still_running.clone(),
            inventory: inv.clone(),
        })
    }))
}

fn branch_outcomes(
    process: &Process,
    inventory: &Inventory,
) -> Result<Distribution<Inventory>, SimulationError> {
    let end = |succeeded: bool| -> Result<Inventory, SimulationError> {
        let mut branch = inventory.clone();
        process
            .end(&mut branch, succeeded)
            .map_err(|e| SimulationError::CompletionFailed {
                process: process.id.clone(),
                index: e.index,
                behavior: e.behavior,
                reason: e.source.to_string(),
                inventory: inventory.to_string(),
            })?;
        Ok(branch)
    };
    Ok(Distribution::bernoulli(end(true)?, end(false)?, process.success_probability))
}
