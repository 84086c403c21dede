//! Background execution of a scheduling run.
//!
//! A run can take long for wide distributions. `SimulationRuntime` moves the
//! scheduler onto a dedicated thread and streams a `StepReport` per processed
//! point over a bounded channel, so the caller can observe progress, stop
//! reading, or cancel without blocking the run.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::debug;

use crate::distribution::Distribution;
use crate::error::{ForgecastError, ForgecastResult, SimulationError};
use crate::merge::TimeSource;
use crate::scheduler::{RunId, Scheduler, StepReport, WorldState};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum buffered step reports before the worker waits for the reader.
    pub report_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { report_capacity: 1024 }
    }
}

/// Spawns scheduling runs on worker threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulationRuntime;

impl SimulationRuntime {
    /// Runs `scheduler` over `sources` on a named background thread.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::Worker` if the thread cannot be spawned.
    pub fn spawn(
        scheduler: Scheduler,
        sources: Vec<TimeSource>,
        config: RuntimeConfig,
    ) -> ForgecastResult<SimulationHandle> {
        let run = scheduler.id();
        let (report_tx, report_rx) = bounded::<StepReport>(config.report_capacity.max(1));
        let (result_tx, result_rx) = bounded::<ForgecastResult<Distribution<WorldState>>>(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&cancelled);
        let worker = thread::Builder::new()
            .name(format!("forgecast-{run}"))
            .spawn(move || {
                let mut scheduler = scheduler;
                let mut streaming = true;
                let outcome = scheduler.run_with(sources, |report, _| {
                    // A dropped receiver only stops streaming; the run goes on.
                    if streaming && report_tx.send(report.clone()).is_err() {
                        debug!("report receiver dropped");
                        streaming = false;
                    }
                    if flag.load(Ordering::Relaxed) {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                });
                drop(report_tx);
                let _ = result_tx.send(outcome.map(|_| scheduler.into_distribution()));
            })
            .map_err(|e| SimulationError::Worker {
                message: format!("failed to spawn worker: {e}"),
            })?;

        Ok(SimulationHandle {
            run,
            reports: Some(report_rx),
            result: result_rx,
            cancelled,
            worker: Some(worker),
        })
    }
}

/// Handle to a background run.
pub struct SimulationHandle {
    run: RunId,
    reports: Option<Receiver<StepReport>>,
    result: Receiver<ForgecastResult<Distribution<WorldState>>>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimulationHandle {
    /// Id of the run this handle belongs to.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run
    }

    /// Stream of step reports; iteration ends when the run finishes.
    ///
    /// Returns `None` after [`SimulationHandle::stop_reports`].
    #[must_use]
    pub fn reports(&self) -> Option<&Receiver<StepReport>> {
        self.reports.as_ref()
    }

    /// Drops the report stream. The run continues without streaming.
    pub fn stop_reports(&mut self) {
        self.reports = None;
    }

    /// Asks the worker to stop after the current scheduling point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Waits for the run to finish and returns the final distribution.
    ///
    /// Unread reports are discarded.
    ///
    /// # Errors
    ///
    /// Propagates the run's fatal error, or reports a worker that died
    /// without producing a result.
    pub fn join(mut self) -> ForgecastResult<Distribution<WorldState>> {
        self.reports = None;
        let received = self.result.recv();
        let panicked = self.join_worker();
        match received {
            Ok(outcome) => outcome,
            Err(_) => Err(panicked.unwrap_or(SimulationError::Disconnected).into()),
        }
    }

    /// Like [`SimulationHandle::join`], giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// As `join`; a timeout is reported as `SimulationError::Worker`.
    pub fn join_timeout(mut self, timeout: Duration) -> ForgecastResult<Distribution<WorldState>> {
        self.reports = None;
        match self.result.recv_timeout(timeout) {
            Ok(outcome) => {
                self.join_worker();
                outcome
            }
            Err(RecvTimeoutError::Timeout) => {
                self.cancel();
                Err(ForgecastError::Simulation(SimulationError::Worker {
                    message: format!("run {} timed out after {}ms", self.run, timeout.as_millis()),
                }))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(self.join_worker().unwrap_or(SimulationError::Disconnected).into())
            }
        }
    }

    fn join_worker(&mut self) -> Option<SimulationError> {
        let handle = self.worker.take()?;
        handle.join().err().map(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            SimulationError::Worker { message }
        })
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        // Detached runs are cancelled rather than left running unobserved.
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::inventory::Inventory;
    use crate::item::ItemKind;
    use crate::merge::{FixedInterval, TimePoints};
    use crate::process::Process;
    use crate::scheduler::SchedulerConfig;
    use crate::time::SimTime;

    fn smelter(ore: u64) -> Scheduler {
        let ore_kind = ItemKind::new("Ore").unwrap();
        let smelt = Process::builder("smelt")
            .duration(5.0)
            .success_probability(0.8)
            .consumes_items(ore_kind.clone(), 10)
            .produces_items(ItemKind::new("Bar").unwrap(), 5)
            .build()
            .unwrap();
        let inventory = Inventory::from_stacks([(ore_kind, ore)]);
        Scheduler::new(vec![smelt], inventory, SchedulerConfig::default()).unwrap()
    }

    fn points(values: &[f64]) -> TimeSource {
        Box::new(TimePoints::from_values(values.iter().copied()).unwrap())
    }

    #[test]
    fn streams_reports_then_joins() {
        let handle =
            SimulationRuntime::spawn(smelter(10), vec![points(&[0.0])], RuntimeConfig::default())
                .unwrap();

        let times: Vec<f64> = handle.reports().unwrap().iter().map(|r| r.time.value()).collect();
        assert_eq!(times, vec![0.0, 5.0]);

        let dist = handle.join().unwrap();
        assert_eq!(dist.len(), 2);
    }

    #[test]
    fn join_without_reading_does_not_block() {
        let config = RuntimeConfig { report_capacity: 1 };
        let sources = vec![points(&[0.0, 1.0, 2.0, 3.0, 4.0, 6.0, 7.0])];
        let handle = SimulationRuntime::spawn(smelter(30), sources, config).unwrap();

        let dist = handle.join_timeout(Duration::from_secs(5)).unwrap();
        assert!((dist.total_mass() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cancel_stops_an_unbounded_run() {
        let source: TimeSource = Box::new(FixedInterval::new(SimTime::ZERO, 1.0, None).unwrap());
        let config = RuntimeConfig { report_capacity: 1 };
        let mut handle = SimulationRuntime::spawn(smelter(0), vec![source], config).unwrap();

        let first = handle.reports().unwrap().recv().unwrap();
        assert_eq!(first.time, SimTime::ZERO);
        handle.cancel();
        handle.stop_reports();

        let dist = handle.join_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(dist.len(), 1);
    }

    #[test]
    fn fatal_errors_surface_on_join() {
        let config = SchedulerConfig {
            max_steps: 1,
            follow_completions: false,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(Vec::new(), Inventory::new(), config).unwrap();
        let sources = vec![points(&[1.0, 2.0])];
        let handle =
            SimulationRuntime::spawn(scheduler, sources, RuntimeConfig::default()).unwrap();

        let err = handle.join().unwrap_err();
        assert!(matches!(err, ForgecastError::Simulation(SimulationError::LimitExceeded { .. })));
    }
}
