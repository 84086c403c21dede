use std::io::Write;
use std::time::Duration;

use forgecast::merge::{FixedInterval, TimePoints};
use forgecast::{
    Inventory, ItemKind, Process, RuntimeConfig, Scheduler, SchedulerConfig, SimTime,
    SimulationRuntime, TimeSource,
};

fn kind(name: &str) -> ItemKind {
    ItemKind::new(name).unwrap()
}

fn workshop(config: SchedulerConfig) -> Scheduler {
    let smelt = Process::builder("smelt")
        .duration(2.0)
        .success_probability(0.9)
        .consumes_items(kind("Ore"), 2)
        .produces_items(kind("Bar"), 1)
        .build()
        .unwrap();
    let forge = Process::builder("forge")
        .duration(3.0)
        .success_probability(0.5)
        .consumes_items(kind("Bar"), 2)
        .damages_items(kind("Hammer"), 0.3)
        .produces_items(kind("Sword"), 1)
        .build()
        .unwrap();
    Scheduler::new(
        vec![smelt, forge],
        Inventory::from_stacks([(kind("Ore"), 8), (kind("Hammer"), 1)]),
        config,
    )
    .unwrap()
}

#[test]
fn config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"horizon": 20.0, "max_states": 512, "parallel": true}}"#).unwrap();

    let config = SchedulerConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.horizon, Some(SimTime::from(20)));
    assert_eq!(config.max_states, 512);
    assert!(config.parallel);
    assert!(config.follow_completions);
}

#[test]
fn config_file_with_unknown_field_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"max_state": 512}}"#).unwrap();

    let err = SchedulerConfig::from_json_file(file.path()).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn background_run_streams_every_step() {
    let config = SchedulerConfig {
        horizon: Some(SimTime::from(20)),
        ..SchedulerConfig::default()
    };
    let sources: Vec<TimeSource> = vec![Box::new(TimePoints::from_values([0.0]).unwrap())];
    let runtime = RuntimeConfig { report_capacity: 4 };
    let handle = SimulationRuntime::spawn(workshop(config), sources, runtime).unwrap();

    let reports: Vec<_> = handle.reports().unwrap().iter().collect();
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|w| w[0].time < w[1].time));
    assert!(reports.iter().all(|r| (r.total_mass - 1.0).abs() < 1e-9));
    assert!(reports.iter().all(|r| r.time <= SimTime::from(20)));

    let dist = handle.join_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(dist.len(), reports.last().unwrap().states);
}

#[test]
fn background_and_inline_runs_agree() {
    let config = SchedulerConfig {
        follow_completions: false,
        ..SchedulerConfig::default()
    };
    let ticks = || FixedInterval::new(SimTime::ZERO, 1.0, Some(SimTime::from(12))).unwrap();

    let mut inline = workshop(config);
    inline.run([ticks()]).unwrap();

    let sources: Vec<TimeSource> = vec![Box::new(ticks())];
    let handle =
        SimulationRuntime::spawn(workshop(config), sources, RuntimeConfig::default()).unwrap();
    let background = handle.join().unwrap();

    assert_eq!(inline.state(), &background);
}

#[test]
fn parallel_run_matches_sequential_run() {
    let sequential = SchedulerConfig {
        follow_completions: false,
        ..SchedulerConfig::default()
    };
    let parallel = SchedulerConfig {
        parallel: true,
        ..sequential
    };
    let ticks = || FixedInterval::new(SimTime::ZERO, 1.0, Some(SimTime::from(12))).unwrap();

    let mut a = workshop(sequential);
    a.run([ticks()]).unwrap();
    let mut b = workshop(parallel);
    b.run([ticks()]).unwrap();

    assert_eq!(a.state(), b.state());
}
