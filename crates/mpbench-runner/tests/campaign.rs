//! End-to-end driver behaviour with an in-memory controller and a scripted
//! workload: persistence layout, resumption, retry, and baseline restoration.

use std::sync::Mutex;
use std::time::Duration;

use mpbench_common::config::{BenchConfig, MatrixConfig};
use mpbench_common::models::{IterationContext, PathPair};
use mpbench_common::schedule::InterruptStep;
use mpbench_netem::controller::PathShaper;
use mpbench_netem::impairment::Shaping;
use mpbench_netem::path::PathSpec;
use mpbench_netem::test_util::RecordingController;
use mpbench_runner::coordinator::RunCoordinator;
use mpbench_runner::matrix::{CampaignSummary, MatrixDriver};
use mpbench_runner::recorder;
use mpbench_runner::telemetry::TelemetrySampler;
use mpbench_runner::workload::{whole_seconds, Workload, WorkloadError};

// ─── Fakes ──────────────────────────────────────────────────────────

struct ConstSampler;

impl TelemetrySampler for ConstSampler {
    fn sample(&self, path_index: usize) -> i64 {
        1000 * (path_index as i64 + 1)
    }
}

#[derive(Debug, Clone)]
struct Call {
    duration: Duration,
    path_a: Option<Shaping>,
}

/// Returns a well-formed report except for the first `incomplete_first`
/// calls, which lack `end.sum_received`. Records the shaping on path A at the
/// moment each call starts.
struct ScriptedWorkload<'c> {
    controller: &'c RecordingController,
    incomplete_first: usize,
    calls: Mutex<Vec<Call>>,
}

impl<'c> ScriptedWorkload<'c> {
    fn new(controller: &'c RecordingController, incomplete_first: usize) -> Self {
        Self {
            controller,
            incomplete_first,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Workload for ScriptedWorkload<'_> {
    fn run(&self, _endpoint: &str, duration: Duration) -> Result<String, WorkloadError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call {
            duration,
            path_a: self.controller.state("eth1"),
        });
        let secs = whole_seconds(duration);
        if calls.len() <= self.incomplete_first {
            return Ok(format!(
                r#"{{"start": {{"test_start": {{"duration": {secs}}}}}, "end": {{}}}}"#
            ));
        }
        Ok(format!(
            r#"{{"start": {{"test_start": {{"duration": {secs}}}}},
                "end": {{"sum_received": {{"bits_per_second": 125000000.0}}}}}}"#
        ))
    }
}

// ─── Harness ────────────────────────────────────────────────────────

fn config() -> BenchConfig {
    BenchConfig {
        matrix: MatrixConfig {
            congestions: vec!["cubic".into()],
            schedulers: vec!["minrtt".into(), "rr".into()],
            bandwidth_kbit: PathPair::new(None, None),
            delays_ms: vec![PathPair::new(10, 30)],
            losses_percent: vec![PathPair::new(0, 0), PathPair::new(1, 0)],
            interrupt_durations_ms: vec![20],
        },
        interrupts: vec![InterruptStep {
            loss_percent: PathPair::new(100, 0),
            ..Default::default()
        }],
        repeat_times: 3,
        iterations: 1,
        backoff: Duration::ZERO,
        short_duration: Duration::ZERO,
        sample_interval: Duration::from_millis(5),
        ..BenchConfig::default()
    }
}

fn paths() -> [PathSpec; 2] {
    [PathSpec::new("eth1"), PathSpec::new("eth2")]
}

fn run_campaign(
    cfg: &BenchConfig,
    controller: &RecordingController,
    workload: &ScriptedWorkload<'_>,
    root: &std::path::Path,
) -> CampaignSummary {
    let paths = paths();
    let coordinator = RunCoordinator::new(
        PathShaper::new(controller, &paths),
        &ConstSampler,
        workload,
        "server1",
    )
    .with_sample_interval(cfg.sample_interval);
    MatrixDriver::new(cfg, coordinator, root).run_campaign()
}

fn case_names(cfg: &BenchConfig) -> Vec<String> {
    let mut names = Vec::new();
    for cc in &cfg.matrix.congestions {
        for sched in &cfg.matrix.schedulers {
            for case in cfg.matrix.cases_for(cc, sched) {
                names.push(case.canonical_name());
            }
        }
    }
    names
}

// ─── Tests ──────────────────────────────────────────────────────────

#[test]
fn campaign_persists_every_case_and_marks_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let controller = RecordingController::new();
    let workload = ScriptedWorkload::new(&controller, 0);

    let summary = run_campaign(&cfg, &controller, &workload, dir.path());

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.abandoned, 0);
    assert_eq!(summary.iterations_run, 1);
    // Four cases plus one short control run per scheduler.
    assert_eq!(workload.calls().len(), 6);

    let ctx = IterationContext::new(dir.path(), 0);
    for name in case_names(&cfg) {
        assert!(ctx.metric_path(&name).is_file(), "missing {name}.json");
        assert!(ctx.values_path(&name).is_file(), "missing {name}_value.json");
        let record = recorder::load_metric(&ctx, &name).unwrap();
        assert_eq!(record.throughput_mbps, 125.0);
        let samples = recorder::load_samples(&ctx, &name).unwrap();
        assert!(samples.windows(2).all(|w| w[0].elapsed_ms < w[1].elapsed_ms));
    }
    assert!(ctx.is_complete());
    assert!(controller.all_baseline());
}

#[test]
fn base_conditions_are_in_place_when_the_workload_starts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let controller = RecordingController::new();
    let workload = ScriptedWorkload::new(&controller, 0);

    run_campaign(&cfg, &controller, &workload, dir.path());

    let case_calls: Vec<_> = workload
        .calls()
        .into_iter()
        .filter(|c| c.duration == Duration::from_millis(40))
        .collect();
    assert_eq!(case_calls.len(), 4);
    for call in &case_calls {
        let shaping = call.path_a.expect("path A shaped during case");
        assert_eq!(shaping.delay_ms, 10);
    }

    // Control runs start from baseline because every case resets on exit.
    let short_calls: Vec<_> = workload
        .calls()
        .into_iter()
        .filter(|c| c.duration == Duration::ZERO)
        .collect();
    assert_eq!(short_calls.len(), 2);
    assert!(short_calls.iter().all(|c| c.path_a.is_none()));
}

#[test]
fn completed_iteration_is_not_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let controller = RecordingController::new();

    let first = ScriptedWorkload::new(&controller, 0);
    run_campaign(&cfg, &controller, &first, dir.path());

    let second = ScriptedWorkload::new(&controller, 0);
    let summary = run_campaign(&cfg, &controller, &second, dir.path());

    assert!(second.calls().is_empty());
    assert_eq!(summary.iterations_skipped, 1);
    assert_eq!(summary.iterations_run, 0);
}

#[test]
fn deleting_one_artifact_reruns_exactly_that_case() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let controller = RecordingController::new();

    let first = ScriptedWorkload::new(&controller, 0);
    run_campaign(&cfg, &controller, &first, dir.path());

    let ctx = IterationContext::new(dir.path(), 0);
    let names = case_names(&cfg);
    std::fs::remove_file(ctx.completion_marker()).unwrap();
    std::fs::remove_file(ctx.metric_path(&names[2])).unwrap();

    let second = ScriptedWorkload::new(&controller, 0);
    let summary = run_campaign(&cfg, &controller, &second, dir.path());

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 3);
    let case_calls = second
        .calls()
        .iter()
        .filter(|c| c.duration > Duration::ZERO)
        .count();
    assert_eq!(case_calls, 1);
    assert!(ctx.metric_path(&names[2]).is_file());
    assert!(ctx.is_complete());
}

#[test]
fn soft_failure_is_retried_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = BenchConfig {
        matrix: MatrixConfig {
            schedulers: vec!["minrtt".into()],
            losses_percent: vec![PathPair::new(0, 0)],
            ..config().matrix
        },
        ..config()
    };
    let controller = RecordingController::new();
    let workload = ScriptedWorkload::new(&controller, 2);

    let summary = run_campaign(&cfg, &controller, &workload, dir.path());

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.abandoned, 0);
    // Two incomplete reports, one good one, then the control run.
    assert_eq!(workload.calls().len(), 4);
    let ctx = IterationContext::new(dir.path(), 0);
    assert!(ctx.has_artifact(&case_names(&cfg)[0]));
}

#[test]
fn exhausted_retries_abandon_the_case_without_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = BenchConfig {
        matrix: MatrixConfig {
            schedulers: vec!["minrtt".into()],
            losses_percent: vec![PathPair::new(0, 0)],
            ..config().matrix
        },
        ..config()
    };
    let controller = RecordingController::new();
    let workload = ScriptedWorkload::new(&controller, usize::MAX);

    let summary = run_campaign(&cfg, &controller, &workload, dir.path());

    assert_eq!(summary.abandoned, 1);
    assert_eq!(summary.succeeded, 0);
    // repeat_times attempts for the case, then the control run's attempts.
    assert_eq!(workload.calls().len(), 3 + 3);

    let ctx = IterationContext::new(dir.path(), 0);
    let name = &case_names(&cfg)[0];
    assert!(!ctx.metric_path(name).exists());
    assert!(!ctx.values_path(name).exists());
    assert!(!ctx.is_complete());
    assert!(controller.all_baseline());
}

#[test]
fn unwritable_artifact_keeps_iteration_open_for_resume() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let controller = RecordingController::new();
    let ctx = IterationContext::new(dir.path(), 0);
    let names = case_names(&cfg);

    // A directory where the sample file belongs makes the write fail.
    let blocker = ctx.values_path(&names[1]);
    std::fs::create_dir_all(&blocker).unwrap();

    let first = ScriptedWorkload::new(&controller, 0);
    let summary = run_campaign(&cfg, &controller, &first, dir.path());

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.unrecorded, 1);
    assert!(!ctx.has_artifact(&names[1]));
    assert!(!ctx.is_complete());

    std::fs::remove_dir(&blocker).unwrap();
    let second = ScriptedWorkload::new(&controller, 0);
    let summary = run_campaign(&cfg, &controller, &second, dir.path());

    assert_eq!(summary.iterations_skipped, 0);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 3);
    assert!(ctx.has_artifact(&names[1]));
    assert!(ctx.is_complete());
}
