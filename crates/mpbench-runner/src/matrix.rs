//! Test Matrix Driver: sweeps the experiment matrix, one case at a time.
//!
//! Cases never overlap, so the shaped paths are only ever touched by one run.
//! A case whose metric file already exists in the current iteration is
//! skipped, and an iteration whose completion marker exists is skipped whole.

use std::path::PathBuf;
use std::time::Duration;

use mpbench_common::config::BenchConfig;
use mpbench_common::models::{IterationContext, ParsedMetric, PathConditions, TestCase};
use mpbench_common::schedule::ConditionSchedule;
use mpbench_netem::controller::PathShaper;
use tracing::{info, warn};

use crate::coordinator::RunCoordinator;
use crate::recorder;

/// What happened to one case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaseOutcome {
    Succeeded(ParsedMetric),
    /// Every attempt was a soft failure.
    Abandoned,
    /// A run succeeded but its artifacts could not be written.
    Unrecorded,
    /// A metric file already existed.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignSummary {
    pub succeeded: usize,
    pub abandoned: usize,
    pub unrecorded: usize,
    pub skipped: usize,
    pub attempts: usize,
    pub iterations_run: u32,
    pub iterations_skipped: u32,
}

impl CampaignSummary {
    fn record(&mut self, outcome: &CaseOutcome) {
        match outcome {
            CaseOutcome::Succeeded(_) => self.succeeded += 1,
            CaseOutcome::Abandoned => self.abandoned += 1,
            CaseOutcome::Unrecorded => self.unrecorded += 1,
            CaseOutcome::Skipped => self.skipped += 1,
        }
    }
}

pub struct MatrixDriver<'a> {
    config: &'a BenchConfig,
    coordinator: RunCoordinator<'a>,
    result_root: PathBuf,
}

impl<'a> MatrixDriver<'a> {
    pub fn new(
        config: &'a BenchConfig,
        coordinator: RunCoordinator<'a>,
        result_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            coordinator,
            result_root: result_root.into(),
        }
    }

    fn shaper(&self) -> PathShaper<'a> {
        self.coordinator.shaper()
    }

    pub fn iteration(&self, index: u32) -> IterationContext {
        IterationContext::new(&self.result_root, index)
    }

    /// Runs every iteration of the campaign.
    pub fn run_campaign(&self) -> CampaignSummary {
        let mut summary = CampaignSummary::default();
        self.shaper().reset_all();

        for index in 0..self.config.iterations {
            let ctx = self.iteration(index);
            if ctx.is_complete() {
                info!(iteration = index, "iteration already complete, skipping");
                summary.iterations_skipped += 1;
                continue;
            }
            self.run_iteration(&ctx, &mut summary);
            summary.iterations_run += 1;
            self.shaper().reset_all();
        }

        info!(
            succeeded = summary.succeeded,
            abandoned = summary.abandoned,
            unrecorded = summary.unrecorded,
            skipped = summary.skipped,
            "campaign finished"
        );
        summary
    }

    /// Sweeps the full matrix once into `ctx`. The iteration is marked
    /// complete only if every case left its artifact behind.
    pub fn run_iteration(&self, ctx: &IterationContext, summary: &mut CampaignSummary) {
        if let Err(e) = std::fs::create_dir_all(ctx.dir()) {
            warn!(dir = %ctx.dir().display(), error = %e, "cannot create iteration directory");
        }
        let missing_before = summary.abandoned + summary.unrecorded;
        let matrix = &self.config.matrix;

        for congestion in &matrix.congestions {
            for scheduler in &matrix.schedulers {
                self.shaper().reset();

                for case in matrix.cases_for(congestion, scheduler) {
                    let outcome = self.run_case(&case, ctx, summary);
                    summary.record(&outcome);
                }

                // Unnamed control run under baseline conditions; never persisted.
                self.perform_test(
                    &format!("{congestion}_{scheduler}_short"),
                    None,
                    &ConditionSchedule::empty(),
                    self.config.short_duration,
                    None,
                    ctx,
                    summary,
                );
                info!(iteration = ctx.iteration_index, %congestion, %scheduler, "part finished");
            }
        }

        let missing = summary.abandoned + summary.unrecorded - missing_before;
        if missing == 0 {
            if let Err(e) = recorder::mark_complete(ctx) {
                warn!(iteration = ctx.iteration_index, error = %e, "failed to write completion marker");
            }
        } else {
            info!(
                iteration = ctx.iteration_index,
                missing,
                "iteration left incomplete for a later resume"
            );
        }
    }

    /// Runs one matrix case unless its artifact already exists.
    pub fn run_case(
        &self,
        case: &TestCase,
        ctx: &IterationContext,
        summary: &mut CampaignSummary,
    ) -> CaseOutcome {
        let name = case.canonical_name();
        if ctx.has_artifact(&name) {
            info!(iteration = ctx.iteration_index, test = %name, "test already exists");
            return CaseOutcome::Skipped;
        }

        let schedule = ConditionSchedule::build(&self.config.interrupts, case);
        let Some(duration) = case.run_duration(schedule.len()) else {
            warn!(test = %name, "run length overflows, not running");
            return CaseOutcome::Abandoned;
        };
        self.perform_test(
            &name,
            Some(case.base_conditions()),
            &schedule,
            duration,
            Some(&name),
            ctx,
            summary,
        )
    }

    /// Runs up to `repeat_times` attempts until one parses, persisting the
    /// first success under `persist_as`.
    #[allow(clippy::too_many_arguments)]
    fn perform_test(
        &self,
        label: &str,
        base: Option<PathConditions>,
        schedule: &ConditionSchedule,
        duration: Duration,
        persist_as: Option<&str>,
        ctx: &IterationContext,
        summary: &mut CampaignSummary,
    ) -> CaseOutcome {
        for attempt in 1..=self.config.repeat_times {
            if let Some(base) = &base {
                self.shaper().apply(base);
            }
            summary.attempts += 1;
            let run = self.coordinator.run(schedule, duration);

            match recorder::parse(&run, duration) {
                Ok(metric) => {
                    info!(
                        iteration = ctx.iteration_index,
                        test = %label,
                        throughput_mbps = metric.throughput_mbps,
                        "test finished"
                    );
                    if let Some(name) = persist_as {
                        if let Err(e) = recorder::persist(name, &metric, &run, ctx) {
                            warn!(test = %name, error = %e, "failed to persist result");
                            return CaseOutcome::Unrecorded;
                        }
                    }
                    return CaseOutcome::Succeeded(metric);
                }
                Err(e) => {
                    warn!(
                        iteration = ctx.iteration_index,
                        test = %label,
                        attempt,
                        error = %e,
                        "test failed"
                    );
                    std::thread::sleep(self.config.backoff);
                }
            }
        }

        warn!(
            iteration = ctx.iteration_index,
            test = %label,
            attempts = self.config.repeat_times,
            "giving up on test"
        );
        CaseOutcome::Abandoned
    }
}
