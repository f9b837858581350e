//! Run Coordinator: executes one test case.
//!
//! Three activities share a run:
//!
//! - the **workload**, run on the calling thread and bounded by the duration
//!   it is told to run for;
//! - **measurement**, sampling telemetry every `sample_interval` until the
//!   duration elapses or interference finishes, then firing
//!   `measurement_done`;
//! - **interference**, walking the [`ConditionSchedule`] and applying each
//!   event at its offset unless `measurement_done` fires first, then resetting
//!   both paths and firing `interference_done`.
//!
//! The run returns only after all three have finished. Interference resets
//! the paths on every exit, including a panic, so conditions are at baseline
//! whenever [`RunCoordinator::run`] returns.

use std::thread;
use std::time::{Duration, Instant};

use mpbench_common::models::{RunResult, RunStatus, Sample};
use mpbench_common::schedule::ConditionSchedule;
use mpbench_netem::controller::PathShaper;
use tracing::{debug, info, warn};

use crate::signal::{done_signal, DoneListener, DoneSignal};
use crate::telemetry::TelemetrySampler;
use crate::workload::Workload;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

pub struct RunCoordinator<'a> {
    shaper: PathShaper<'a>,
    sampler: &'a dyn TelemetrySampler,
    workload: &'a dyn Workload,
    endpoint: String,
    sample_interval: Duration,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        shaper: PathShaper<'a>,
        sampler: &'a dyn TelemetrySampler,
        workload: &'a dyn Workload,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            shaper,
            sampler,
            workload,
            endpoint: endpoint.into(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn shaper(&self) -> PathShaper<'a> {
        self.shaper
    }

    /// Runs the workload for `duration` while sampling and interfering.
    pub fn run(&self, schedule: &ConditionSchedule, duration: Duration) -> RunResult {
        let t0 = Instant::now();
        let (measurement_done, measurement_listener) = done_signal();
        let (interference_done, interference_listener) = done_signal();

        let (workload_result, samples, applied) = thread::scope(|s| {
            let measurement =
                s.spawn(|| self.measure(t0, duration, measurement_done, interference_listener));
            let interference = s.spawn(|| {
                self.interfere(
                    schedule,
                    t0,
                    duration,
                    interference_done,
                    measurement_listener,
                )
            });

            let workload_result = self.workload.run(&self.endpoint, duration);

            let samples = measurement.join().unwrap_or_else(|_| {
                warn!("measurement activity panicked, discarding samples");
                Vec::new()
            });
            let applied = interference.join().unwrap_or_else(|_| {
                warn!("interference activity panicked");
                0
            });
            (workload_result, samples, applied)
        });

        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            samples = samples.len(),
            applied,
            scheduled = schedule.len(),
            "run finished"
        );

        match workload_result {
            Ok(raw_output) => RunResult {
                raw_output,
                samples,
                status: RunStatus::Completed,
            },
            Err(e) => {
                warn!(error = %e, "workload failed");
                RunResult {
                    raw_output: String::new(),
                    samples,
                    status: RunStatus::Aborted(e.to_string()),
                }
            }
        }
    }

    fn measure(
        &self,
        t0: Instant,
        duration: Duration,
        done: DoneSignal,
        interference_done: DoneListener,
    ) -> Vec<Sample> {
        let _done = done;
        let capacity = (duration.as_millis() / self.sample_interval.as_millis()) as usize + 1;
        let mut samples = Vec::with_capacity(capacity);

        loop {
            let elapsed = t0.elapsed();
            if elapsed >= duration {
                break;
            }
            samples.push(Sample {
                elapsed_ms: elapsed.as_millis() as u64,
                cwnd_a: self.sampler.sample(0),
                cwnd_b: self.sampler.sample(1),
            });
            if interference_done.wait_timeout(self.sample_interval) {
                debug!("interference finished first, stopping measurement");
                break;
            }
        }
        samples
    }

    /// Returns the number of schedule events applied.
    fn interfere(
        &self,
        schedule: &ConditionSchedule,
        t0: Instant,
        duration: Duration,
        done: DoneSignal,
        measurement_done: DoneListener,
    ) -> usize {
        let _reset = ResetOnExit {
            shaper: self.shaper,
            done: Some(done),
        };
        let mut applied = 0;

        for event in schedule.events() {
            if event.offset >= duration {
                debug!(
                    offset_ms = event.offset.as_millis() as u64,
                    "event at or past run end, skipping rest of schedule"
                );
                break;
            }
            let wait = event.offset.saturating_sub(t0.elapsed());
            if measurement_done.wait_timeout(wait) {
                info!(applied, "measurement finished early, aborting interference");
                return applied;
            }
            if t0.elapsed() >= duration || measurement_done.is_fired() {
                return applied;
            }
            debug!(
                offset_ms = event.offset.as_millis() as u64,
                conditions = ?event.conditions,
                "interference event"
            );
            self.shaper.apply(&event.conditions);
            applied += 1;
        }

        let remaining = duration.saturating_sub(t0.elapsed());
        measurement_done.wait_timeout(remaining);
        applied
    }
}

/// Resets both paths and then fires the interference signal, in that order,
/// however the interference activity exits.
struct ResetOnExit<'a> {
    shaper: PathShaper<'a>,
    done: Option<DoneSignal>,
}

impl Drop for ResetOnExit<'_> {
    fn drop(&mut self) {
        self.shaper.reset();
        if let Some(done) = self.done.take() {
            done.fire();
        }
    }
}
