//! Data model shared between the coordinator, the recorder, and the driver.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reported by the sampler when a window counter could not be read.
pub const CWND_UNAVAILABLE: i64 = -1;

/// File name of the marker written once an iteration's sweep has finished.
pub const ITERATION_COMPLETE_MARKER: &str = ".complete";

// ── Path pairs ──────────────────────────────────────────────────────

/// One value per emulated network path (path A, path B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathPair<T>(pub [T; 2]);

impl<T: Copy> PathPair<T> {
    pub const fn new(a: T, b: T) -> Self {
        Self([a, b])
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.0.get(index).copied()
    }
}

/// Renders a value the way it appears inside a canonical test name.
pub trait NameToken {
    fn name_token(&self) -> String;
}

impl NameToken for u32 {
    fn name_token(&self) -> String {
        self.to_string()
    }
}

impl NameToken for u64 {
    fn name_token(&self) -> String {
        self.to_string()
    }
}

impl NameToken for Option<u64> {
    fn name_token(&self) -> String {
        match self {
            Some(v) => v.to_string(),
            None => "unl".into(),
        }
    }
}

impl<T: NameToken> NameToken for PathPair<T> {
    fn name_token(&self) -> String {
        format!("{}-{}", self.0[0].name_token(), self.0[1].name_token())
    }
}

// ── Conditions ──────────────────────────────────────────────────────

/// Shaping parameters for both paths at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathConditions {
    pub delay_ms: PathPair<u32>,
    pub loss_percent: PathPair<u32>,
    /// `None` leaves the path rate unlimited.
    pub bandwidth_kbit: PathPair<Option<u64>>,
}

impl PathConditions {
    /// No delay, no loss, no rate limit on either path.
    pub fn baseline() -> Self {
        Self::default()
    }

    pub fn is_baseline(&self) -> bool {
        *self == Self::baseline()
    }
}

// ── Test cases ──────────────────────────────────────────────────────

/// One point in the experiment matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub congestion: String,
    pub scheduler: String,
    pub bandwidth_kbit: PathPair<Option<u64>>,
    pub delay_ms: PathPair<u32>,
    pub loss_percent: PathPair<u32>,
    pub interrupt_duration_ms: u64,
}

impl TestCase {
    /// The resumability key: every field joined with `_`.
    ///
    /// ```
    /// use mpbench_common::models::{PathPair, TestCase};
    ///
    /// let case = TestCase {
    ///     congestion: "cubic".into(),
    ///     scheduler: "minrtt".into(),
    ///     bandwidth_kbit: PathPair::new(None, Some(5000)),
    ///     delay_ms: PathPair::new(10, 40),
    ///     loss_percent: PathPair::new(0, 1),
    ///     interrupt_duration_ms: 2000,
    /// };
    /// assert_eq!(case.canonical_name(), "cubic_minrtt_unl-5000_10-40_0-1_2000");
    /// ```
    pub fn canonical_name(&self) -> String {
        [
            self.congestion.clone(),
            self.scheduler.clone(),
            self.bandwidth_kbit.name_token(),
            self.delay_ms.name_token(),
            self.loss_percent.name_token(),
            self.interrupt_duration_ms.name_token(),
        ]
        .join("_")
    }

    pub fn interrupt_duration(&self) -> Duration {
        Duration::from_millis(self.interrupt_duration_ms)
    }

    /// Total run time when `steps` interrupt events are scheduled. `None` if
    /// it does not fit in a [`Duration`].
    pub fn run_duration(&self, steps: usize) -> Option<Duration> {
        windows_after_start(self.interrupt_duration(), steps)
    }

    /// The conditions installed before the run starts.
    pub fn base_conditions(&self) -> PathConditions {
        PathConditions {
            delay_ms: self.delay_ms,
            loss_percent: self.loss_percent,
            bandwidth_kbit: self.bandwidth_kbit,
        }
    }
}

/// `window * (steps + 1)`: one interrupt window before the first event and
/// one after each. `None` on overflow.
pub fn windows_after_start(window: Duration, steps: usize) -> Option<Duration> {
    let windows = u32::try_from(steps).ok()?.checked_add(1)?;
    window.checked_mul(windows)
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

// ── Run output ──────────────────────────────────────────────────────

/// One telemetry reading taken during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub elapsed_ms: u64,
    pub cwnd_a: i64,
    pub cwnd_b: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    /// The workload failed; carries the failure description.
    Aborted(String),
}

/// Everything one coordinator invocation produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub raw_output: String,
    pub samples: Vec<Sample>,
    pub status: RunStatus,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParsedMetric {
    pub throughput_mbps: f64,
    pub succeeded: bool,
}

// ── Iterations ──────────────────────────────────────────────────────

/// Where artifacts for one campaign repeat are written:
/// `<base_path>/<iteration_index>/<name>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationContext {
    pub base_path: PathBuf,
    pub iteration_index: u32,
}

impl IterationContext {
    pub fn new(base_path: impl Into<PathBuf>, iteration_index: u32) -> Self {
        Self {
            base_path: base_path.into(),
            iteration_index,
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.base_path.join(self.iteration_index.to_string())
    }

    pub fn metric_path(&self, name: &str) -> PathBuf {
        self.dir().join(format!("{name}.json"))
    }

    pub fn values_path(&self, name: &str) -> PathBuf {
        self.dir().join(format!("{name}_value.json"))
    }

    pub fn completion_marker(&self) -> PathBuf {
        self.dir().join(ITERATION_COMPLETE_MARKER)
    }

    /// True once a metric file exists for `name`; absence means the case still
    /// has to run.
    pub fn has_artifact(&self, name: &str) -> bool {
        self.metric_path(name).is_file()
    }

    pub fn is_complete(&self) -> bool {
        self.completion_marker().is_file()
    }
}
