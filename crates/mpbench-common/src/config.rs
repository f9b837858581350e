use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{windows_after_start, PathPair, TestCase};
use crate::schedule::InterruptStep;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("`{0}` must list at least one value")]
    EmptyList(&'static str),
    #[error("`paths.interfaces` entries must not be blank")]
    BlankInterface,
    #[error("interrupt duration {interrupt_duration_ms}ms with {steps} steps overflows the run length")]
    RunTooLong {
        interrupt_duration_ms: u64,
        steps: usize,
    },
}

// ── Raw input (everything optional) ─────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BenchConfigInput {
    pub version: u32,
    pub congestions: Option<Vec<String>>,
    pub schedulers: Option<Vec<String>>,
    pub bandwidth_kbit: Option<[i64; 2]>,
    pub delays_ms: Option<Vec<[u32; 2]>>,
    pub losses_percent: Option<Vec<[u32; 2]>>,
    pub interrupt_durations_ms: Option<Vec<u64>>,
    pub interrupt: Vec<InterruptStepInput>,
    pub repeat_times: Option<u32>,
    pub iterations: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub short_duration_s: Option<u64>,
    pub sample_interval_ms: Option<u64>,
    pub workload: WorkloadConfigInput,
    pub paths: PathsConfigInput,
    pub telemetry: TelemetryConfigInput,
    pub output: OutputConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterruptStepInput {
    pub loss_percent: [u32; 2],
    pub delay_ms: Option<[u32; 2]>,
    pub bandwidth_kbit: Option<[i64; 2]>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkloadConfigInput {
    pub binary: Option<String>,
    pub server_host: Option<String>,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfigInput {
    pub interfaces: Option<[String; 2]>,
    pub namespace: Option<String>,
    pub sudo: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryConfigInput {
    pub cwnd_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfigInput {
    pub root: Option<PathBuf>,
    pub host_group: Option<u32>,
}

// ── Resolved config ─────────────────────────────────────────────────

/// The parameter space swept by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixConfig {
    pub congestions: Vec<String>,
    pub schedulers: Vec<String>,
    pub bandwidth_kbit: PathPair<Option<u64>>,
    pub delays_ms: Vec<PathPair<u32>>,
    pub losses_percent: Vec<PathPair<u32>>,
    pub interrupt_durations_ms: Vec<u64>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            congestions: vec!["cubic".into()],
            schedulers: vec!["minrtt".into()],
            bandwidth_kbit: PathPair::new(None, None),
            delays_ms: vec![PathPair::new(0, 0)],
            losses_percent: vec![PathPair::new(0, 0)],
            interrupt_durations_ms: vec![2000],
        }
    }
}

impl MatrixConfig {
    /// Leaf cases for one (congestion, scheduler) pair, in delay × loss ×
    /// interrupt order.
    pub fn cases_for(&self, congestion: &str, scheduler: &str) -> Vec<TestCase> {
        let mut cases = Vec::with_capacity(
            self.delays_ms.len() * self.losses_percent.len() * self.interrupt_durations_ms.len(),
        );
        for delay in &self.delays_ms {
            for loss in &self.losses_percent {
                for &interrupt_duration_ms in &self.interrupt_durations_ms {
                    cases.push(TestCase {
                        congestion: congestion.to_string(),
                        scheduler: scheduler.to_string(),
                        bandwidth_kbit: self.bandwidth_kbit,
                        delay_ms: *delay,
                        loss_percent: *loss,
                        interrupt_duration_ms,
                    });
                }
            }
        }
        cases
    }

    pub fn len(&self) -> usize {
        self.congestions.len()
            * self.schedulers.len()
            * self.delays_ms.len()
            * self.losses_percent.len()
            * self.interrupt_durations_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub binary: String,
    pub server_host: String,
    pub extra_args: Vec<String>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            binary: "qperf".into(),
            server_host: "server1".into(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub interfaces: [String; 2],
    pub namespace: Option<String>,
    pub sudo: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            interfaces: ["eth1".into(), "eth2".into()],
            namespace: None,
            sudo: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub cwnd_dir: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            cwnd_dir: PathBuf::from("/tmp/mpquic"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub root: PathBuf,
    /// Overrides the host group otherwise derived from the host name.
    pub host_group: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub version: u32,
    pub matrix: MatrixConfig,
    pub interrupts: Vec<InterruptStep>,
    pub repeat_times: u32,
    pub iterations: u32,
    pub backoff: Duration,
    pub short_duration: Duration,
    pub sample_interval: Duration,
    pub workload: WorkloadConfig,
    pub paths: PathsConfig,
    pub telemetry: TelemetryConfig,
    pub output: OutputConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            matrix: MatrixConfig::default(),
            interrupts: Vec::new(),
            repeat_times: 3,
            iterations: 5,
            backoff: Duration::from_secs(5),
            short_duration: Duration::from_secs(5),
            sample_interval: Duration::from_millis(200),
            workload: WorkloadConfig::default(),
            paths: PathsConfig::default(),
            telemetry: TelemetryConfig::default(),
            output: OutputConfig {
                root: PathBuf::from("."),
                host_group: None,
            },
        }
    }
}

fn bandwidth_pair(raw: [i64; 2]) -> PathPair<Option<u64>> {
    let limit = |v: i64| if v > 0 { Some(v as u64) } else { None };
    PathPair::new(limit(raw[0]), limit(raw[1]))
}

fn non_empty<T>(
    value: Option<Vec<T>>,
    default: Vec<T>,
    key: &'static str,
) -> Result<Vec<T>, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.is_empty() => Err(ConfigError::EmptyList(key)),
        Some(v) => Ok(v),
    }
}

fn non_blank(value: Option<String>, default: String) -> String {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
}

impl BenchConfigInput {
    pub fn resolve(self) -> Result<BenchConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let defaults = BenchConfig::default();
        let pair = |v: [u32; 2]| PathPair::new(v[0], v[1]);

        let matrix = MatrixConfig {
            congestions: non_empty(self.congestions, defaults.matrix.congestions, "congestions")?,
            schedulers: non_empty(self.schedulers, defaults.matrix.schedulers, "schedulers")?,
            bandwidth_kbit: self
                .bandwidth_kbit
                .map(bandwidth_pair)
                .unwrap_or(defaults.matrix.bandwidth_kbit),
            delays_ms: non_empty(
                self.delays_ms.map(|v| v.into_iter().map(pair).collect()),
                defaults.matrix.delays_ms,
                "delays_ms",
            )?,
            losses_percent: non_empty(
                self.losses_percent.map(|v| v.into_iter().map(pair).collect()),
                defaults.matrix.losses_percent,
                "losses_percent",
            )?,
            interrupt_durations_ms: non_empty(
                self.interrupt_durations_ms,
                defaults.matrix.interrupt_durations_ms,
                "interrupt_durations_ms",
            )?,
        };

        let interrupts = self
            .interrupt
            .into_iter()
            .map(|step| InterruptStep {
                loss_percent: pair(step.loss_percent),
                delay_ms: step.delay_ms.map(pair),
                bandwidth_kbit: step.bandwidth_kbit.map(bandwidth_pair),
            })
            .collect::<Vec<_>>();

        for &interrupt_duration_ms in &matrix.interrupt_durations_ms {
            let window = Duration::from_millis(interrupt_duration_ms);
            if windows_after_start(window, interrupts.len()).is_none() {
                return Err(ConfigError::RunTooLong {
                    interrupt_duration_ms,
                    steps: interrupts.len(),
                });
            }
        }

        let paths = match self.paths.interfaces {
            Some(ifaces) => {
                let trimmed = ifaces.map(|s| s.trim().to_string());
                if trimmed.iter().any(|s| s.is_empty()) {
                    return Err(ConfigError::BlankInterface);
                }
                PathsConfig {
                    interfaces: trimmed,
                    namespace: self.paths.namespace.filter(|s| !s.trim().is_empty()),
                    sudo: self.paths.sudo,
                }
            }
            None => PathsConfig {
                namespace: self.paths.namespace.filter(|s| !s.trim().is_empty()),
                sudo: self.paths.sudo,
                ..defaults.paths
            },
        };

        Ok(BenchConfig {
            version,
            matrix,
            interrupts,
            repeat_times: self.repeat_times.unwrap_or(defaults.repeat_times).max(1),
            iterations: self.iterations.unwrap_or(defaults.iterations).max(1),
            backoff: self
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
            short_duration: self
                .short_duration_s
                .map(Duration::from_secs)
                .unwrap_or(defaults.short_duration),
            sample_interval: self
                .sample_interval_ms
                .map(|ms| Duration::from_millis(ms.max(1)))
                .unwrap_or(defaults.sample_interval),
            workload: WorkloadConfig {
                binary: non_blank(self.workload.binary, defaults.workload.binary),
                server_host: non_blank(self.workload.server_host, defaults.workload.server_host),
                extra_args: self.workload.extra_args,
            },
            paths,
            telemetry: TelemetryConfig {
                cwnd_dir: self
                    .telemetry
                    .cwnd_dir
                    .unwrap_or(defaults.telemetry.cwnd_dir),
            },
            output: OutputConfig {
                root: self.output.root.unwrap_or(defaults.output.root),
                host_group: self.output.host_group,
            },
        })
    }
}

impl BenchConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(BenchConfig::default());
        }
        let parsed: BenchConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
