//! Result parsing and artifact persistence.
//!
//! The workload prints a JSON report. Only two fields matter here:
//! `end.sum_received.bits_per_second` and `start.test_start.duration`. Every
//! other field is kept verbatim in the persisted metric record.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mpbench_common::models::{IterationContext, ParsedMetric, RunResult, Sample};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::workload::whole_seconds;

/// Divisor from bits per second to Mbps (SI megabits).
pub const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Reported and requested durations may differ by rounding only.
const DURATION_TOLERANCE_SECS: f64 = 0.5;

/// A result that did not meet expectations. Always retryable.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("result is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("result is missing `{0}`")]
    MissingField(&'static str),
    #[error("reported duration {reported}s does not match requested {requested}s")]
    DurationMismatch { requested: u64, reported: f64 },
}

// ── Report schema ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Report {
    start: Option<StartSection>,
    end: Option<EndSection>,
}

#[derive(Debug, Default, Deserialize)]
struct StartSection {
    test_start: Option<TestStart>,
}

#[derive(Debug, Default, Deserialize)]
struct TestStart {
    duration: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct EndSection {
    sum_received: Option<SumReceived>,
}

#[derive(Debug, Default, Deserialize)]
struct SumReceived {
    bits_per_second: Option<f64>,
}

/// Extracts the received throughput from a run's output and checks that the
/// workload ran for the requested duration.
pub fn parse(run: &RunResult, requested: Duration) -> Result<ParsedMetric, ParseError> {
    let report: Report = serde_json::from_str(&run.raw_output)?;

    let bits_per_second = report
        .end
        .ok_or(ParseError::MissingField("end"))?
        .sum_received
        .ok_or(ParseError::MissingField("end.sum_received"))?
        .bits_per_second
        .ok_or(ParseError::MissingField("end.sum_received.bits_per_second"))?;

    let reported = report
        .start
        .ok_or(ParseError::MissingField("start"))?
        .test_start
        .ok_or(ParseError::MissingField("start.test_start"))?
        .duration
        .ok_or(ParseError::MissingField("start.test_start.duration"))?;

    let requested = whole_seconds(requested);
    if (reported - requested as f64).abs() > DURATION_TOLERANCE_SECS {
        return Err(ParseError::DurationMismatch {
            requested,
            reported,
        });
    }

    Ok(ParsedMetric {
        throughput_mbps: bits_per_second / BITS_PER_MEGABIT,
        succeeded: true,
    })
}

// ── Artifacts ───────────────────────────────────────────────────────

/// Contents of `<name>.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricRecord {
    pub test: String,
    pub iteration: u32,
    pub throughput_mbps: f64,
    pub succeeded: bool,
    pub recorded_at: DateTime<Utc>,
    /// The workload's report, unmodified.
    pub report: Value,
}

/// Writes `<name>.json` and `<name>_value.json` for one successful case.
///
/// The samples are written first so a metric file, the resumability signal,
/// only ever exists next to its sample series.
pub fn persist(
    name: &str,
    metric: &ParsedMetric,
    run: &RunResult,
    ctx: &IterationContext,
) -> Result<()> {
    let report: Value =
        serde_json::from_str(&run.raw_output).context("re-reading workload report")?;
    let record = MetricRecord {
        test: name.to_string(),
        iteration: ctx.iteration_index,
        throughput_mbps: metric.throughput_mbps,
        succeeded: metric.succeeded,
        recorded_at: Utc::now(),
        report,
    };

    write_json(&ctx.values_path(name), &run.samples)?;
    write_json(&ctx.metric_path(name), &record)?;
    Ok(())
}

/// Reads back a persisted sample series.
pub fn load_samples(ctx: &IterationContext, name: &str) -> Result<Vec<Sample>> {
    let path = ctx.values_path(name);
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn load_metric(ctx: &IterationContext, name: &str) -> Result<MetricRecord> {
    let path = ctx.metric_path(name);
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Marks an iteration as fully swept.
pub fn mark_complete(ctx: &IterationContext) -> Result<()> {
    let stamp = serde_json::json!({ "completed_at": Utc::now() });
    write_json(&ctx.completion_marker(), &stamp)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes).with_context(|| format!("writing {}", path.display()))
}

/// Writes through a temporary sibling and renames it into place, so readers
/// never see a partially written file.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}
