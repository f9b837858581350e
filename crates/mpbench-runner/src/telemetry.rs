//! Telemetry sampling of transport-internal counters.
//!
//! The multipath transport exports its per-path congestion window as one
//! integer per file (`<cwnd_dir>/cwnd_<index>`). Reads never fail the run: an
//! unreadable or unparsable counter is reported as [`CWND_UNAVAILABLE`].

use std::path::PathBuf;

use mpbench_common::models::CWND_UNAVAILABLE;

pub trait TelemetrySampler: Send + Sync {
    /// Current congestion window of path `path_index`, or
    /// [`CWND_UNAVAILABLE`].
    fn sample(&self, path_index: usize) -> i64;
}

#[derive(Debug, Clone)]
pub struct CwndFileSampler {
    dir: PathBuf,
}

impl CwndFileSampler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn counter_path(&self, path_index: usize) -> PathBuf {
        self.dir.join(format!("cwnd_{path_index}"))
    }
}

impl TelemetrySampler for CwndFileSampler {
    fn sample(&self, path_index: usize) -> i64 {
        let path = self.counter_path(path_index);
        match std::fs::read_to_string(&path) {
            Ok(text) => text.trim().parse().unwrap_or_else(|_| {
                tracing::trace!(path = %path.display(), "unparsable cwnd counter");
                CWND_UNAVAILABLE
            }),
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "cwnd counter unreadable");
                CWND_UNAVAILABLE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_counter_per_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cwnd_0"), "14600\n").unwrap();
        std::fs::write(dir.path().join("cwnd_1"), "29200").unwrap();

        let sampler = CwndFileSampler::new(dir.path());
        assert_eq!(sampler.sample(0), 14600);
        assert_eq!(sampler.sample(1), 29200);
    }

    #[test]
    fn failures_report_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cwnd_0"), "not a number").unwrap();

        let sampler = CwndFileSampler::new(dir.path());
        assert_eq!(sampler.sample(0), CWND_UNAVAILABLE);
        assert_eq!(sampler.sample(1), CWND_UNAVAILABLE);
    }
}
