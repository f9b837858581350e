//! The benchmark workload: one synchronous `qperf` client invocation.

use std::process::Command;
use std::time::Duration;

use mpbench_common::config::WorkloadConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{binary} exited with {status}: {stderr}")]
    Exit {
        binary: String,
        status: String,
        stderr: String,
    },
}

/// Runs the workload against `endpoint` for roughly `duration` and returns
/// its structured standard output.
pub trait Workload: Send + Sync {
    fn run(&self, endpoint: &str, duration: Duration) -> Result<String, WorkloadError>;
}

/// Duration handed to the workload binary, in whole seconds rounded up.
pub fn whole_seconds(duration: Duration) -> u64 {
    (duration.as_millis() as u64).div_ceil(1000)
}

#[derive(Debug, Clone)]
pub struct QperfWorkload {
    binary: String,
    extra_args: Vec<String>,
}

impl QperfWorkload {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(cfg: &WorkloadConfig) -> Self {
        Self {
            binary: cfg.binary.clone(),
            extra_args: cfg.extra_args.clone(),
        }
    }

    /// `-c <host> -Z -J -t <secs>`: client mode, multipath, JSON output.
    pub fn args(&self, endpoint: &str, duration: Duration) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-c".into(),
            endpoint.into(),
            "-Z".into(),
            "-J".into(),
            "-t".into(),
            whole_seconds(duration).to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl Workload for QperfWorkload {
    fn run(&self, endpoint: &str, duration: Duration) -> Result<String, WorkloadError> {
        let args = self.args(endpoint, duration);
        tracing::debug!(binary = %self.binary, ?args, "starting workload");

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|source| WorkloadError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(WorkloadError::Exit {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_seconds_rounds_up() {
        assert_eq!(whole_seconds(Duration::ZERO), 0);
        assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
        assert_eq!(whole_seconds(Duration::from_millis(6000)), 6);
        assert_eq!(whole_seconds(Duration::from_millis(6001)), 7);
    }

    #[test]
    fn args_follow_client_invocation() {
        let workload = QperfWorkload::from_config(&WorkloadConfig {
            binary: "qperf".into(),
            server_host: "server1".into(),
            extra_args: vec!["--verbose".into()],
        });
        assert_eq!(
            workload.args("server1", Duration::from_secs(10)),
            vec!["-c", "server1", "-Z", "-J", "-t", "10", "--verbose"]
        );
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let workload = QperfWorkload::new("/nonexistent/qperf-binary");
        let err = workload
            .run("server1", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, WorkloadError::Spawn { .. }));
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let workload = QperfWorkload::new("false");
        let err = workload.run("server1", Duration::ZERO).unwrap_err();
        assert!(matches!(err, WorkloadError::Exit { .. }));
    }
}
