//! Network condition control for benchmark runs.
//!
//! Provides `tc netem` shaping of the two paths of a multipath link, the
//! [`ConditionController`](controller::ConditionController) seam the runner
//! drives. Test helpers live behind the `test-util` feature.

pub mod controller;
pub mod impairment;
pub mod path;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetemError {
    #[error("failed to run shaping command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },
}
