//! Orchestration core of the multipath benchmark runner.
//!
//! - [`coordinator`] runs one test case: workload, telemetry sampling, and the
//!   interference schedule in parallel, with shaping reset on every exit
//! - [`recorder`] parses workload reports and persists artifacts
//! - [`matrix`] sweeps the experiment matrix with retry and resumption
//! - [`telemetry`], [`workload`], and [`host`] wrap the external collaborators

pub mod coordinator;
pub mod host;
pub mod matrix;
pub mod recorder;
pub mod signal;
pub mod telemetry;
pub mod workload;
