//! Shared types for the multipath benchmark runner.
//!
//! This crate contains:
//! - **Data model**: test cases, path pairs, samples, run results, iteration layout
//! - **Schedules**: the static interrupt timeline and its per-case resolution
//! - **Configuration**: the TOML experiment table

pub mod config;
pub mod models;
pub mod schedule;
