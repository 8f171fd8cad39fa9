//! Preflight checks for oci-sysext.
//!
//! Validates host tools and data directories before a `create` run.
//! Run with `oci-sysext preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(config));

    println!("Checking environment...");
    checks.extend(environment::check_environment(config));

    println!();

    PreflightReport { checks }
}
