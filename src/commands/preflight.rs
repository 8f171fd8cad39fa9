//! Preflight command - runs preflight checks.

use anyhow::{bail, Result};

use oci_sysext::config::Config;
use oci_sysext::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, strict: bool) -> Result<()> {
    config.print();
    println!();

    let report = preflight::run_preflight(config);
    report.print();

    if !report.all_passed() {
        if strict {
            bail!(
                "Preflight failed: {} check(s) failed. Fix the issues above before creating sysexts.",
                report.fail_count()
            );
        }
        println!("Some checks failed. Use --strict to fail with a non-zero exit.");
    } else {
        println!("All preflight checks passed!\n");
    }
    Ok(())
}
