//! Create command - turns an OCI image into a sysext image.

use anyhow::{Context, Result};
use std::time::Instant;

use oci_sysext::config::Config;
use oci_sysext::oci::SkipSource;
use oci_sysext::pipeline::{CreateRequest, Pipeline};

/// Execute the create command.
pub fn cmd_create(config: &Config, request: &CreateRequest) -> Result<()> {
    println!("=== Creating sysext '{}' from {} ===\n", request.name, request.image);
    let start = Instant::now();

    match &request.skip {
        SkipSource::Full => {}
        SkipSource::Reference(reference) => {
            println!("Diffing against {} ({})", reference, request.strategy)
        }
        SkipSource::Explicit(n) => println!("Skipping the first {} layer(s)", n),
    }

    let output = Pipeline::from_config(config)
        .create(request)
        .with_context(|| format!("Failed to create sysext '{}'", request.name))?;

    println!(
        "\n=== Created {} in {:.1}s ===",
        output.display(),
        start.elapsed().as_secs_f64()
    );
    if let Some(log) = &config.ops_log {
        println!("Operations log: {}", log.display());
    }
    Ok(())
}
