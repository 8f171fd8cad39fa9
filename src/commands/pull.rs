//! Pull command - fetches an image into the local store.

use anyhow::{Context, Result};

use oci_sysext::config::Config;
use oci_sysext::oci::ImageManifest;
use oci_sysext::pipeline::Pipeline;

/// Execute the pull command.
pub fn cmd_pull(config: &Config, reference: &str) -> Result<()> {
    let dir = Pipeline::from_config(config)
        .pull(reference)
        .with_context(|| format!("Failed to pull {}", reference))?;
    let manifest = ImageManifest::read(&dir)?;

    println!("{}: {} layer(s) in {}", reference, manifest.len(), dir.display());
    for (index, layer) in manifest.layers.iter().enumerate() {
        println!("  [{}] {} ({} bytes)", index, layer.digest, layer.size);
    }
    Ok(())
}
