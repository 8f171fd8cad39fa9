//! Environment checks (data directories, loader).

use std::fs;
use std::path::Path;

use crate::config::Config;

use super::types::CheckResult;

/// Check the data directories are writable and the loader exists.
pub fn check_environment(config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (label, dir) in [
        ("images/", config.images_dir()),
        ("sysexts/", config.sysexts_dir()),
        ("sysexts-rootfs/", config.rootfs_dir()),
    ] {
        results.push(check_writable(label, &dir));
    }

    let loader = Path::new(&config.loader_path);
    if loader.exists() {
        results.push(CheckResult::pass_with("loader", &config.loader_path));
    } else {
        results.push(CheckResult::warn(
            "loader",
            format!(
                "{} does not exist on this host. Relocated binaries will not start here. Set OCI_SYSEXT_LOADER to override.",
                config.loader_path
            ),
        ));
    }

    results
}

fn check_writable(label: &str, dir: &Path) -> CheckResult {
    if let Err(e) = fs::create_dir_all(dir) {
        return CheckResult::fail(label, format!("Cannot create {}: {}", dir.display(), e));
    }

    let probe = dir.join(".preflight-test");
    match fs::write(&probe, "test") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            CheckResult::pass_with(label, dir.display().to_string())
        }
        Err(e) => CheckResult::fail(label, format!("Cannot write to {}: {}", dir.display(), e)),
    }
}
