//! Host tool availability checks.

use crate::config::{Config, ExtractorKind};
use crate::package::FsKind;

use super::types::CheckResult;

/// Tools every relocating `create` run needs, with package hints.
const CORE_TOOLS: &[(&str, &str, &str)] = &[
    ("patchelf", "patchelf", "Required to relocate binaries"),
    ("ldd", "glibc", "Required to list library dependencies"),
    ("skopeo", "skopeo", "Required to pull images"),
];

/// Check host tools are installed.
pub fn check_host_tools(config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (tool, package, purpose) in CORE_TOOLS {
        results.push(check_tool_exists(tool, package, purpose, true));
    }

    // The in-process extractor makes tar optional.
    let tar_required = config.extractor == ExtractorKind::Tar;
    results.push(check_tool_exists(
        "tar",
        "tar",
        "Required to extract layers (or set OCI_SYSEXT_EXTRACTOR=native)",
        tar_required,
    ));

    // Each output format only matters when it is requested.
    for kind in FsKind::ALL {
        let package = match kind {
            FsKind::Squashfs => "squashfs-tools",
            FsKind::Btrfs => "btrfs-progs",
            FsKind::Ext4 => "e2fsprogs",
        };
        for tool in kind.tools() {
            let purpose = format!("Required for --fs {}", kind);
            results.push(check_tool_exists(tool, package, &purpose, false));
        }
    }

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match which::which(tool) {
        Ok(path) => CheckResult::pass_with(tool, path.display().to_string()),
        Err(_) => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, msg)
            } else {
                CheckResult::warn(tool, msg)
            }
        }
    }
}
