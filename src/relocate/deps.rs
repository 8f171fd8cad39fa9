//! Shared-library dependency listing.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::oplog::OpsLog;
use crate::process::Cmd;

/// Lists the shared libraries a binary links against directly.
pub trait DependencyLister {
    /// Resolved host paths of the binary's libraries.
    fn dependencies(&self, binary: &Path) -> Result<Vec<PathBuf>>;
}

/// Dependencies as reported by `ldd`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LddOutput {
    pub resolved: Vec<PathBuf>,
    /// Sonames the resolver could not find
    pub missing: Vec<String>,
}

/// Parse `ldd` output.
///
/// Only `name => /path (addr)` lines count. The vDSO and the loader line
/// carry no `=>` and are ignored.
///
/// Example:
/// ```text
///     linux-vdso.so.1 (0x00007ffd6b1f5000)
///     libz.so.1 => /lib/x86_64-linux-gnu/libz.so.1 (0x00007f3a1c000000)
///     libfoo.so.2 => not found
///     /lib64/ld-linux-x86-64.so.2 (0x00007f3a1c400000)
/// ```
pub fn parse_ldd_output(output: &str) -> LddOutput {
    let mut parsed = LddOutput::default();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 || parts[1] != "=>" {
            continue;
        }
        match parts[2] {
            "not" => parsed.missing.push(parts[0].to_string()),
            path if path.starts_with('/') => parsed.resolved.push(PathBuf::from(path)),
            _ => {}
        }
    }

    parsed
}

/// Runs the host's `ldd`.
pub struct Ldd {
    ops: OpsLog,
}

impl Ldd {
    pub fn new(ops: OpsLog) -> Self {
        Self { ops }
    }
}

impl DependencyLister for Ldd {
    fn dependencies(&self, binary: &Path) -> Result<Vec<PathBuf>> {
        let result = Cmd::new("ldd").arg_path(binary).record(&self.ops).run()?;
        let parsed = parse_ldd_output(&result.stdout);

        for soname in &parsed.missing {
            tracing::warn!(binary = %binary.display(), library = %soname, "Library not found by ldd, skipping");
        }
        Ok(parsed.resolved)
    }
}
