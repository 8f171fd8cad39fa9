//! Append-only operations log.
//!
//! Every external command and every file the pipeline rewrites or copies is
//! recorded as one line, so a finished (or half-finished) tree can be audited
//! afterwards. Failing to write the audit line never fails the pipeline.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct OpsLog {
    path: Option<PathBuf>,
}

impl OpsLog {
    /// Log to the given file, creating it on first write.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A log that drops every record.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one line.
    pub fn record(&self, line: impl AsRef<str>) {
        let Some(path) = &self.path else {
            return;
        };

        let line = line.as_ref();
        tracing::trace!(op = line, "Recording operation");

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(log = %path.display(), error = %e, "Cannot create operations log directory");
                return;
            }
        }

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{}", line));

        if let Err(e) = written {
            tracing::warn!(log = %path.display(), error = %e, "Failed to write operations log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_are_appended_in_order() {
        let temp = TempDir::new().unwrap();
        let log = OpsLog::to_file(temp.path().join("nested/ops.log"));

        log.record("patchelf --set-rpath /x /y");
        log.record("copy /a -> /b");

        let content = std::fs::read_to_string(temp.path().join("nested/ops.log")).unwrap();
        assert_eq!(content, "patchelf --set-rpath /x /y\ncopy /a -> /b\n");
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let log = OpsLog::disabled();
        log.record("anything");
        assert!(log.path().is_none());
    }
}
