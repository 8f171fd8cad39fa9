//! Preflight check types and report.

/// Result of a single preflight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// `create` will fail.
    Fail,
    /// Only some runs are affected (one output format, one extractor).
    Warn,
}

impl CheckStatus {
    fn label(self) -> (&'static str, &'static str) {
        match self {
            CheckStatus::Pass => ("✓", "PASS"),
            CheckStatus::Fail => ("✗", "FAIL"),
            CheckStatus::Warn => ("⚠", "WARN"),
        }
    }
}

impl CheckResult {
    fn with(name: impl Into<String>, status: CheckStatus, details: Option<String>) -> Self {
        Self {
            name: name.into(),
            status,
            details,
        }
    }

    pub fn pass_with(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Pass, Some(details.into()))
    }

    pub fn fail(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Fail, Some(details.into()))
    }

    pub fn warn(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Warn, Some(details.into()))
    }
}

/// Results of all preflight checks.
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Returns true if no check failed.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let (icon, status) = check.status.label();
            match &check.details {
                Some(details) => println!("  {} [{}] {}: {}", icon, status, check.name, details),
                None => println!("  {} [{}] {}", icon, status, check.name),
            }
        }

        println!();
        println!(
            "Summary: {}/{} passed",
            self.count(CheckStatus::Pass),
            self.checks.len()
        );
        if self.fail_count() > 0 {
            println!("         {} FAILED - create will not succeed", self.fail_count());
        }
        if self.warn_count() > 0 {
            println!("         {} warnings", self.warn_count());
        }
    }
}
