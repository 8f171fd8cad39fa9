//! Extension-release marker file.
//!
//! The host's extension loader only accepts an image that carries
//! `usr/lib/extension-release.d/extension-release.<name>` with a matching
//! `ID=` (or `_any`).

use std::fs;
use std::path::PathBuf;

use super::tree::RootfsTree;
use crate::error::{IoResultExt, Result, SysextError};

/// `ID=` value accepted by every host OS.
pub const ANY_OS: &str = "_any";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRelease {
    pub name: String,
    /// Target OS id, [`ANY_OS`] for no constraint
    pub os_id: String,
    pub version_id: Option<String>,
    pub architecture: Option<String>,
    /// Ask the host to reload its service manager after merging
    pub reload_manager: bool,
}

impl ExtensionRelease {
    /// Marker for `name`, compatible with any OS, reload enabled.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            os_id: ANY_OS.to_string(),
            version_id: None,
            architecture: None,
            reload_manager: true,
        })
    }

    pub fn with_os(mut self, os_id: impl Into<String>, version_id: Option<String>) -> Self {
        self.os_id = os_id.into();
        self.version_id = version_id;
        self
    }

    /// Restrict the extension to one architecture (`x86-64`, `arm64`, ...).
    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    pub fn file_name(&self) -> String {
        format!("extension-release.{}", self.name)
    }

    /// `KEY=VALUE` lines.
    pub fn render(&self) -> String {
        let mut out = format!("ID={}\n", self.os_id);
        if let Some(v) = &self.version_id {
            out.push_str(&format!("VERSION_ID={}\n", v));
        }
        if let Some(arch) = &self.architecture {
            out.push_str(&format!("ARCHITECTURE={}\n", arch));
        }
        if self.reload_manager {
            out.push_str("EXTENSION_RELOAD_MANAGER=1\n");
        }
        out
    }

    /// Write the marker into the tree, creating the metadata directory.
    pub fn write(&self, tree: &RootfsTree) -> Result<PathBuf> {
        let dir = tree.release_dir();
        fs::create_dir_all(&dir).at(&dir)?;

        let path = dir.join(self.file_name());
        fs::write(&path, self.render()).at(&path)?;

        tracing::info!(file = %path.display(), "Wrote extension-release");
        Ok(path)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(SysextError::invalid(format!(
            "'{}' is not a valid sysext name",
            name
        )));
    }
    Ok(())
}
