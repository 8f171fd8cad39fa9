//! Configuration management for oci-sysext.
//!
//! Reads configuration from the process environment. `main` loads a `.env`
//! file (if present) into the environment first, so `.env` values apply
//! unless the shell already set them.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::oplog::OpsLog;

/// Directory name appended to every data-home candidate.
pub const APP_DIR: &str = "oci-sysext";

/// Which extractor unpacks layer archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// External `tar` binary.
    Tar,
    /// In-process `tar` + `flate2`.
    Native,
}

/// oci-sysext configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of all persistent state (images, arenas, raw outputs)
    pub home: PathBuf,
    /// Loader path written into every dynamically linked binary
    pub loader_path: String,
    /// Operations log file, `None` when disabled
    pub ops_log: Option<PathBuf>,
    pub extractor: ExtractorKind,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build configuration from an explicit variable map.
    ///
    /// Data home lookup order:
    /// 1. `OCI_SYSEXT_HOME` (or the legacy `OCI-SYSEXT_HOME`) + `/oci-sysext`
    /// 2. `XDG_DATA_HOME` + `/oci-sysext`
    /// 3. `~/.local/share/oci-sysext`
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let non_empty = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let home = non_empty("OCI_SYSEXT_HOME")
            .or_else(|| non_empty("OCI-SYSEXT_HOME"))
            .or_else(|| non_empty("XDG_DATA_HOME"))
            .map(|base| PathBuf::from(base).join(APP_DIR))
            .unwrap_or_else(|| {
                non_empty("HOME")
                    .map(PathBuf::from)
                    .or_else(dirs::home_dir)
                    .unwrap_or_else(|| PathBuf::from("/"))
                    .join(".local/share")
                    .join(APP_DIR)
            });

        let loader_path =
            non_empty("OCI_SYSEXT_LOADER").unwrap_or_else(|| default_loader().to_string());

        let ops_log = match non_empty("OCI_SYSEXT_OPS_LOG").as_deref() {
            Some("off") | Some("0") | Some("false") => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(home.join("operations.log")),
        };

        let extractor = match non_empty("OCI_SYSEXT_EXTRACTOR").as_deref() {
            Some("native") => ExtractorKind::Native,
            Some("tar") | None => ExtractorKind::Tar,
            Some(other) => {
                tracing::warn!(value = other, "Unknown OCI_SYSEXT_EXTRACTOR, using tar");
                ExtractorKind::Tar
            }
        };

        Self {
            home,
            loader_path,
            ops_log,
            extractor,
        }
    }

    /// Pulled images, one directory per image id.
    pub fn images_dir(&self) -> PathBuf {
        self.home.join("images")
    }

    /// Finished raw images.
    pub fn sysexts_dir(&self) -> PathBuf {
        self.home.join("sysexts")
    }

    /// Rootfs arenas, one directory per image id.
    pub fn rootfs_dir(&self) -> PathBuf {
        self.home.join("sysexts-rootfs")
    }

    pub fn ops_log(&self) -> OpsLog {
        match &self.ops_log {
            Some(path) => OpsLog::to_file(path),
            None => OpsLog::disabled(),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  HOME:       {}", self.home.display());
        println!("  IMAGES:     {}", self.images_dir().display());
        println!("  ROOTFS:     {}", self.rootfs_dir().display());
        println!("  SYSEXTS:    {}", self.sysexts_dir().display());
        println!("  LOADER:     {}", self.loader_path);
        println!("  EXTRACTOR:  {:?}", self.extractor);
        match &self.ops_log {
            Some(path) => println!("  OPS LOG:    {}", path.display()),
            None => println!("  OPS LOG:    disabled"),
        }
    }
}

/// Dynamic loader for the architecture this tool was built for.
pub fn default_loader() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "/lib/ld-linux-aarch64.so.1",
        "riscv64" => "/lib/ld-linux-riscv64-lp64d.so.1",
        "x86" => "/lib/ld-linux.so.2",
        _ => "/lib64/ld-linux-x86-64.so.2",
    }
}
