//! Image packaging: turn a finished rootfs into `sysexts/<name>.raw`.
//!
//! Formatting is left to the external tools; this module only picks the
//! command lines and, for ext4, sizes the container up front.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

use crate::error::{IoResultExt, Result, SysextError};
use crate::oplog::OpsLog;
use crate::process::Cmd;
use crate::rootfs::RootfsTree;

/// Headroom added on top of the measured tree size for ext4, in MiB.
pub const EXT4_MARGIN_MB: u64 = 32;

const MIB: u64 = 1024 * 1024;

/// Output filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsKind {
    Squashfs,
    Btrfs,
    #[default]
    Ext4,
}

impl FsKind {
    pub const ALL: [FsKind; 3] = [FsKind::Squashfs, FsKind::Btrfs, FsKind::Ext4];

    pub fn as_str(self) -> &'static str {
        match self {
            FsKind::Squashfs => "squashfs",
            FsKind::Btrfs => "btrfs",
            FsKind::Ext4 => "ext4",
        }
    }

    /// Host tools needed to produce this format.
    pub fn tools(self) -> &'static [&'static str] {
        match self {
            FsKind::Squashfs => &["mksquashfs"],
            FsKind::Btrfs => &["mkfs.btrfs"],
            FsKind::Ext4 => &["truncate", "mkfs.ext4", "resize2fs"],
        }
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FsKind {
    type Err = SysextError;

    fn from_str(s: &str) -> Result<Self> {
        FsKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                SysextError::invalid(format!(
                    "unsupported filesystem '{}' (expected squashfs, btrfs or ext4)",
                    s
                ))
            })
    }
}

/// Sum of the sizes of every non-directory entry, symlinks counted by
/// their own length.
pub fn disk_usage_bytes(root: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        total += entry.metadata()?.len();
    }
    Ok(total)
}

/// Container size for an ext4 image holding `bytes` of content.
pub fn ext4_image_size_mb(bytes: u64) -> u64 {
    (bytes + MIB / 2) / MIB + EXT4_MARGIN_MB
}

/// Produces raw images under the sysexts directory.
pub struct Packager {
    sysexts_dir: PathBuf,
    ops: OpsLog,
}

impl Packager {
    pub fn new(sysexts_dir: impl Into<PathBuf>, ops: OpsLog) -> Self {
        Self {
            sysexts_dir: sysexts_dir.into(),
            ops,
        }
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.sysexts_dir.join(format!("{}.raw", name))
    }

    /// Format `tree` as `kind` into the output path for `name`.
    ///
    /// Any previous image at that path is removed first. A failing tool
    /// aborts with its output verbatim.
    pub fn package(&self, tree: &RootfsTree, name: &str, kind: FsKind) -> Result<PathBuf> {
        let output = self.output_path(name);
        fs::create_dir_all(&self.sysexts_dir).at(&self.sysexts_dir)?;
        if output.symlink_metadata().is_ok() {
            fs::remove_file(&output).at(&output)?;
        }

        tracing::info!(fs = %kind, output = %output.display(), "Packaging sysext");
        let root = tree.root();

        match kind {
            FsKind::Squashfs => {
                Cmd::new("mksquashfs")
                    .arg_path(root)
                    .arg_path(&output)
                    .record(&self.ops)
                    .run()?;
            }
            FsKind::Btrfs => {
                Cmd::new("mkfs.btrfs")
                    .args(["--mixed", "-m", "single", "-d", "single", "--shrink"])
                    .arg("--rootdir")
                    .arg_path(root)
                    .arg_path(&output)
                    .record(&self.ops)
                    .run()?;
            }
            FsKind::Ext4 => {
                let bytes = disk_usage_bytes(root)?;
                let size_mb = ext4_image_size_mb(bytes);
                tracing::debug!(bytes, size_mb, "Sizing ext4 image");

                Cmd::new("truncate")
                    .arg("-s")
                    .arg(format!("{}M", size_mb))
                    .arg_path(&output)
                    .record(&self.ops)
                    .run()?;
                Cmd::new("mkfs.ext4")
                    .args(["-E", "root_owner=0:0", "-d"])
                    .arg_path(root)
                    .arg_path(&output)
                    .record(&self.ops)
                    .run()?;
                Cmd::new("resize2fs")
                    .arg("-M")
                    .arg_path(&output)
                    .record(&self.ops)
                    .run()?;
            }
        }

        let size = fs::metadata(&output).at(&output)?.len();
        tracing::info!(output = %output.display(), mb = size / MIB, "Sysext image created");
        Ok(output)
    }
}
