//! Symlink normalizer.
//!
//! Layers are built for a real `/`. Once the tree lives somewhere else, an
//! absolute link target (and a relative one that only resolved under the
//! original root) points at the wrong place. Normalization re-anchors those
//! targets under the tree root.
//!
//! Whether a relative link resolves is decided inside the tree with
//! [`RootfsTree::resolve`], so nothing on the build host affects the result.
//!
//! Split in three steps so the decision logic can be tested without a
//! filesystem: [`scan`] snapshots the links, [`plan`] decides, [`apply`]
//! rewrites.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};
use crate::oplog::OpsLog;
use crate::rootfs::RootfsTree;

/// Top-level directories merged-/usr images only carry as aliases into
/// `/usr`. Retention deletes the aliases, so targets through them are
/// looked up under `/usr` instead.
const MERGED_USR_DIRS: &[&str] = &["bin", "sbin", "lib", "lib64"];

/// A symlink as found in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkEntry {
    pub path: PathBuf,
    pub target: PathBuf,
    /// Whether `target` resolved inside the tree, from the link's directory
    pub resolves: bool,
    /// The target is missing as written but exists under `/usr`
    pub under_usr: bool,
}

impl SymlinkEntry {
    pub fn is_absolute(&self) -> bool {
        self.target.is_absolute()
    }
}

/// One planned rewrite. The link keeps its path; only the target changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkRewrite {
    pub path: PathBuf,
    pub original_target: PathBuf,
    pub rewritten_target: PathBuf,
    pub absolute: bool,
}

/// Snapshot every symlink under the tree.
pub fn scan(tree: &RootfsTree) -> Result<Vec<SymlinkEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(tree.root()).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.path_is_symlink() {
            continue;
        }

        let path = entry.into_path();
        let target = fs::read_link(&path).at(&path)?;

        let dir = path
            .parent()
            .and_then(|p| p.strip_prefix(tree.root()).ok())
            .unwrap_or(Path::new(""));
        let resolves = tree.resolve(&dir.join(&target)).is_some();

        let rewritten = target.is_absolute() || !resolves;
        let under_usr = rewritten
            && tree.resolve(&target).is_none()
            && merged_usr_target(tree, &target).is_some_and(|alt| tree.resolve(&alt).is_some());

        entries.push(SymlinkEntry {
            path,
            target,
            resolves,
            under_usr,
        });
    }

    Ok(entries)
}

/// `/bin/x` as `/usr/bin/x`, for the directories in [`MERGED_USR_DIRS`].
fn merged_usr_target(tree: &RootfsTree, target: &Path) -> Option<PathBuf> {
    let anchored = tree.reanchor(target);
    let inner = anchored.strip_prefix(tree.root()).ok()?;
    let first = inner.components().next()?;
    MERGED_USR_DIRS
        .iter()
        .any(|dir| first.as_os_str() == *dir)
        .then(|| Path::new("/usr").join(inner))
}

/// Decide which links to rewrite.
///
/// Absolute targets are always re-anchored. Relative targets are re-anchored
/// only when they did not resolve; working relative links are left alone.
/// Targets found only under `/usr` are re-anchored there.
pub fn plan(tree: &RootfsTree, entries: &[SymlinkEntry]) -> Vec<SymlinkRewrite> {
    entries
        .iter()
        .filter(|e| e.is_absolute() || !e.resolves)
        .map(|e| {
            let rewritten_target = e
                .under_usr
                .then(|| merged_usr_target(tree, &e.target))
                .flatten()
                .map(|alt| tree.reanchor(&alt))
                .unwrap_or_else(|| tree.reanchor(&e.target));

            SymlinkRewrite {
                path: e.path.clone(),
                original_target: e.target.clone(),
                rewritten_target,
                absolute: e.is_absolute(),
            }
        })
        .collect()
}

/// Replace each planned link with one pointing at the rewritten target.
pub fn apply(rewrites: &[SymlinkRewrite], ops: &OpsLog) -> Result<()> {
    for rewrite in rewrites {
        fs::remove_file(&rewrite.path).at(&rewrite.path)?;
        symlink(&rewrite.rewritten_target, &rewrite.path).at(&rewrite.path)?;

        ops.record(format!(
            "symlink {} -> {} (was {})",
            rewrite.path.display(),
            rewrite.rewritten_target.display(),
            rewrite.original_target.display()
        ));
        tracing::debug!(
            link = %rewrite.path.display(),
            target = %rewrite.rewritten_target.display(),
            absolute = rewrite.absolute,
            "Rewrote symlink"
        );
    }
    Ok(())
}

/// Scan, plan and apply in one go.
pub fn normalize(tree: &RootfsTree, ops: &OpsLog) -> Result<Vec<SymlinkRewrite>> {
    let entries = scan(tree)?;
    let rewrites = plan(tree, &entries);

    tracing::info!(
        symlinks = entries.len(),
        rewrites = rewrites.len(),
        "Normalizing symlinks"
    );
    apply(&rewrites, ops)?;
    Ok(rewrites)
}
