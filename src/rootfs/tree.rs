//! The rootfs arena: one working directory per image identity.

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{IoResultExt, Result};
use crate::oci::image_id;

/// Metadata directory the host's extension loader scans.
pub const RELEASE_DIR: &str = "usr/lib/extension-release.d";

/// Library directory copied dependencies land in. Lives under `usr` so the
/// retention policy keeps it.
pub const LIBRARY_DIR: &str = "usr/lib";

/// Same limit the kernel applies to a single lookup.
const MAX_LINK_HOPS: usize = 40;

/// A rootfs under assembly.
///
/// Owned by exactly one `create` run at a time; concurrent runs for the same
/// image would clobber each other's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootfsTree {
    root: PathBuf,
}

impl RootfsTree {
    /// Arena for `reference` under `rootfs_dir`, keyed by the image id.
    pub fn for_image(rootfs_dir: &Path, reference: &str) -> Self {
        Self::at(rootfs_dir.join(image_id(reference)))
    }

    /// Rewritten symlinks embed the root, so it is made absolute here.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove any previous contents and recreate the empty root.
    pub fn prepare(&self) -> Result<()> {
        if self.root.symlink_metadata().is_ok() {
            tracing::debug!(root = %self.root.display(), "Removing previous rootfs");
            fs::remove_dir_all(&self.root).at(&self.root)?;
        }
        fs::create_dir_all(&self.root).at(&self.root)?;
        Ok(())
    }

    pub fn release_dir(&self) -> PathBuf {
        self.root.join(RELEASE_DIR)
    }

    pub fn library_dir(&self) -> PathBuf {
        self.root.join(LIBRARY_DIR)
    }

    /// Re-anchor a target meant for the original `/` under this tree.
    ///
    /// The target is normalized lexically; `..` never climbs above the root,
    /// so the result is always inside the tree.
    pub fn reanchor(&self, target: &Path) -> PathBuf {
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in target.components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::ParentDir => {
                    parts.pop();
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }

        let mut anchored = self.root.clone();
        anchored.extend(parts);
        anchored
    }

    /// Look `path` up as if the tree were `/`, following the tree's own
    /// symlinks and never the host's.
    ///
    /// Absolute link targets restart at the tree root. Returns the in-tree
    /// location the lookup ends at, or `None` when a component is missing,
    /// a `..` would climb above the root, or the chain loops.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        let mut pending = Vec::new();
        push_components(&mut pending, path);

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        let mut hops = 0usize;

        while let Some(part) = pending.pop() {
            if part == ".." {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
                continue;
            }

            let candidate = resolved.join(&part);
            let metadata = candidate.symlink_metadata().ok()?;
            if !metadata.file_type().is_symlink() {
                resolved = candidate;
                depth += 1;
                continue;
            }

            hops += 1;
            if hops > MAX_LINK_HOPS {
                return None;
            }
            let target = fs::read_link(&candidate).ok()?;
            if target.is_absolute() {
                resolved = self.root.clone();
                depth = 0;
            }
            push_components(&mut pending, &target);
        }

        Some(resolved)
    }

    /// Whether `path` is lexically inside the tree.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

/// Queue `path`'s components so the first one is popped next.
fn push_components(pending: &mut Vec<OsString>, path: &Path) {
    for component in path.components().rev() {
        match component {
            Component::Normal(part) => pending.push(part.to_os_string()),
            Component::ParentDir => pending.push(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}
