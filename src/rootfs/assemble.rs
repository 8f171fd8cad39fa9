//! Rootfs assembler: layered extraction, retention and release metadata.

use std::fs;
use std::path::{Path, PathBuf};

use super::extract::ArchiveExtractor;
use super::release::ExtensionRelease;
use super::tree::RootfsTree;
use crate::error::{IoResultExt, Result, SysextError};
use crate::oci::{ImageManifest, SkipCount};

/// Top-level entries a sysext may carry. Everything else is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    keep: Vec<String>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::keeping(["usr", "opt"])
    }
}

impl RetentionPolicy {
    fn keeping<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keep: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keeps(&self, name: &str) -> bool {
        self.keep.iter().any(|k| k == name)
    }

    /// Delete every top-level entry not kept. Returns the removed names, sorted.
    pub fn apply(&self, root: &Path) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for entry in fs::read_dir(root).at(root)? {
            let entry = entry.at(root)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.keeps(&name) {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type().at(&path)?;
            tracing::info!(entry = %name, "Removing unneeded top-level entry");
            if file_type.is_dir() {
                fs::remove_dir_all(&path).at(&path)?;
            } else {
                fs::remove_file(&path).at(&path)?;
            }
            removed.push(name);
        }

        removed.sort();
        Ok(removed)
    }
}

/// What an assembly run did.
#[derive(Debug, Clone, Default)]
pub struct AssemblyReport {
    /// Digests left out of extraction, in manifest order
    pub skipped: Vec<String>,
    /// Digests extracted, in manifest order
    pub extracted: Vec<String>,
    /// Top-level entries deleted by the retention policy
    pub removed: Vec<String>,
    pub release_file: PathBuf,
}

/// Materializes a [`RootfsTree`] from a manifest.
pub struct RootfsAssembler<'a> {
    tree: &'a RootfsTree,
    extractor: &'a dyn ArchiveExtractor,
    retention: RetentionPolicy,
    release: ExtensionRelease,
}

impl<'a> RootfsAssembler<'a> {
    pub fn new(
        tree: &'a RootfsTree,
        extractor: &'a dyn ArchiveExtractor,
        release: ExtensionRelease,
    ) -> Self {
        Self {
            tree,
            extractor,
            retention: RetentionPolicy::default(),
            release,
        }
    }

    /// Assemble the tree from `manifest`, leaving out the first `skip` layers.
    ///
    /// # Process
    ///
    /// 1. Validate `skip` against the layer count (no I/O before this)
    /// 2. Clear and recreate the tree
    /// 3. Extract the remaining layers in manifest order, later layers overwriting earlier ones
    /// 4. Apply the retention policy
    /// 5. Write the extension-release marker
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range skip count; `Layer` wrapping the
    /// extractor's error for the first layer that fails. A failed run leaves
    /// the partial tree on disk; the next run clears it.
    pub fn assemble(
        &self,
        manifest: &ImageManifest,
        image_dir: &Path,
        skip: i64,
    ) -> Result<AssemblyReport> {
        let skip = SkipCount::new(skip, manifest.len())?;

        tracing::info!(
            root = %self.tree.root().display(),
            layers = manifest.len(),
            skip = skip.get(),
            "Assembling rootfs"
        );

        self.tree.prepare()?;

        let mut report = AssemblyReport::default();
        for (index, layer) in manifest.layers.iter().enumerate() {
            if index < skip.get() {
                tracing::info!(index, digest = %layer.digest, "Skipping layer");
                report.skipped.push(layer.digest.clone());
                continue;
            }

            let archive = layer.archive_path(image_dir);
            tracing::info!(index, digest = %layer.digest, "Extracting layer");
            self.extractor
                .extract(&archive, self.tree.root())
                .map_err(|e| SysextError::Layer {
                    index,
                    digest: layer.digest.clone(),
                    source: Box::new(e),
                })?;
            report.extracted.push(layer.digest.clone());
        }

        report.removed = self.retention.apply(self.tree.root())?;
        report.release_file = self.release.write(self.tree)?;

        tracing::info!(
            extracted = report.extracted.len(),
            skipped = report.skipped.len(),
            removed = report.removed.len(),
            "Rootfs assembled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::Layer;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Records archive names and writes one marker file per layer.
    #[derive(Default)]
    struct RecordingExtractor {
        seen: RefCell<Vec<String>>,
        fail_on: Option<String>,
    }

    impl ArchiveExtractor for RecordingExtractor {
        fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
            let name = archive.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_on.as_deref() == Some(name.as_str()) {
                return Err(SysextError::invalid("corrupt archive"));
            }
            fs::create_dir_all(dest.join("usr")).unwrap();
            fs::write(dest.join("usr/last"), &name).unwrap();
            fs::create_dir_all(dest.join("etc")).unwrap();
            self.seen.borrow_mut().push(name);
            Ok(())
        }
    }

    fn manifest(n: usize) -> ImageManifest {
        ImageManifest {
            layers: (0..n)
                .map(|i| Layer {
                    media_type: String::new(),
                    size: 0,
                    digest: format!("sha256:{:02}", i),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extracts_trailing_layers_in_order() {
        let temp = TempDir::new().unwrap();
        let tree = RootfsTree::at(temp.path().join("root"));
        let extractor = RecordingExtractor::default();
        let release = ExtensionRelease::new("demo").unwrap();

        let report = RootfsAssembler::new(&tree, &extractor, release)
            .assemble(&manifest(5), temp.path(), 2)
            .unwrap();

        assert_eq!(
            *extractor.seen.borrow(),
            vec!["02.tar.gz", "03.tar.gz", "04.tar.gz"]
        );
        assert_eq!(report.skipped, vec!["sha256:00", "sha256:01"]);
        assert_eq!(report.extracted.len(), 3);
        assert_eq!(fs::read_to_string(tree.root().join("usr/last")).unwrap(), "04.tar.gz");
    }

    #[test]
    fn test_out_of_range_skip_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let tree = RootfsTree::at(temp.path().join("root"));
        let extractor = RecordingExtractor::default();
        let release = ExtensionRelease::new("demo").unwrap();
        let assembler = RootfsAssembler::new(&tree, &extractor, release);

        for skip in [-1, 4] {
            let err = assembler.assemble(&manifest(3), temp.path(), skip).unwrap_err();
            assert!(matches!(err, SysextError::InvalidArgument(_)));
        }
        assert!(extractor.seen.borrow().is_empty());
        assert!(!tree.root().exists());
    }

    #[test]
    fn test_failing_layer_is_identified() {
        let temp = TempDir::new().unwrap();
        let tree = RootfsTree::at(temp.path().join("root"));
        let extractor = RecordingExtractor {
            fail_on: Some("01.tar.gz".to_string()),
            ..Default::default()
        };
        let release = ExtensionRelease::new("demo").unwrap();

        let err = RootfsAssembler::new(&tree, &extractor, release)
            .assemble(&manifest(3), temp.path(), 0)
            .unwrap_err();

        match err {
            SysextError::Layer { index, digest, .. } => {
                assert_eq!(index, 1);
                assert_eq!(digest, "sha256:01");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Partial state stays on disk.
        assert!(tree.root().join("usr/last").exists());
    }

    #[test]
    fn test_retention_and_release() {
        let temp = TempDir::new().unwrap();
        let tree = RootfsTree::at(temp.path().join("root"));
        let extractor = RecordingExtractor::default();
        let release = ExtensionRelease::new("demo").unwrap();

        let report = RootfsAssembler::new(&tree, &extractor, release)
            .assemble(&manifest(1), temp.path(), 0)
            .unwrap();

        assert_eq!(report.removed, vec!["etc"]);
        assert!(!tree.root().join("etc").exists());
        assert!(report.release_file.ends_with("extension-release.demo"));
        assert!(report.release_file.exists());
    }

    #[test]
    fn test_retention_removes_files_and_keeps_listed() {
        let temp = TempDir::new().unwrap();
        for dir in ["usr", "opt", "var"] {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        fs::write(temp.path().join(".dockerenv"), "").unwrap();

        let removed = RetentionPolicy::default().apply(temp.path()).unwrap();

        assert_eq!(removed, vec![".dockerenv", "var"]);
        assert!(temp.path().join("usr").exists());
        assert!(temp.path().join("opt").exists());
    }

    #[test]
    fn test_full_skip_extracts_nothing() {
        let temp = TempDir::new().unwrap();
        let tree = RootfsTree::at(temp.path().join("root"));
        let extractor = RecordingExtractor::default();
        let release = ExtensionRelease::new("demo").unwrap();

        let report = RootfsAssembler::new(&tree, &extractor, release)
            .assemble(&manifest(2), temp.path(), 2)
            .unwrap();

        assert!(report.extracted.is_empty());
        assert!(report.release_file.exists());
    }
}
