//! Local image storage and the pull collaborator.
//!
//! The pipeline only ever asks two things of the store: where does an image
//! live on disk, and make sure it is there. Talking to a registry is left to
//! an external tool behind [`ImagePuller`].

use std::fs;
use std::path::{Path, PathBuf};

use super::image_id;
use super::manifest::{ImageManifest, MANIFEST_FILE};
use crate::error::{IoResultExt, Result, SysextError};
use crate::oplog::OpsLog;
use crate::process::Cmd;

/// Resolves image references to local directories.
pub trait ImageStore {
    /// Directory an image lives in (whether or not it was pulled yet).
    fn image_dir(&self, reference: &str) -> PathBuf;

    /// Pull the image if its manifest is not present. Returns its directory.
    fn ensure_pulled(&self, reference: &str) -> Result<PathBuf>;
}

/// Fetches an image into a directory laid out as `manifest.json` plus
/// `<hex>.tar.gz` layer archives.
pub trait ImagePuller {
    fn pull(&self, reference: &str, dest: &Path) -> Result<()>;
}

/// Images stored under `<root>/<image_id>`.
pub struct LocalImageStore {
    root: PathBuf,
    puller: Box<dyn ImagePuller>,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, puller: Box<dyn ImagePuller>) -> Self {
        Self {
            root: root.into(),
            puller,
        }
    }

    fn is_pulled(&self, reference: &str) -> bool {
        self.image_dir(reference).join(MANIFEST_FILE).exists()
    }
}

impl ImageStore for LocalImageStore {
    fn image_dir(&self, reference: &str) -> PathBuf {
        self.root.join(image_id(reference))
    }

    fn ensure_pulled(&self, reference: &str) -> Result<PathBuf> {
        let dir = self.image_dir(reference);
        if self.is_pulled(reference) {
            tracing::debug!(image = reference, dir = %dir.display(), "Image already present");
            return Ok(dir);
        }

        tracing::info!(image = reference, "Pulling image");
        fs::create_dir_all(&self.root).at(&self.root)?;

        // Pull into a staging directory so an interrupted pull never looks
        // like a complete image.
        let staging = dir.with_extension("partial");
        if staging.exists() {
            fs::remove_dir_all(&staging).at(&staging)?;
        }
        fs::create_dir_all(&staging).at(&staging)?;

        self.puller.pull(reference, &staging)?;

        if !staging.join(MANIFEST_FILE).exists() {
            return Err(SysextError::not_found("pulled manifest", staging.join(MANIFEST_FILE)));
        }

        if dir.exists() {
            fs::remove_dir_all(&dir).at(&dir)?;
        }
        fs::rename(&staging, &dir).at(&dir)?;

        tracing::info!(image = reference, dir = %dir.display(), "Image pulled");
        Ok(dir)
    }
}

/// Pulls with `skopeo copy <ref> dir:<staging>`.
///
/// skopeo's `dir:` transport names blobs by bare hex digest; they are renamed
/// to `<hex>.tar.gz` so the layout matches what the assembler expects.
pub struct SkopeoPuller {
    ops: OpsLog,
}

impl SkopeoPuller {
    pub fn new(ops: OpsLog) -> Self {
        Self { ops }
    }

    /// Add `docker://` to references that carry no transport.
    pub fn transport_ref(reference: &str) -> String {
        const TRANSPORTS: &[&str] = &[
            "docker://",
            "oci:",
            "oci-archive:",
            "docker-archive:",
            "containers-storage:",
            "dir:",
        ];
        if TRANSPORTS.iter().any(|t| reference.starts_with(t)) {
            reference.to_string()
        } else {
            format!("docker://{}", reference)
        }
    }
}

impl ImagePuller for SkopeoPuller {
    fn pull(&self, reference: &str, dest: &Path) -> Result<()> {
        let blobs = dest.join("blobs");

        Cmd::new("skopeo")
            .arg("copy")
            .arg(Self::transport_ref(reference))
            .arg(format!("dir:{}", blobs.display()))
            .record(&self.ops)
            .run()?;

        let manifest_path = blobs.join(MANIFEST_FILE);
        let manifest = ImageManifest::read(&blobs)?;

        for layer in &manifest.layers {
            let blob = blobs.join(layer.hex());
            if !blob.exists() {
                return Err(SysextError::not_found("layer blob", blob));
            }
            let archive = layer.archive_path(dest);
            fs::rename(&blob, &archive).at(&archive)?;
        }

        let dest_manifest = dest.join(MANIFEST_FILE);
        fs::rename(&manifest_path, &dest_manifest).at(&dest_manifest)?;
        fs::remove_dir_all(&blobs).at(&blobs)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct FakePuller {
        calls: Rc<Cell<usize>>,
        write_manifest: bool,
    }

    impl ImagePuller for FakePuller {
        fn pull(&self, _reference: &str, dest: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.write_manifest {
                fs::write(dest.join(MANIFEST_FILE), r#"{"layers": []}"#).unwrap();
            }
            Ok(())
        }
    }

    #[test]
    fn test_image_dir_is_keyed_by_reference_hash() {
        let temp = TempDir::new().unwrap();
        let store = LocalImageStore::new(
            temp.path(),
            Box::new(FakePuller {
                calls: Rc::default(),
                write_manifest: true,
            }),
        );
        assert_eq!(
            store.image_dir("alpine:3"),
            temp.path().join(image_id("alpine:3"))
        );
    }

    #[test]
    fn test_ensure_pulled_only_pulls_once() {
        let temp = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0));
        let puller = Box::new(FakePuller {
            calls: Rc::clone(&calls),
            write_manifest: true,
        });
        let store = LocalImageStore::new(temp.path(), puller);

        let dir = store.ensure_pulled("alpine:3").unwrap();
        assert!(dir.join(MANIFEST_FILE).exists());
        store.ensure_pulled("alpine:3").unwrap();
        assert_eq!(calls.get(), 1);
        assert!(!dir.with_extension("partial").exists());
    }

    #[test]
    fn test_pull_without_manifest_fails() {
        let temp = TempDir::new().unwrap();
        let store = LocalImageStore::new(
            temp.path(),
            Box::new(FakePuller {
                calls: Rc::default(),
                write_manifest: false,
            }),
        );
        let err = store.ensure_pulled("alpine:3").unwrap_err();
        assert!(matches!(err, SysextError::NotFound { .. }));
        assert!(!store.image_dir("alpine:3").exists());
    }

    #[test]
    fn test_transport_ref() {
        assert_eq!(
            SkopeoPuller::transport_ref("alpine:3"),
            "docker://alpine:3"
        );
        assert_eq!(
            SkopeoPuller::transport_ref("oci-archive:/tmp/a.tar"),
            "oci-archive:/tmp/a.tar"
        );
    }
}
