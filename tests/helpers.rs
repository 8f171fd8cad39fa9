//! Shared test utilities for oci-sysext tests.
#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use oci_sysext::config::Config;
use oci_sysext::oci::{image_id, ImagePuller, LocalImageStore};
use oci_sysext::relocate::{BinaryPatcher, DependencyLister};
use oci_sysext::{Pipeline, Result, SysextError};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub const TEST_LOADER: &str = "/lib/ld-test.so.1";

/// One entry of a synthetic layer.
pub enum Entry {
    Dir(String),
    File { path: String, data: Vec<u8>, mode: u32 },
    Symlink { path: String, target: String },
}

pub fn dir(path: &str) -> Entry {
    Entry::Dir(path.to_string())
}

pub fn file(path: &str, data: impl Into<Vec<u8>>) -> Entry {
    Entry::File {
        path: path.to_string(),
        data: data.into(),
        mode: 0o644,
    }
}

pub fn exec(path: &str, data: impl Into<Vec<u8>>) -> Entry {
    Entry::File {
        path: path.to_string(),
        data: data.into(),
        mode: 0o755,
    }
}

pub fn symlink(path: &str, target: &str) -> Entry {
    Entry::Symlink {
        path: path.to_string(),
        target: target.to_string(),
    }
}

/// Gzip-compressed tar of `entries`. Deterministic: same entries, same bytes.
pub fn layer(entries: &[Entry]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        match entry {
            Entry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, std::io::empty())
                    .expect("Failed to append dir");
            }
            Entry::File { path, data, mode } => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, data.as_slice())
                    .expect("Failed to append file");
            }
            Entry::Symlink { path, target } => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                builder
                    .append_link(&mut header, path, target)
                    .expect("Failed to append symlink");
            }
        }
    }

    builder
        .into_inner()
        .expect("Failed to finish tar")
        .finish()
        .expect("Failed to finish gzip")
}

/// `sha256:<hex>` of a layer blob.
pub fn digest_of(blob: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(blob)))
}

/// Test environment: a data home with a pre-seeded image store.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub config: Config,
    /// Stand-in for host library directories
    pub host_libs: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let vars = HashMap::from([
            (
                "OCI_SYSEXT_HOME".to_string(),
                temp_dir.path().display().to_string(),
            ),
            ("OCI_SYSEXT_EXTRACTOR".to_string(), "native".to_string()),
            ("OCI_SYSEXT_LOADER".to_string(), TEST_LOADER.to_string()),
        ]);
        let config = Config::from_vars(&vars);

        let host_libs = temp_dir.path().join("host-libs");
        fs::create_dir_all(&host_libs).expect("Failed to create host lib dir");

        Self {
            _temp_dir: temp_dir,
            config,
            host_libs,
        }
    }

    /// Write an image with the given layer blobs into the store.
    /// Returns the layer digests in manifest order.
    pub fn seed_image(&self, reference: &str, blobs: &[Vec<u8>]) -> Vec<String> {
        let dir = self.config.images_dir().join(image_id(reference));
        fs::create_dir_all(&dir).expect("Failed to create image dir");

        let mut digests = Vec::new();
        let mut layers = Vec::new();
        for blob in blobs {
            let digest = digest_of(blob);
            let hex = digest.trim_start_matches("sha256:");
            fs::write(dir.join(format!("{}.tar.gz", hex)), blob).expect("Failed to write layer");
            layers.push(serde_json::json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "size": blob.len(),
                "digest": digest,
            }));
            digests.push(digest);
        }

        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "layers": layers,
        });
        fs::write(
            dir.join("manifest.json"),
            serde_json::to_vec_pretty(&manifest).expect("Failed to encode manifest"),
        )
        .expect("Failed to write manifest");

        digests
    }

    /// A "host" library the fake lister can report.
    pub fn host_library(&self, name: &str) -> PathBuf {
        let path = self.host_libs.join(name);
        fs::write(&path, format!("library {}", name)).expect("Failed to write host library");
        path
    }

    /// Pipeline that never touches the network, patchelf or ldd.
    pub fn pipeline(&self, patcher: &RecordingPatcher, lister: &MapLister) -> Pipeline {
        Pipeline::from_config(&self.config)
            .with_store(Box::new(LocalImageStore::new(
                self.config.images_dir(),
                Box::new(OfflinePuller),
            )))
            .with_patcher(Box::new(patcher.clone()))
            .with_lister(Box::new(lister.clone()))
    }
}

/// Fails every pull; tests only use seeded images.
pub struct OfflinePuller;

impl ImagePuller for OfflinePuller {
    fn pull(&self, reference: &str, _dest: &Path) -> Result<()> {
        Err(SysextError::ExternalTool {
            tool: "skopeo".to_string(),
            code: 1,
            output: format!("offline: cannot pull {}", reference),
        })
    }
}

/// Records patch calls instead of editing files.
#[derive(Clone, Default)]
pub struct RecordingPatcher {
    pub calls: Rc<RefCell<Vec<(String, PathBuf, PathBuf)>>>,
}

impl RecordingPatcher {
    pub fn calls_for(&self, op: &str) -> Vec<(PathBuf, PathBuf)> {
        self.calls
            .borrow()
            .iter()
            .filter(|(o, _, _)| o == op)
            .map(|(_, file, value)| (file.clone(), value.clone()))
            .collect()
    }
}

impl BinaryPatcher for RecordingPatcher {
    fn set_interpreter(&self, binary: &Path, interpreter: &Path) -> Result<()> {
        self.calls.borrow_mut().push((
            "interp".to_string(),
            binary.to_path_buf(),
            interpreter.to_path_buf(),
        ));
        Ok(())
    }

    fn set_rpath(&self, binary: &Path, rpath: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(("rpath".to_string(), binary.to_path_buf(), rpath.to_path_buf()));
        Ok(())
    }
}

/// Dependencies keyed by path relative to the tree root.
#[derive(Clone, Default)]
pub struct MapLister {
    pub deps: Rc<RefCell<HashMap<String, Vec<PathBuf>>>>,
}

impl MapLister {
    pub fn insert(&self, relative: &str, libs: Vec<PathBuf>) {
        self.deps.borrow_mut().insert(relative.to_string(), libs);
    }
}

impl DependencyLister for MapLister {
    fn dependencies(&self, binary: &Path) -> Result<Vec<PathBuf>> {
        let deps = self.deps.borrow();
        Ok(deps
            .iter()
            .find(|(relative, _)| binary.ends_with(relative.as_str()))
            .map(|(_, libs)| libs.clone())
            .unwrap_or_default())
    }
}

/// Little-endian 64-bit ELF with an optional `.interp` section.
pub fn elf64(e_type: u16, interp: Option<&str>) -> Vec<u8> {
    let mut strtab = b"\0.shstrtab\0".to_vec();
    let interp_name = strtab.len() as u32;
    strtab.extend_from_slice(b".interp\0");

    let mut interp_data = Vec::new();
    if let Some(path) = interp {
        interp_data.extend_from_slice(path.as_bytes());
        interp_data.push(0);
    }

    let strtab_off = 64usize;
    let interp_off = strtab_off + strtab.len();
    let shoff = interp_off + interp_data.len();
    let shnum: u16 = if interp.is_some() { 3 } else { 2 };

    let mut out = vec![0u8; 64];
    out[..4].copy_from_slice(b"\x7fELF");
    out[4] = 2;
    out[5] = 1;
    out[6] = 1;
    out[16..18].copy_from_slice(&e_type.to_le_bytes());
    out[0x28..0x30].copy_from_slice(&(shoff as u64).to_le_bytes());
    out[0x3a..0x3c].copy_from_slice(&64u16.to_le_bytes());
    out[0x3c..0x3e].copy_from_slice(&shnum.to_le_bytes());
    out[0x3e..0x40].copy_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&strtab);
    out.extend_from_slice(&interp_data);

    let mut section = |name: u32, offset: usize, size: usize| {
        let mut sh = vec![0u8; 64];
        sh[0..4].copy_from_slice(&name.to_le_bytes());
        sh[24..32].copy_from_slice(&(offset as u64).to_le_bytes());
        sh[32..40].copy_from_slice(&(size as u64).to_le_bytes());
        out.extend(sh);
    };
    section(0, 0, 0);
    section(1, strtab_off, strtab.len());
    if interp.is_some() {
        section(interp_name, interp_off, interp_data.len());
    }
    out
}

/// Everything under `root` as relative path -> description, for comparing trees.
pub fn snapshot(root: &Path) -> BTreeMap<String, String> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .map(|e| e.expect("Failed to walk tree"))
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .expect("Entry outside root")
                .display()
                .to_string();
            let kind = if e.path_is_symlink() {
                format!(
                    "link:{}",
                    fs::read_link(e.path()).expect("Failed to read link").display()
                )
            } else if e.file_type().is_dir() {
                "dir".to_string()
            } else {
                format!(
                    "file:{}",
                    hex::encode(Sha256::digest(fs::read(e.path()).expect("Failed to read file")))
                )
            };
            (rel, kind)
        })
        .collect()
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &Path) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );
    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target,
        expected_target,
        "Symlink {} points to {}, expected {}",
        path.display(),
        target.display(),
        expected_target.display()
    );
}
