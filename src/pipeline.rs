//! The `create` pipeline.
//!
//! Manifest reading, layer diffing, assembly, symlink normalization and
//! relocation run one after another on a single [`RootfsTree`]. Each stage
//! runs to completion before the next starts, and the first error aborts the
//! whole run.

use std::path::PathBuf;

use crate::config::{Config, ExtractorKind};
use crate::error::Result;
use crate::oci::{
    diff, DiffStrategy, ImageManifest, ImageStore, LocalImageStore, SkipSource, SkopeoPuller,
};
use crate::oplog::OpsLog;
use crate::package::{FsKind, Packager};
use crate::relocate::{
    BinaryPatcher, DependencyLister, Ldd, Patchelf, RelocationReport, Relocator,
};
use crate::rootfs::{
    ArchiveExtractor, AssemblyReport, ExtensionRelease, NativeTar, RootfsAssembler, RootfsTree,
    TarCommand,
};
use crate::symlinks::{self, SymlinkRewrite};
use crate::timing::Timer;

/// Everything one `create` run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub image: String,
    /// Extension name; names the release file and the output image
    pub name: String,
    pub fs: FsKind,
    pub skip: SkipSource,
    pub strategy: DiffStrategy,
    pub relocate: bool,
    pub os_id: Option<String>,
    pub version_id: Option<String>,
    pub architecture: Option<String>,
}

impl CreateRequest {
    /// Full extraction into ext4, relocation on.
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            fs: FsKind::default(),
            skip: SkipSource::Full,
            strategy: DiffStrategy::default(),
            relocate: true,
            os_id: None,
            version_id: None,
            architecture: None,
        }
    }

    fn release(&self) -> Result<ExtensionRelease> {
        let mut release = ExtensionRelease::new(&self.name)?;
        if let Some(os_id) = &self.os_id {
            release = release.with_os(os_id, self.version_id.clone());
        }
        if let Some(architecture) = &self.architecture {
            release = release.with_architecture(architecture);
        }
        Ok(release)
    }
}

/// What [`Pipeline::build_rootfs`] produced.
#[derive(Debug, Clone)]
pub struct RootfsReport {
    pub tree: RootfsTree,
    pub assembly: AssemblyReport,
    pub symlinks: Vec<SymlinkRewrite>,
    /// `None` when relocation was turned off
    pub relocation: Option<RelocationReport>,
}

/// The collaborators of a `create` run.
pub struct Pipeline {
    store: Box<dyn ImageStore>,
    extractor: Box<dyn ArchiveExtractor>,
    patcher: Box<dyn BinaryPatcher>,
    lister: Box<dyn DependencyLister>,
    packager: Packager,
    rootfs_dir: PathBuf,
    loader: PathBuf,
    ops: OpsLog,
}

impl Pipeline {
    /// Production collaborators: skopeo, tar (or the in-process extractor),
    /// patchelf and ldd.
    pub fn from_config(config: &Config) -> Self {
        let ops = config.ops_log();
        let extractor: Box<dyn ArchiveExtractor> = match config.extractor {
            ExtractorKind::Tar => Box::new(TarCommand::new(ops.clone())),
            ExtractorKind::Native => Box::new(NativeTar),
        };

        Self {
            store: Box::new(LocalImageStore::new(
                config.images_dir(),
                Box::new(SkopeoPuller::new(ops.clone())),
            )),
            extractor,
            patcher: Box::new(Patchelf::new(ops.clone())),
            lister: Box::new(Ldd::new(ops.clone())),
            packager: Packager::new(config.sysexts_dir(), ops.clone()),
            rootfs_dir: config.rootfs_dir(),
            loader: PathBuf::from(&config.loader_path),
            ops,
        }
    }

    pub fn with_store(mut self, store: Box<dyn ImageStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_patcher(mut self, patcher: Box<dyn BinaryPatcher>) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn with_lister(mut self, lister: Box<dyn DependencyLister>) -> Self {
        self.lister = lister;
        self
    }

    /// Make sure an image is available locally.
    pub fn pull(&self, reference: &str) -> Result<PathBuf> {
        self.store.ensure_pulled(reference)
    }

    /// Assemble, normalize and relocate the rootfs for `request`.
    pub fn build_rootfs(&self, request: &CreateRequest) -> Result<RootfsReport> {
        let release = request.release()?;

        let image_dir = self.store.ensure_pulled(&request.image)?;
        let manifest = ImageManifest::read(&image_dir)?;
        let skip = self.skip_count(request, &manifest)?;

        let tree = RootfsTree::for_image(&self.rootfs_dir, &request.image);

        let timer = Timer::start("Rootfs assembly");
        let assembly = RootfsAssembler::new(&tree, self.extractor.as_ref(), release)
            .assemble(&manifest, &image_dir, skip)?;
        timer.finish();

        let timer = Timer::start("Symlink normalization");
        let symlinks = symlinks::normalize(&tree, &self.ops)?;
        timer.finish();

        let relocation = if request.relocate {
            let timer = Timer::start("Binary relocation");
            let report = Relocator::new(
                &tree,
                &self.loader,
                self.patcher.as_ref(),
                self.lister.as_ref(),
                &self.ops,
            )
            .relocate()?;
            timer.finish();
            Some(report)
        } else {
            tracing::info!("Relocation disabled, leaving binaries untouched");
            None
        };

        Ok(RootfsReport {
            tree,
            assembly,
            symlinks,
            relocation,
        })
    }

    /// Build the rootfs and package it. Returns the raw image path.
    pub fn create(&self, request: &CreateRequest) -> Result<PathBuf> {
        let report = self.build_rootfs(request)?;

        let timer = Timer::start("Packaging");
        let output = self.packager.package(&report.tree, &request.name, request.fs)?;
        timer.finish();

        Ok(output)
    }

    /// Raw skip count; validated later by the assembler.
    fn skip_count(&self, request: &CreateRequest, manifest: &ImageManifest) -> Result<i64> {
        match &request.skip {
            SkipSource::Full => Ok(0),
            SkipSource::Explicit(n) => Ok(i64::try_from(*n).unwrap_or(i64::MAX)),
            SkipSource::Reference(reference) => {
                let reference_dir = self.store.ensure_pulled(reference)?;
                let reference_manifest = ImageManifest::read(&reference_dir)?;
                let raw = diff::raw_skip_count(manifest, &reference_manifest, request.strategy);
                tracing::info!(
                    reference = %reference,
                    strategy = %request.strategy,
                    skip = raw,
                    "Diffed against reference image"
                );
                Ok(raw)
            }
        }
    }
}
