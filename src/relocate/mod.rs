//! Binary relocator.
//!
//! Dynamically linked executables in the tree still name the loader and
//! library paths of the image they came from. Relocation points them at a
//! fixed loader and at the tree's library directory, and copies in every
//! direct dependency the tree does not already carry.
//!
//! ## Components
//!
//! - **elf**: header and `.interp` inspection
//! - **deps**: dependency listing (`ldd`)
//! - **patch**: in-place metadata rewriting (`patchelf`)

pub mod deps;
pub mod elf;
pub mod patch;

pub use deps::{parse_ldd_output, DependencyLister, Ldd};
pub use elf::{ElfInfo, ElfKind};
pub use patch::{BinaryPatcher, Patchelf};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{IoResultExt, Result, SysextError};
use crate::oplog::OpsLog;
use crate::rootfs::RootfsTree;

/// One ELF candidate found in the tree. Lives for a single relocation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfBinaryEntry {
    pub path: PathBuf,
    pub is_static: bool,
    /// Host paths of direct dependencies; empty for static binaries
    pub dependencies: Vec<PathBuf>,
}

/// A single step of the relocation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationAction {
    SetInterpreter { binary: PathBuf, interpreter: PathBuf },
    SetRpath { binary: PathBuf, rpath: PathBuf },
    CopyLibrary { source: PathBuf, dest: PathBuf },
    SetLibraryRpath { library: PathBuf, rpath: PathBuf },
}

impl RelocationAction {
    /// The file this action modifies or creates.
    pub fn subject(&self) -> &Path {
        match self {
            Self::SetInterpreter { binary, .. } | Self::SetRpath { binary, .. } => binary,
            Self::CopyLibrary { dest, .. } => dest,
            Self::SetLibraryRpath { library, .. } => library,
        }
    }
}

/// Summary of a relocation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    pub binaries: usize,
    pub static_binaries: usize,
    pub patched: usize,
    pub copied_libraries: Vec<PathBuf>,
}

pub struct Relocator<'a> {
    tree: &'a RootfsTree,
    loader: PathBuf,
    patcher: &'a dyn BinaryPatcher,
    lister: &'a dyn DependencyLister,
    ops: &'a OpsLog,
}

impl<'a> Relocator<'a> {
    pub fn new(
        tree: &'a RootfsTree,
        loader: impl Into<PathBuf>,
        patcher: &'a dyn BinaryPatcher,
        lister: &'a dyn DependencyLister,
        ops: &'a OpsLog,
    ) -> Self {
        Self {
            tree,
            loader: loader.into(),
            patcher,
            lister,
            ops,
        }
    }

    /// Find every executable and shared object in the tree.
    ///
    /// Symlinks are not followed; the file they point at is visited on its own.
    pub fn scan(&self) -> Result<Vec<ElfBinaryEntry>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(self.tree.root())
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            let info = match elf::inspect(&path).map_err(|e| wrap(&path, e))? {
                Some(info) if info.is_candidate() => info,
                _ => continue,
            };

            let dependencies = if info.is_static() {
                Vec::new()
            } else {
                self.lister
                    .dependencies(&path)
                    .map_err(|e| wrap(&path, e))?
            };

            entries.push(ElfBinaryEntry {
                path,
                is_static: info.is_static(),
                dependencies,
            });
        }

        Ok(entries)
    }

    /// Turn scanned binaries into actions.
    ///
    /// Static binaries produce nothing. Libraries are copied once per file
    /// name, and not at all if the library directory already holds one.
    pub fn plan(&self, entries: &[ElfBinaryEntry]) -> Vec<RelocationAction> {
        let library_dir = self.tree.library_dir();
        let mut seen = HashSet::new();
        let mut actions = Vec::new();

        for entry in entries.iter().filter(|e| !e.is_static) {
            actions.push(RelocationAction::SetInterpreter {
                binary: entry.path.clone(),
                interpreter: self.loader.clone(),
            });
            actions.push(RelocationAction::SetRpath {
                binary: entry.path.clone(),
                rpath: library_dir.clone(),
            });

            for source in &entry.dependencies {
                let Some(name) = source.file_name() else {
                    continue;
                };
                if !seen.insert(name.to_os_string()) {
                    continue;
                }

                let dest = library_dir.join(name);
                if dest.exists() {
                    continue;
                }
                actions.push(RelocationAction::CopyLibrary {
                    source: source.clone(),
                    dest: dest.clone(),
                });
                actions.push(RelocationAction::SetLibraryRpath {
                    library: dest,
                    rpath: library_dir.clone(),
                });
            }
        }

        actions
    }

    /// Execute actions in order, stopping at the first failure.
    pub fn apply(&self, actions: &[RelocationAction]) -> Result<()> {
        for action in actions {
            self.apply_one(action)
                .map_err(|e| wrap(action.subject(), e))?;
        }
        Ok(())
    }

    fn apply_one(&self, action: &RelocationAction) -> Result<()> {
        match action {
            RelocationAction::SetInterpreter {
                binary,
                interpreter,
            } => self.patcher.set_interpreter(binary, interpreter),
            RelocationAction::SetRpath { binary, rpath }
            | RelocationAction::SetLibraryRpath {
                library: binary,
                rpath,
            } => self.patcher.set_rpath(binary, rpath),
            RelocationAction::CopyLibrary { source, dest } => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).at(parent)?;
                }
                // A dangling link here would be written through.
                if dest.symlink_metadata().is_ok() {
                    fs::remove_file(dest).at(dest)?;
                }
                fs::copy(source, dest).at(source)?;

                self.ops.record(format!(
                    "copy {} -> {}",
                    source.display(),
                    dest.display()
                ));
                tracing::debug!(library = %dest.display(), "Copied library");
                Ok(())
            }
        }
    }

    /// Scan, plan and apply.
    pub fn relocate(&self) -> Result<RelocationReport> {
        let entries = self.scan()?;
        let actions = self.plan(&entries);

        let static_binaries = entries.iter().filter(|e| e.is_static).count();
        tracing::info!(
            binaries = entries.len(),
            static_binaries,
            actions = actions.len(),
            loader = %self.loader.display(),
            "Relocating binaries"
        );

        self.apply(&actions)?;

        Ok(RelocationReport {
            binaries: entries.len(),
            static_binaries,
            patched: entries.len() - static_binaries,
            copied_libraries: actions
                .iter()
                .filter_map(|a| match a {
                    RelocationAction::CopyLibrary { dest, .. } => Some(dest.clone()),
                    _ => None,
                })
                .collect(),
        })
    }
}

fn wrap(path: &Path, source: SysextError) -> SysextError {
    SysextError::Relocation {
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}
