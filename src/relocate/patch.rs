//! Rewriting loader and search paths inside ELF files.

use std::path::Path;

use crate::error::Result;
use crate::oplog::OpsLog;
use crate::process::Cmd;

/// Edits the dynamic-linking metadata of an ELF file in place.
pub trait BinaryPatcher {
    fn set_interpreter(&self, binary: &Path, interpreter: &Path) -> Result<()>;
    fn set_rpath(&self, binary: &Path, rpath: &Path) -> Result<()>;
}

/// `patchelf --set-interpreter` / `patchelf --set-rpath`
pub struct Patchelf {
    ops: OpsLog,
}

impl Patchelf {
    pub fn new(ops: OpsLog) -> Self {
        Self { ops }
    }
}

impl BinaryPatcher for Patchelf {
    fn set_interpreter(&self, binary: &Path, interpreter: &Path) -> Result<()> {
        Cmd::new("patchelf")
            .arg("--set-interpreter")
            .arg_path(interpreter)
            .arg_path(binary)
            .record(&self.ops)
            .run()?;
        Ok(())
    }

    fn set_rpath(&self, binary: &Path, rpath: &Path) -> Result<()> {
        Cmd::new("patchelf")
            .arg("--set-rpath")
            .arg_path(rpath)
            .arg_path(binary)
            .record(&self.ops)
            .run()?;
        Ok(())
    }
}
