//! Error taxonomy for the sysext pipeline.
//!
//! Every stage fails fast and hands its error up unchanged. The wrapping
//! variants (`Layer`, `Relocation`) only add the identity of the failing
//! layer or file.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while assembling or packaging a sysext.
#[derive(Error, Debug)]
pub enum SysextError {
    /// A manifest, layer archive or image directory is missing.
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    /// Malformed manifest content.
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Out-of-range skip count, unsupported filesystem kind, bad name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-zero exit (or spawn failure) of an external tool.
    #[error("'{tool}' failed (exit code {code}):\n{output}")]
    ExternalTool {
        tool: String,
        code: i32,
        output: String,
    },

    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Extraction of one layer failed; the assembly was aborted.
    #[error("failed to extract layer {index} ({digest}): {source}")]
    Layer {
        index: usize,
        digest: String,
        #[source]
        source: Box<SysextError>,
    },

    /// Relocation of one binary failed; the relocation pass was aborted.
    #[error("failed to relocate {}: {source}", path.display())]
    Relocation {
        path: PathBuf,
        #[source]
        source: Box<SysextError>,
    },
}

pub type Result<T> = std::result::Result<T, SysextError>;

impl SysextError {
    pub fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what,
            path: path.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Attach the offending path to a raw `std::io::Error`.
pub trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| SysextError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl From<walkdir::Error> for SysextError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        Self::Io { path, source }
    }
}
