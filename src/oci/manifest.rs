//! Image manifest reader.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result, SysextError};

/// File name of the manifest inside an image directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Suffix appended to a layer's hex digest to find its archive.
pub const LAYER_ARCHIVE_SUFFIX: &str = ".tar.gz";

/// One filesystem changeset of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    /// Prefixed content hash, `algorithm:hex`
    pub digest: String,
}

impl Layer {
    /// Digest without its algorithm prefix.
    pub fn hex(&self) -> &str {
        self.digest
            .split_once(':')
            .map(|(_, hex)| hex)
            .unwrap_or(&self.digest)
    }

    /// File name of this layer's archive inside the image directory.
    pub fn archive_name(&self) -> String {
        format!("{}{}", self.hex(), LAYER_ARCHIVE_SUFFIX)
    }

    pub fn archive_path(&self, image_dir: &Path) -> PathBuf {
        image_dir.join(self.archive_name())
    }
}

/// Ordered layer list of an image. Index 0 is the base layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub layers: Vec<Layer>,
}

impl ImageManifest {
    /// Read and parse `manifest.json` from an image directory.
    pub fn read(image_dir: &Path) -> Result<Self> {
        let path = image_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(SysextError::not_found("manifest", path));
        }

        tracing::debug!(manifest = %path.display(), "Reading manifest");
        let bytes = std::fs::read(&path).at(&path)?;
        Self::parse(&bytes, &path)
    }

    /// Parse manifest bytes. `origin` is only used for error messages.
    pub fn parse(bytes: &[u8], origin: &Path) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes).map_err(|e| SysextError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        for (i, layer) in manifest.layers.iter().enumerate() {
            match layer.digest.split_once(':') {
                Some((alg, hex))
                    if !alg.is_empty()
                        && !hex.is_empty()
                        && hex.chars().all(|c| c.is_ascii_alphanumeric()) => {}
                _ => {
                    return Err(SysextError::Parse {
                        path: origin.to_path_buf(),
                        message: format!(
                            "layer {} has malformed digest '{}' (expected algorithm:hex)",
                            i, layer.digest
                        ),
                    })
                }
            }
        }

        tracing::debug!(layers = manifest.layers.len(), "Parsed manifest");
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
