//! Layer diff calculator.
//!
//! Decides how many leading layers of the target image are already provided
//! by a reference image and can be left out of the extraction.

use std::fmt;
use std::str::FromStr;

use super::manifest::ImageManifest;
use crate::error::{Result, SysextError};

/// How the shared base between two images is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffStrategy {
    /// Count leading layers whose digests match in both manifests.
    #[default]
    DigestPrefix,
    /// `len(target) - len(reference)`, trusting the layer counts alone.
    LayerCount,
}

impl FromStr for DiffStrategy {
    type Err = SysextError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "digest-prefix" => Ok(Self::DigestPrefix),
            "layer-count" => Ok(Self::LayerCount),
            other => Err(SysextError::invalid(format!(
                "unknown diff strategy '{}' (expected digest-prefix or layer-count)",
                other
            ))),
        }
    }
}

impl fmt::Display for DiffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DigestPrefix => f.write_str("digest-prefix"),
            Self::LayerCount => f.write_str("layer-count"),
        }
    }
}

/// Where the skip count comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipSource {
    /// Extract every layer.
    Full,
    /// Diff against another image reference.
    Reference(String),
    /// Caller-provided count.
    Explicit(usize),
}

impl SkipSource {
    /// A reference equal to the target image means a full extraction.
    pub fn for_target(target: &str, reference: Option<&str>, explicit: Option<usize>) -> Self {
        match (reference, explicit) {
            (_, Some(n)) => Self::Explicit(n),
            (Some(r), None) if !r.is_empty() && r != target => Self::Reference(r.to_string()),
            _ => Self::Full,
        }
    }
}

/// Number of leading layers left out of extraction.
///
/// Always within `[0, layers]` of the manifest it was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipCount(usize);

impl SkipCount {
    /// Validate a raw count against a manifest of `layers` layers.
    pub fn new(raw: i64, layers: usize) -> Result<Self> {
        match usize::try_from(raw) {
            Ok(n) if n <= layers => Ok(Self(n)),
            _ => Err(SysextError::invalid(format!(
                "cannot skip {} layers of an image with {} layers",
                raw, layers
            ))),
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Leading layers with identical digests.
pub fn common_prefix_len(target: &ImageManifest, reference: &ImageManifest) -> usize {
    target
        .layers
        .iter()
        .zip(&reference.layers)
        .take_while(|(t, r)| t.digest == r.digest)
        .count()
}

/// Raw (unvalidated) skip count of `target` against `reference`.
///
/// `LayerCount` can go negative when the reference is the larger image; the
/// caller rejects that through [`SkipCount::new`].
pub fn raw_skip_count(
    target: &ImageManifest,
    reference: &ImageManifest,
    strategy: DiffStrategy,
) -> i64 {
    let shared = common_prefix_len(target, reference);
    match strategy {
        DiffStrategy::DigestPrefix => {
            if shared < reference.len() {
                tracing::warn!(
                    shared,
                    reference_layers = reference.len(),
                    "Reference image is not a base of the target, skipping only the shared layers"
                );
            }
            shared as i64
        }
        DiffStrategy::LayerCount => {
            let raw = target.len() as i64 - reference.len() as i64;
            if raw > 0 && (raw as usize) > shared {
                tracing::warn!(
                    skip = raw,
                    shared,
                    "Layer-count diff skips layers whose digests differ from the reference"
                );
            }
            raw
        }
    }
}
