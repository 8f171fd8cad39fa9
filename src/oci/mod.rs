//! OCI image handling: local manifest reading, layer diffing and the image
//! store collaborator.
//!
//! Pulled images live in a flat directory per image:
//!
//! ```text
//! images/<sha256(reference)>/
//! ├── manifest.json
//! ├── <layer-hex>.tar.gz
//! └── <layer-hex>.tar.gz
//! ```

pub mod diff;
pub mod manifest;
pub mod store;

use sha2::{Digest, Sha256};

pub use diff::{DiffStrategy, SkipCount, SkipSource};
pub use manifest::{ImageManifest, Layer};
pub use store::{ImagePuller, ImageStore, LocalImageStore, SkopeoPuller};

/// Stable identity of an image reference.
///
/// Used to key both the pulled image directory and the rootfs arena, so
/// repeated runs against the same reference land in the same place.
pub fn image_id(reference: &str) -> String {
    hex::encode(Sha256::digest(reference.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_is_stable_and_distinct() {
        let a = image_id("docker.io/library/alpine:3.19");
        assert_eq!(a, image_id("docker.io/library/alpine:3.19"));
        assert_ne!(a, image_id("docker.io/library/alpine:3.20"));
        assert_eq!(a.len(), 64);
    }
}
