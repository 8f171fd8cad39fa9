//! Rootfs assembly for sysext images.
//!
//! ## Components
//!
//! - **tree**: the per-image working directory every stage mutates
//! - **extract**: layer archive extractors (external `tar` or in-process)
//! - **assemble**: layered extraction, retention policy, release marker
//! - **release**: the `extension-release.<name>` metadata file

pub mod assemble;
pub mod extract;
pub mod release;
pub mod tree;

pub use assemble::{AssemblyReport, RetentionPolicy, RootfsAssembler};
pub use extract::{ArchiveExtractor, NativeTar, TarCommand};
pub use release::ExtensionRelease;
pub use tree::{RootfsTree, LIBRARY_DIR, RELEASE_DIR};
