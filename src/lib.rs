//! oci-sysext library exports.
//!
//! The binary is a thin clap front end; everything it drives lives here so
//! integration tests can run the pipeline with fake collaborators.

pub mod config;
pub mod error;
pub mod oci;
pub mod oplog;
pub mod package;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod relocate;
pub mod rootfs;
pub mod symlinks;
pub mod timing;

pub use error::{Result, SysextError};
pub use pipeline::{CreateRequest, Pipeline, RootfsReport};
