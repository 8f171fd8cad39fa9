//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `create` - Build a sysext image from an OCI image
//! - `pull` - Fetch an image into the local store
//! - `preflight` - Run preflight checks

mod create;
mod preflight;
mod pull;

pub use create::cmd_create;
pub use preflight::cmd_preflight;
pub use pull::cmd_pull;
