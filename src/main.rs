//! oci-sysext - OCI image to sysext converter.
//!
//! Pulls a container image, assembles its layers into a rootfs, makes the
//! binaries in it loadable outside the original root, and packages the
//! result as a raw sysext image.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oci_sysext::config::Config;
use oci_sysext::oci::{DiffStrategy, SkipSource};
use oci_sysext::package::FsKind;
use oci_sysext::pipeline::CreateRequest;

#[derive(Parser)]
#[command(name = "oci-sysext")]
#[command(about = "Turn OCI images into systemd-sysext images")]
#[command(
    after_help = "QUICK START:\n  oci-sysext preflight                          Check host tools\n  oci-sysext create --image alpine:3 --name a   Build sysexts/a.raw"
)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace or an EnvFilter directive).
    /// Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a sysext image from an OCI image
    Create {
        /// Image reference to convert
        #[arg(long)]
        image: String,

        /// Extension name (release file and output image name)
        #[arg(long)]
        name: String,

        /// Output filesystem: squashfs, btrfs or ext4
        #[arg(long, default_value = "ext4")]
        fs: FsKind,

        /// Base image whose layers are left out
        #[arg(long, conflicts_with = "skip_layers")]
        image_source: Option<String>,

        /// Number of leading layers to leave out
        #[arg(long)]
        skip_layers: Option<usize>,

        /// How to diff against --image-source: digest-prefix or layer-count
        #[arg(long, default_value = "digest-prefix")]
        diff_strategy: DiffStrategy,

        /// Leave binaries untouched
        #[arg(long)]
        no_relocate: bool,

        /// OS id written to the release file (default: _any)
        #[arg(long)]
        os_id: Option<String>,

        /// VERSION_ID written to the release file (requires --os-id)
        #[arg(long, requires = "os_id")]
        version_id: Option<String>,

        /// ARCHITECTURE written to the release file (x86-64, arm64, ...)
        #[arg(long)]
        architecture: Option<String>,
    },

    /// Pull an image into the local store
    Pull {
        /// Image reference
        reference: String,
    },

    /// Run preflight checks (host tools, data directories)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::load();

    match cli.command {
        Commands::Create {
            image,
            name,
            fs,
            image_source,
            skip_layers,
            diff_strategy,
            no_relocate,
            os_id,
            version_id,
            architecture,
        } => {
            let skip = SkipSource::for_target(&image, image_source.as_deref(), skip_layers);
            let request = CreateRequest {
                fs,
                skip,
                strategy: diff_strategy,
                relocate: !no_relocate,
                os_id,
                version_id,
                architecture,
                ..CreateRequest::new(image, name)
            };
            commands::cmd_create(&config, &request)?;
        }

        Commands::Pull { reference } => {
            commands::cmd_pull(&config, &reference)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }
    }

    Ok(())
}
