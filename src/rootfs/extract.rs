//! Layer archive extraction.
//!
//! Two interchangeable extractors: the external `tar` binary (default) and an
//! in-process one built on the `tar` and `flate2` crates. Both skip `dev/`
//! entries and overwrite whatever earlier layers left at the same path.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tar::Archive;

use crate::error::{IoResultExt, Result, SysextError};
use crate::oplog::OpsLog;
use crate::process::Cmd;

/// Unpacks one layer archive on top of a directory.
pub trait ArchiveExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// `tar --exclude=dev/* -xf <archive> -C <dest>`
pub struct TarCommand {
    ops: OpsLog,
}

impl TarCommand {
    pub fn new(ops: OpsLog) -> Self {
        Self { ops }
    }
}

impl ArchiveExtractor for TarCommand {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        ensure_archive(archive)?;

        Cmd::new("tar")
            .arg("--exclude=dev/*")
            .arg("-xf")
            .arg_path(archive)
            .arg("-C")
            .arg_path(dest)
            .record(&self.ops)
            .run()?;

        Ok(())
    }
}

/// In-process extraction of gzip-compressed or plain tar archives.
#[derive(Debug, Default)]
pub struct NativeTar;

impl ArchiveExtractor for NativeTar {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        ensure_archive(archive)?;

        let mut file = File::open(archive).at(archive)?;
        let mut magic = [0u8; 2];
        let gzipped = match file.read_exact(&mut magic) {
            Ok(()) => magic == [0x1f, 0x8b],
            Err(_) => false,
        };
        file.seek(SeekFrom::Start(0)).at(archive)?;

        let reader = BufReader::new(file);
        if gzipped {
            unpack(Archive::new(GzDecoder::new(reader)), archive, dest)
        } else {
            unpack(Archive::new(reader), archive, dest)
        }
    }
}

fn ensure_archive(archive: &Path) -> Result<()> {
    if !archive.is_file() {
        return Err(SysextError::not_found("layer archive", archive));
    }
    Ok(())
}

fn unpack<R: Read>(mut tar: Archive<R>, archive: &Path, dest: &Path) -> Result<()> {
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    for entry in tar.entries().at(archive)? {
        let mut entry = entry.at(archive)?;
        let path = entry.path().at(archive)?.into_owned();

        if is_device_entry(&path) {
            tracing::trace!(entry = %path.display(), "Skipping dev entry");
            continue;
        }

        entry.unpack_in(dest).at(&dest.join(&path))?;
    }

    Ok(())
}

/// Matches `dev/*` (with or without a leading `./`), like `--exclude=dev/*`.
fn is_device_entry(path: &Path) -> bool {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir));
    matches!(components.next(), Some(c) if c.as_os_str() == "dev") && components.next().is_some()
}
