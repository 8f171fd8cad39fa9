//! Minimal ELF inspection.
//!
//! Only what relocation needs: the object type from the header and the
//! contents of the `.interp` section. Reads the section headers directly, so
//! no binary is ever executed to classify it.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{IoResultExt, Result};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

/// Object type from `e_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfKind {
    Executable,
    SharedObject,
    /// Relocatable objects, core dumps and the like.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfInfo {
    pub kind: ElfKind,
    /// `.interp` contents without the trailing NUL; `None` if the section is
    /// missing or empty
    pub interpreter: Option<String>,
}

impl ElfInfo {
    /// Executables and shared objects are relocation candidates.
    pub fn is_candidate(&self) -> bool {
        matches!(self.kind, ElfKind::Executable | ElfKind::SharedObject)
    }

    /// No loader dependency: nothing to patch.
    pub fn is_static(&self) -> bool {
        self.interpreter.is_none()
    }
}

/// Inspect a file. `Ok(None)` for anything that is not a well-formed ELF.
pub fn inspect(path: &Path) -> Result<Option<ElfInfo>> {
    let mut file = File::open(path).at(path)?;

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || magic != ELF_MAGIC {
        return Ok(None);
    }

    let mut bytes = magic.to_vec();
    file.read_to_end(&mut bytes).at(path)?;
    Ok(parse(&bytes))
}

/// Parse an in-memory ELF image.
pub fn parse(bytes: &[u8]) -> Option<ElfInfo> {
    if bytes.get(..4)? != ELF_MAGIC {
        return None;
    }

    let wide = match bytes.get(4)? {
        1 => false,
        2 => true,
        _ => return None,
    };
    let reader = Reader {
        bytes,
        big_endian: match bytes.get(5)? {
            1 => false,
            2 => true,
            _ => return None,
        },
    };

    let kind = match reader.u16(16)? {
        ET_EXEC => ElfKind::Executable,
        ET_DYN => ElfKind::SharedObject,
        _ => ElfKind::Other,
    };

    let (shoff, shentsize, shnum, shstrndx) = if wide {
        (reader.u64(0x28)?, reader.u16(0x3a)?, reader.u16(0x3c)?, reader.u16(0x3e)?)
    } else {
        (
            u64::from(reader.u32(0x20)?),
            reader.u16(0x2e)?,
            reader.u16(0x30)?,
            reader.u16(0x32)?,
        )
    };

    let section = |index: u16| -> Option<Section> {
        let base = usize::try_from(shoff).ok()?
            .checked_add(usize::from(index).checked_mul(usize::from(shentsize))?)?;
        if wide {
            Some(Section {
                name: reader.u32(base)?,
                offset: reader.u64(base + 24)?,
                size: reader.u64(base + 32)?,
            })
        } else {
            Some(Section {
                name: reader.u32(base)?,
                offset: u64::from(reader.u32(base + 16)?),
                size: u64::from(reader.u32(base + 20)?),
            })
        }
    };

    let mut interpreter = None;
    if shnum > 0 && shstrndx < shnum {
        let names = reader.slice(section(shstrndx)?)?;
        for index in 0..shnum {
            let header = section(index)?;
            let name_start = usize::try_from(header.name).ok()?;
            let name = names.get(name_start..)?.split(|b| *b == 0).next()?;
            if name == b".interp" {
                let data = reader.slice(header)?;
                let path = data.split(|b| *b == 0).next().unwrap_or_default();
                if !path.is_empty() {
                    interpreter = Some(String::from_utf8_lossy(path).into_owned());
                }
                break;
            }
        }
    }

    Some(ElfInfo { kind, interpreter })
}

#[derive(Clone, Copy)]
struct Section {
    name: u32,
    offset: u64,
    size: u64,
}

struct Reader<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn array<const N: usize>(&self, at: usize) -> Option<[u8; N]> {
        self.bytes.get(at..at.checked_add(N)?)?.try_into().ok()
    }

    fn u16(&self, at: usize) -> Option<u16> {
        let raw = self.array::<2>(at)?;
        Some(if self.big_endian {
            u16::from_be_bytes(raw)
        } else {
            u16::from_le_bytes(raw)
        })
    }

    fn u32(&self, at: usize) -> Option<u32> {
        let raw = self.array::<4>(at)?;
        Some(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    fn u64(&self, at: usize) -> Option<u64> {
        let raw = self.array::<8>(at)?;
        Some(if self.big_endian {
            u64::from_be_bytes(raw)
        } else {
            u64::from_le_bytes(raw)
        })
    }

    fn slice(&self, section: Section) -> Option<&'a [u8]> {
        let start = usize::try_from(section.offset).ok()?;
        let end = start.checked_add(usize::try_from(section.size).ok()?)?;
        self.bytes.get(start..end)
    }
}
