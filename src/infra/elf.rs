//! ELF format sniffing
//!
//! Reads the ELF header and program headers directly instead of running
//! `file(1)`, whose wording for position independent executables differs
//! between versions.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::core::candidate::{FileClass, FormatSniffer};

/// ELF magic bytes
const ELF_MAGIC: &[u8] = &[0x7f, b'E', b'L', b'F'];

/// Bytes inspected to tell text from binary data
const SNIFF_BLOCK: usize = 4096;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

/// Upper bound on program headers read; real binaries have a few dozen
const MAX_PROGRAM_HEADERS: usize = 4096;

/// Sniffer reading ELF headers from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfSniffer;

impl FormatSniffer for ElfSniffer {
    fn sniff(&self, path: &Path) -> io::Result<FileClass> {
        let mut file = File::open(path)?;
        let mut block = Vec::with_capacity(SNIFF_BLOCK);
        (&mut file)
            .take(SNIFF_BLOCK as u64)
            .read_to_end(&mut block)?;

        if !block.starts_with(ELF_MAGIC) {
            return Ok(if block.contains(&0) {
                FileClass::Other
            } else {
                FileClass::Text
            });
        }

        let Some(header) = ElfHeader::parse(&block) else {
            return Ok(FileClass::Other);
        };

        if header.e_type != ET_EXEC && header.e_type != ET_DYN {
            return Ok(FileClass::Other);
        }

        // Static binaries have no dynamic section, hence nothing to rewrite
        let segments = header.segment_types(&mut file)?;
        Ok(if segments.contains(&PT_INTERP) {
            FileClass::ElfExecutable
        } else if !segments.contains(&PT_DYNAMIC) {
            FileClass::Other
        } else if header.e_type == ET_EXEC {
            FileClass::ElfExecutable
        } else {
            FileClass::ElfShared
        })
    }
}

/// The handful of header fields needed to classify a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElfHeader {
    little_endian: bool,
    e_type: u16,
    phoff: u64,
    phentsize: u16,
    phnum: u16,
}

impl ElfHeader {
    fn parse(block: &[u8]) -> Option<Self> {
        let is_64 = match block.get(4)? {
            1 => false,
            2 => true,
            _ => return None,
        };
        let little_endian = match block.get(5)? {
            1 => true,
            2 => false,
            _ => return None,
        };

        let e_type = read_u16(block, 16, little_endian)?;
        let (phoff, phentsize, phnum) = if is_64 {
            (
                read_u64(block, 32, little_endian)?,
                read_u16(block, 54, little_endian)?,
                read_u16(block, 56, little_endian)?,
            )
        } else {
            (
                u64::from(read_u32(block, 28, little_endian)?),
                read_u16(block, 42, little_endian)?,
                read_u16(block, 44, little_endian)?,
            )
        };

        Some(Self {
            little_endian,
            e_type,
            phoff,
            phentsize,
            phnum,
        })
    }

    /// `p_type` of every program header; empty when the table is unreadable
    fn segment_types(&self, file: &mut File) -> io::Result<Vec<u32>> {
        let entry = usize::from(self.phentsize);
        let count = usize::from(self.phnum).min(MAX_PROGRAM_HEADERS);
        if entry < 4 || count == 0 {
            return Ok(Vec::new());
        }

        let mut table = vec![0u8; entry * count];
        file.seek(SeekFrom::Start(self.phoff))?;
        if let Err(e) = file.read_exact(&mut table) {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Ok(Vec::new());
            }
            return Err(e);
        }

        Ok(table
            .chunks_exact(entry)
            .filter_map(|ph| read_u32(ph, 0, self.little_endian))
            .collect())
    }
}

fn read_u16(buf: &[u8], offset: usize, le: bool) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
    Some(if le {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    })
}

fn read_u32(buf: &[u8], offset: usize, le: bool) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(if le {
        u32::from_le_bytes(bytes)
    } else {
        u32::from_be_bytes(bytes)
    })
}

fn read_u64(buf: &[u8], offset: usize, le: bool) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
    Some(if le {
        u64::from_le_bytes(bytes)
    } else {
        u64::from_be_bytes(bytes)
    })
}

/// Minimal little-endian ELF64 image with the given type and program header types
#[cfg(test)]
pub(crate) fn synthetic_elf(e_type: u16, program_headers: &[u32]) -> Vec<u8> {
    const EHDR: usize = 64;
    const PHENT: usize = 56;

    let mut image = vec![0u8; EHDR + PHENT * program_headers.len()];
    image[..4].copy_from_slice(ELF_MAGIC);
    image[4] = 2; // ELFCLASS64
    image[5] = 1; // little endian
    image[6] = 1;
    image[16..18].copy_from_slice(&e_type.to_le_bytes());
    image[32..40].copy_from_slice(&(EHDR as u64).to_le_bytes());
    image[54..56].copy_from_slice(&(PHENT as u16).to_le_bytes());
    image[56..58].copy_from_slice(&(program_headers.len() as u16).to_le_bytes());
    for (i, p_type) in program_headers.iter().enumerate() {
        let at = EHDR + i * PHENT;
        image[at..at + 4].copy_from_slice(&p_type.to_le_bytes());
    }
    image
}
