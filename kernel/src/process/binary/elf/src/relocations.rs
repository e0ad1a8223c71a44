//! Position-independent relocation records.
//!
//! The loader does not apply relocations. The `.rela.dyn` records are copied
//! into their own page-padded buffer which is committed right after the image,
//! where the kernel's startup code picks them up.
use crate::{Result, buffer::PageBuffer, error::ElfLoadError};

/// Size of an `Elf64_Rela` record.
pub const RELA_ENTRY_SIZE: u64 = 24;

pub const R_X86_64_RELATIVE: u32 = 8;

/// Location of the relocation section in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RelaSection {
    pub offset: u64,
    pub size: u64,
    pub entry_size: u64,
}

/// Copies the relocation section into a page-padded buffer.
///
/// Returns the buffer along with the unpadded size of the records.
pub(crate) fn load(input: &[u8], section: Option<RelaSection>) -> Result<(PageBuffer, usize)> {
    let Some(section) = section else {
        return Ok((PageBuffer::empty(), 0));
    };

    if section.entry_size != RELA_ENTRY_SIZE || section.size % RELA_ENTRY_SIZE != 0 {
        return Err(ElfLoadError::RelocationLoadFailed);
    }

    let data = crate::loader::file_range(input, section.offset, section.size)
        .ok_or(ElfLoadError::RelocationLoadFailed)?;
    let buffer = PageBuffer::padded_copy(data)?;

    Ok((buffer, data.len()))
}

/// A decoded `Elf64_Rela` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub offset: u64,
    pub info: u64,
    pub addend: i64,
}

impl Relocation {
    #[must_use]
    #[inline]
    #[expect(clippy::cast_possible_truncation, reason = "Low half of r_info")]
    pub const fn kind(&self) -> u32 {
        self.info as u32
    }

    #[must_use]
    #[inline]
    pub const fn symbol(&self) -> u32 {
        (self.info >> 32) as u32
    }

    #[must_use]
    #[inline]
    pub const fn is_relative(&self) -> bool {
        self.symbol() == 0 && self.kind() == R_X86_64_RELATIVE
    }
}

/// Iterator over the records of a relocation buffer.
pub struct Relocations<'a> {
    chunks: core::slice::ChunksExact<'a, u8>,
}

impl<'a> Relocations<'a> {
    #[must_use]
    #[inline]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        #[expect(clippy::cast_possible_truncation, reason = "Record size fits in usize")]
        let chunks = data.chunks_exact(RELA_ENTRY_SIZE as usize);
        Self { chunks }
    }
}

impl Iterator for Relocations<'_> {
    type Item = Relocation;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.chunks.next()?;
        let word = |i: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&record[i * 8..(i + 1) * 8]);
            bytes
        };
        Some(Relocation {
            offset: u64::from_le_bytes(word(0)),
            info: u64::from_le_bytes(word(1)),
            addend: i64::from_le_bytes(word(2)),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}
