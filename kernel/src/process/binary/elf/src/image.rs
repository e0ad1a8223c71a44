//! The staged in-memory image of an executable.
use crate::{
    buffer::PageBuffer,
    relocations::Relocations,
    segments::{Segment, TlsTemplate},
};
use alloc::vec::Vec;

/// A fully staged executable.
///
/// The image owns the original file bytes, a page-aligned copy of every
/// loadable segment laid out at its virtual offset, the sorted segment table
/// and the page-padded relocation records. Everything is released on drop.
///
/// The image is immutable once built, so it may be shared between the page
/// provisioner and page-fault servicing without locking.
#[derive(Debug)]
pub struct ElfImage {
    pub(crate) file: Vec<u8>,
    pub(crate) image: PageBuffer,
    pub(crate) segments: Vec<Segment>,
    pub(crate) relocations: PageBuffer,
    pub(crate) relocations_size: usize,
    pub(crate) entry_point: u64,
    pub(crate) text_addr: u64,
    pub(crate) tls_template: Option<TlsTemplate>,
}

impl ElfImage {
    #[must_use]
    #[inline]
    /// Size of the image in memory, always a multiple of the page size.
    pub fn image_size(&self) -> u64 {
        self.image.len() as u64
    }

    #[must_use]
    #[inline]
    pub const fn image_data(&self) -> &[u8] {
        self.image.as_slice()
    }

    #[must_use]
    #[inline]
    /// Address of the image buffer in the kernel's memory.
    pub fn image_base(&self) -> u64 {
        self.image.base_addr()
    }

    #[must_use]
    #[inline]
    /// Loadable segments, sorted by ascending address.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    #[inline]
    /// Bytes of `segment` as found in the file.
    ///
    /// Returns an empty slice for a segment that does not belong to this image.
    pub fn segment_data(&self, segment: &Segment) -> &[u8] {
        let range = usize::try_from(segment.file_offset).ok().and_then(|start| {
            usize::try_from(segment.file_size)
                .ok()
                .and_then(|len| start.checked_add(len))
                .map(|end| start..end)
        });
        range.and_then(|r| self.file.get(r)).unwrap_or(&[])
    }

    #[must_use]
    #[inline]
    pub fn file_data(&self) -> &[u8] {
        &self.file
    }

    #[must_use]
    #[inline]
    /// Page-padded relocation buffer.
    pub const fn relocation_data(&self) -> &[u8] {
        self.relocations.as_slice()
    }

    #[must_use]
    #[inline]
    pub fn relocation_base(&self) -> u64 {
        self.relocations.base_addr()
    }

    #[must_use]
    #[inline]
    /// Iterates over the relocation records of the image.
    pub fn relocations(&self) -> Relocations<'_> {
        Relocations::new(&self.relocations.as_slice()[..self.relocations_size])
    }

    #[must_use]
    #[inline]
    pub const fn entry_point(&self) -> u64 {
        self.entry_point
    }

    #[must_use]
    #[inline]
    /// Address of the `.text` section.
    pub const fn text_addr(&self) -> u64 {
        self.text_addr
    }

    #[must_use]
    #[inline]
    pub const fn tls_template(&self) -> Option<TlsTemplate> {
        self.tls_template
    }

    /// Logs a summary of the image.
    pub fn dump(&self) {
        log::debug!(
            "image: base={:#x} size={:#x} entry={:#x} text={:#x}",
            self.image_base(),
            self.image_size(),
            self.entry_point,
            self.text_addr
        );
        log::debug!(
            "relocations: base={:#x} size={:#x} records={}",
            self.relocation_base(),
            self.relocations.len(),
            self.relocations().count()
        );
        for (i, segment) in self.segments.iter().enumerate() {
            log::debug!(
                "segment[{i}]: vaddr={:#x} filesz={:#x} memsz={:#x} offset={:#x} flags={:?}",
                segment.vaddr,
                segment.file_size,
                segment.mem_size,
                segment.file_offset,
                segment.flags
            );
        }
    }
}
