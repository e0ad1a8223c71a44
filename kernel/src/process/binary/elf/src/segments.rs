//! ELF segment structures and metadata.

bitflags::bitflags! {
    /// Access permissions of a loadable segment.
    ///
    /// The bit values are the ELF `PF_*` program header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u32 {
        const EXECUTE = 1;
        const WRITE = 2;
        const READ = 4;
    }
}

impl SegmentFlags {
    #[must_use]
    #[inline]
    pub(crate) fn from_program_flags(flags: xmas_elf::program::Flags) -> Self {
        let mut out = Self::empty();
        out.set(Self::READ, flags.is_read());
        out.set(Self::WRITE, flags.is_write());
        out.set(Self::EXECUTE, flags.is_execute());
        out
    }
}

/// One loadable region of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Virtual address of the segment, relative to the image base
    pub vaddr: u64,
    /// Bytes backed by the file
    pub file_size: u64,
    /// Bytes occupied in memory, the tail past `file_size` is zero-filled
    pub mem_size: u64,
    /// Offset of the segment data in the file
    pub file_offset: u64,
    /// Union of the program header permissions
    pub flags: SegmentFlags,
}

impl Segment {
    #[must_use]
    #[inline]
    /// Address right after the last byte of the segment.
    pub const fn end(&self) -> u64 {
        self.vaddr + self.mem_size
    }
}

/// Template for Thread-Local Storage initialization
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TlsTemplate {
    /// Address of the `.tdata` section
    pub tdata_addr: u64,
    /// Size of initialized data in the template
    pub tdata_size: u64,
    pub tdata_align: u64,
    /// Size of the zero-initialized tail (`.tbss`)
    pub tbss_size: u64,
    pub tbss_align: u64,
}

impl TlsTemplate {
    #[must_use]
    #[inline]
    /// Total size allocated for TLS
    pub const fn mem_size(&self) -> u64 {
        self.tdata_size + self.tbss_size
    }
}
