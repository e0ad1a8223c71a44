//! ELF image loader.
use crate::{
    Result,
    buffer::PageBuffer,
    error::ElfLoadError,
    image::ElfImage,
    relocations::{self, RelaSection},
    segments::{Segment, SegmentFlags, TlsTemplate},
};
use alloc::vec::Vec;
use sanctum_core::{host::HostFiles, mem::page_floor};
use xmas_elf::{
    ElfFile, header,
    program::{ProgramHeader, Type},
};

/// Size of a 64-bit program header entry.
const PH_ENTRY_SIZE: u16 = 56;
/// Size of a 64-bit section header entry.
const SH_ENTRY_SIZE: u16 = 64;
/// First reserved section index.
const SHN_LORESERVE: u16 = 0xff00;
/// Alignment of every header read out of the file.
const HEADER_ALIGN: u64 = 8;

/// Section data gathered before the segments are loaded.
#[derive(Debug, Default)]
struct Sections {
    text_addr: Option<u64>,
    tdata: Option<(u64, u64, u64)>,
    tbss: Option<(u64, u64)>,
    rela_dyn: Option<RelaSection>,
}

impl Sections {
    fn tls_template(&self) -> Option<TlsTemplate> {
        if self.tdata.is_none() && self.tbss.is_none() {
            return None;
        }
        let (tdata_addr, tdata_size, tdata_align) = self.tdata.unwrap_or_default();
        let (tbss_size, tbss_align) = self.tbss.unwrap_or_default();
        Some(TlsTemplate {
            tdata_addr,
            tdata_size,
            tdata_align,
            tbss_size,
            tbss_align,
        })
    }
}

/// Extent of the loadable segments.
#[derive(Debug, Clone, Copy)]
struct Extent {
    lowest: u64,
    highest: u64,
    count: usize,
}

/// Loader for statically laid out ELF executables.
pub struct ElfLoader;

impl ElfLoader {
    /// Reads the executable at `path` from the host and loads it.
    ///
    /// # Errors
    ///
    /// Returns `ElfLoadError::Io` if the host cannot provide the file,
    /// and any error of [`ElfLoader::parse`].
    pub fn load<F: HostFiles + ?Sized>(files: &F, path: &str) -> Result<ElfImage> {
        let input = files.read_whole_file(path).inspect_err(|err| {
            log::debug!("cannot read {path} from host: {err}");
        })?;

        Self::parse(input).inspect_err(|err| {
            log::debug!("cannot load {path}: {err}");
        })
    }

    /// Builds an image from the raw bytes of an executable.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure. No allocation made for the
    /// image outlives a failed call.
    pub fn parse(input: Vec<u8>) -> Result<ElfImage> {
        // Headers are read in place and must be naturally aligned.
        if input.as_ptr().align_offset(align_of::<u64>()) != 0 {
            return Err(ElfLoadError::InvalidFormat);
        }
        let elf = ElfFile::new(&input).map_err(|_| ElfLoadError::InvalidFormat)?;

        Self::sanity_check(&elf)?;

        let sections = Self::scan_sections(&elf)?;
        let text_addr = sections.text_addr.ok_or(ElfLoadError::MissingSection)?;

        let extent = Self::scan_program_headers(&elf)?;
        let image_size = extent.highest - extent.lowest;
        let mut image = PageBuffer::zeroed(image_size)?;

        let mut segments = Self::load_segments(&elf, &sections, &mut image, extent.count)?;
        Self::sort_segments(&mut segments)?;

        let (relocations, relocations_size) = relocations::load(elf.input, sections.rela_dyn)?;

        let entry_point = elf.header.pt2.entry_point();
        let tls_template = sections.tls_template();

        Ok(ElfImage {
            file: input,
            image,
            segments,
            relocations,
            relocations_size,
            entry_point,
            text_addr,
            tls_template,
        })
    }

    /// Sanity check the ELF file format.
    fn sanity_check(elf: &ElfFile) -> Result<()> {
        if !matches!(elf.header.pt1.class(), header::Class::SixtyFour)
            || !matches!(elf.header.pt1.data(), header::Data::LittleEndian)
        {
            return Err(ElfLoadError::UnsupportedImage);
        }

        // Header tables are indexed directly below, make sure they are in range
        // and aligned before anything reads them.
        let pt2 = &elf.header.pt2;
        let input_len = elf.input.len() as u64;
        let table_fits = |offset: u64, entry_size: u16, count: u16, min_entry: u16| {
            count == 0
                || (entry_size >= min_entry
                    && offset % HEADER_ALIGN == 0
                    && u64::from(entry_size) % HEADER_ALIGN == 0
                    && u64::from(entry_size)
                        .checked_mul(u64::from(count))
                        .and_then(|size| size.checked_add(offset))
                        .is_some_and(|end| end <= input_len))
        };
        if !table_fits(
            pt2.ph_offset(),
            pt2.ph_entry_size(),
            pt2.ph_count(),
            PH_ENTRY_SIZE,
        ) || !table_fits(
            pt2.sh_offset(),
            pt2.sh_entry_size(),
            pt2.sh_count(),
            SH_ENTRY_SIZE,
        ) || pt2.sh_count() >= SHN_LORESERVE
        {
            return Err(ElfLoadError::InvalidFormat);
        }

        header::sanity_check(elf).map_err(|_| ElfLoadError::InvalidFormat)?;

        if !matches!(pt2.machine().as_machine(), header::Machine::X86_64) {
            return Err(ElfLoadError::UnsupportedImage);
        }
        if matches!(pt2.type_().as_type(), header::Type::Relocatable) {
            return Err(ElfLoadError::UnsupportedImage);
        }

        Ok(())
    }

    /// Collects the `.text`, `.tdata`, `.tbss` and `.rela.dyn` sections.
    fn scan_sections(elf: &ElfFile) -> Result<Sections> {
        let mut sections = Sections::default();

        let strtab_index = elf.header.pt2.sh_str_index();
        if strtab_index == 0 {
            // Without names, the required sections cannot be found.
            return Ok(sections);
        }
        if strtab_index >= elf.header.pt2.sh_count() {
            return Err(ElfLoadError::InvalidFormat);
        }
        let strtab = elf
            .section_header(strtab_index)
            .map_err(|_| ElfLoadError::InvalidFormat)?;
        let names = file_range(elf.input, strtab.offset(), strtab.size())
            .ok_or(ElfLoadError::InvalidFormat)?;

        for index in 0..elf.header.pt2.sh_count() {
            let sh = elf
                .section_header(index)
                .map_err(|_| ElfLoadError::InvalidFormat)?;

            let Some(name) = section_name(names, sh.name()) else {
                continue;
            };

            match name {
                ".text" => sections.text_addr = Some(sh.address()),
                ".tdata" => sections.tdata = Some((sh.address(), sh.size(), sh.align())),
                ".tbss" => sections.tbss = Some((sh.size(), sh.align())),
                ".rela.dyn" => {
                    sections.rela_dyn = Some(RelaSection {
                        offset: sh.offset(),
                        size: sh.size(),
                        entry_size: u64::from(sh.entry_size()),
                    });
                }
                _ => {}
            }
        }

        Ok(sections)
    }

    /// Computes the address range covered by the loadable segments.
    fn scan_program_headers(elf: &ElfFile) -> Result<Extent> {
        let mut lowest = u64::MAX;
        let mut highest = 0u64;
        let mut count = 0;

        for ph in Self::program_headers(elf) {
            let ph = ph?;
            if ph.file_size() > ph.mem_size() {
                return Err(ElfLoadError::CorruptSegment);
            }

            if ph.get_type() == Ok(Type::Load) {
                let end = ph
                    .virtual_addr()
                    .checked_add(ph.mem_size())
                    .ok_or(ElfLoadError::CorruptSegment)?;
                lowest = lowest.min(ph.virtual_addr());
                highest = highest.max(end);
                count += 1;
            }
        }

        if count == 0 {
            return Err(ElfLoadError::NoLoadableSegments);
        }
        if lowest != 0 {
            return Err(ElfLoadError::BaseAddressNotZero);
        }
        if highest == 0 {
            return Err(ElfLoadError::NoLoadableSegments);
        }

        Ok(Extent {
            lowest,
            highest,
            count,
        })
    }

    /// Copies the loadable segments into the image and builds the segment table.
    fn load_segments(
        elf: &ElfFile,
        sections: &Sections,
        image: &mut PageBuffer,
        count: usize,
    ) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        segments
            .try_reserve_exact(count)
            .map_err(|_| ElfLoadError::OutOfMemory)?;

        for ph in Self::program_headers(elf) {
            let ph = ph?;
            match ph.get_type() {
                Ok(Type::Tls) => Self::check_tls_segment(&ph, sections)?,
                Ok(Type::Load) => {
                    let segment = Segment {
                        vaddr: ph.virtual_addr(),
                        file_size: ph.file_size(),
                        mem_size: ph.mem_size(),
                        file_offset: ph.offset(),
                        flags: SegmentFlags::from_program_flags(ph.flags()),
                    };
                    Self::copy_segment(elf.input, &segment, image)?;
                    segments.push(segment);
                }
                _ => {}
            }
        }

        debug_assert_eq!(segments.len(), count);
        Ok(segments)
    }

    /// The TLS segment must describe the same data as the `.tdata` section.
    fn check_tls_segment(ph: &ProgramHeader, sections: &Sections) -> Result<()> {
        let (tdata_addr, tdata_size, _) = sections.tdata.unwrap_or_default();

        if tdata_addr != ph.virtual_addr() && tdata_addr != 0 {
            return Err(ElfLoadError::TlsMismatch);
        }
        if tdata_size != ph.file_size() {
            return Err(ElfLoadError::TlsMismatch);
        }

        Ok(())
    }

    fn copy_segment(input: &[u8], segment: &Segment, image: &mut PageBuffer) -> Result<()> {
        if segment.file_size == 0 {
            return Ok(());
        }

        let src = file_range(input, segment.file_offset, segment.file_size)
            .ok_or(ElfLoadError::CorruptSegment)?;
        let start = usize::try_from(segment.vaddr).map_err(|_| ElfLoadError::CorruptSegment)?;
        let dst = image
            .as_mut_slice()
            .get_mut(start..start + src.len())
            .ok_or(ElfLoadError::CorruptSegment)?;
        dst.copy_from_slice(src);

        Ok(())
    }

    /// Sorts the segment table by address and rejects segments sharing a page.
    fn sort_segments(segments: &mut [Segment]) -> Result<()> {
        segments.sort_unstable_by_key(|segment| segment.vaddr);

        for pair in segments.windows(2) {
            let [segment, next] = pair else {
                unreachable!()
            };
            if segment.vaddr == next.vaddr || segment.end() > page_floor(next.vaddr) {
                log::debug!(
                    "segment {:#x}..{:#x} overlaps segment at {:#x}",
                    segment.vaddr,
                    segment.end(),
                    next.vaddr
                );
                return Err(ElfLoadError::SegmentOverlap);
            }
        }

        Ok(())
    }

    fn program_headers<'a>(
        elf: &'a ElfFile<'a>,
    ) -> impl Iterator<Item = Result<ProgramHeader<'a>>> + 'a {
        (0..elf.header.pt2.ph_count()).map(|index| {
            elf.program_header(index)
                .map_err(|_| ElfLoadError::InvalidFormat)
        })
    }
}

/// Returns `len` bytes of `input` starting at `offset`, if in range.
pub(crate) fn file_range(input: &[u8], offset: u64, len: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let len = usize::try_from(len).ok()?;
    input.get(start..start.checked_add(len)?)
}

/// Looks up a NUL-terminated name in the section-header string table.
fn section_name(names: &[u8], offset: u32) -> Option<&str> {
    let tail = names.get(usize::try_from(offset).ok()?..)?;
    core::ffi::CStr::from_bytes_until_nul(tail)
        .ok()?
        .to_str()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(vaddr: u64, mem_size: u64) -> Segment {
        Segment {
            vaddr,
            file_size: 0,
            mem_size,
            file_offset: 0,
            flags: SegmentFlags::READ,
        }
    }

    #[test]
    fn test_sort_segments() {
        let mut segments = [segment(0x3000, 0x10), segment(0, 0x1000), segment(0x1000, 0x20)];
        ElfLoader::sort_segments(&mut segments).unwrap();
        let addrs: Vec<_> = segments.iter().map(|s| s.vaddr).collect();
        assert_eq!(addrs, [0, 0x1000, 0x3000]);
    }

    #[test]
    fn test_segments_sharing_a_page_overlap() {
        let mut segments = [segment(0, 0x1800), segment(0x1900, 0x100)];
        assert_eq!(
            ElfLoader::sort_segments(&mut segments),
            Err(ElfLoadError::SegmentOverlap)
        );
    }

    #[test]
    fn test_identical_start_is_rejected() {
        let mut segments = [segment(0x2000, 0), segment(0x2000, 0)];
        assert_eq!(
            ElfLoader::sort_segments(&mut segments),
            Err(ElfLoadError::SegmentOverlap)
        );
    }

    #[test]
    fn test_section_name_lookup() {
        let names = b"\0.text\0.tdata\0";
        assert_eq!(section_name(names, 0), Some(""));
        assert_eq!(section_name(names, 1), Some(".text"));
        assert_eq!(section_name(names, 7), Some(".tdata"));
        assert_eq!(section_name(names, 64), None);
    }

    #[test]
    fn test_file_range() {
        let input = [1u8, 2, 3, 4];
        assert_eq!(file_range(&input, 1, 2), Some(&input[1..3]));
        assert_eq!(file_range(&input, 3, 2), None);
        assert_eq!(file_range(&input, u64::MAX, 1), None);
    }
}
