#![allow(dead_code)]

use sanctum_core::host::{HostError, HostFiles, HostResult};

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub const PT_LOAD: u32 = 1;
pub const PT_TLS: u32 = 7;

pub const SHT_PROGBITS: u32 = 1;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_NOBITS: u32 = 8;

pub const E_PHOFF: usize = 0x20;
pub const E_SHOFF: usize = 0x28;
pub const E_PHNUM: usize = 0x38;
pub const E_SHNUM: usize = 0x3C;
pub const E_SHSTRNDX: usize = 0x3E;

pub const EM_X86_64: u16 = 0x3E;
pub const EM_AARCH64: u16 = 0xB7;
pub const ET_REL: u16 = 1;
pub const ET_EXEC: u16 = 2;

#[derive(Clone)]
pub struct SegmentSpec {
    pub kind: u32,
    pub flags: u32,
    pub vaddr: u64,
    pub align: u64,
    pub data: Vec<u8>,
    pub mem_size: u64,
}

impl SegmentSpec {
    pub fn load(flags: u32, vaddr: u64, data: Vec<u8>, mem_size: u64) -> Self {
        Self {
            kind: PT_LOAD,
            flags,
            vaddr,
            align: 0x1000,
            data,
            mem_size,
        }
    }
}

#[derive(Clone)]
pub struct SectionSpec {
    pub name: &'static str,
    pub kind: u32,
    pub addr: u64,
    pub size: u64,
    pub align: u64,
    pub entry_size: u64,
    /// Data stored in the file for this section, if any
    pub data: Vec<u8>,
}

impl SectionSpec {
    pub fn new(name: &'static str, kind: u32, addr: u64, size: u64) -> Self {
        Self {
            name,
            kind,
            addr,
            size,
            align: 0x10,
            entry_size: 0,
            data: Vec::new(),
        }
    }

    pub fn rela(records: &[(u64, u64, i64)]) -> Self {
        let mut data = Vec::new();
        for &(offset, info, addend) in records {
            data.extend_from_slice(&offset.to_le_bytes());
            data.extend_from_slice(&info.to_le_bytes());
            data.extend_from_slice(&addend.to_le_bytes());
        }
        Self {
            name: ".rela.dyn",
            kind: SHT_RELA,
            addr: 0,
            size: data.len() as u64,
            align: 8,
            entry_size: 24,
            data,
        }
    }
}

pub struct ElfBuilder {
    machine: u16,
    elf_type: u16,
    entry: u64,
    segments: Vec<SegmentSpec>,
    sections: Vec<SectionSpec>,
}

impl ElfBuilder {
    /// An x86-64 executable with a `.text` section at address 0.
    pub fn new() -> Self {
        Self {
            machine: EM_X86_64,
            elf_type: ET_EXEC,
            entry: 0x10,
            segments: Vec::new(),
            sections: vec![SectionSpec::new(".text", SHT_PROGBITS, 0, 0x10)],
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn elf_type(mut self, elf_type: u16) -> Self {
        self.elf_type = elf_type;
        self
    }

    pub fn segment(mut self, segment: SegmentSpec) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn section(mut self, section: SectionSpec) -> Self {
        self.sections.push(section);
        self
    }

    pub fn without_sections(mut self) -> Self {
        self.sections.clear();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phoff = 0x40u64;
        let phentsize = 56u16;
        let shentsize = 64u16;
        let phnum = self.segments.len() as u16;

        let ph_table_end = phoff as usize + phnum as usize * phentsize as usize;
        let mut elf = vec![0u8; ph_table_end];

        // e_ident
        elf[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        elf[4] = 2; // 64-bit
        elf[5] = 1; // little-endian
        elf[6] = 1; // version

        write_u16(&mut elf, 0x10, self.elf_type);
        write_u16(&mut elf, 0x12, self.machine);
        write_u32(&mut elf, 0x14, 1);
        write_u64(&mut elf, 0x18, self.entry);
        write_u64(&mut elf, 0x20, phoff);
        write_u16(&mut elf, 0x34, 64);
        write_u16(&mut elf, 0x36, phentsize);
        write_u16(&mut elf, 0x38, phnum);

        let mut cursor = align_to_mod(ph_table_end as u64, 0x1000, 0);

        for (idx, seg) in self.segments.iter().enumerate() {
            let align = seg.align.max(1);
            cursor = align_to_mod(cursor, align, seg.vaddr % align);

            let base = phoff as usize + idx * phentsize as usize;
            write_u32(&mut elf, base, seg.kind);
            write_u32(&mut elf, base + 4, seg.flags);
            write_u64(&mut elf, base + 8, cursor);
            write_u64(&mut elf, base + 16, seg.vaddr);
            write_u64(&mut elf, base + 24, seg.vaddr);
            write_u64(&mut elf, base + 32, seg.data.len() as u64);
            write_u64(&mut elf, base + 40, seg.mem_size);
            write_u64(&mut elf, base + 48, align);

            cursor = append_at(&mut elf, cursor, &seg.data);
        }

        if self.sections.is_empty() {
            return elf;
        }

        // Section data, then the name table, then the header table.
        let mut offsets = Vec::new();
        for section in &self.sections {
            cursor = align_to_mod(cursor, 8, 0);
            offsets.push(cursor);
            cursor = append_at(&mut elf, cursor, &section.data);
        }

        let mut names = vec![0u8];
        let mut name_offsets = Vec::new();
        for section in self.sections.iter().map(|s| s.name).chain([".shstrtab"]) {
            name_offsets.push(names.len() as u32);
            names.extend_from_slice(section.as_bytes());
            names.push(0);
        }
        let names_offset = cursor;
        cursor = append_at(&mut elf, cursor, &names);

        let shoff = align_to_mod(cursor, 8, 0);
        let shnum = self.sections.len() as u16 + 2;
        elf.resize(shoff as usize + shnum as usize * shentsize as usize, 0);

        let mut write_section = |index: usize, name: u32, kind: u32, addr: u64, offset: u64, size: u64, align: u64, entry_size: u64| {
            let base = shoff as usize + index * shentsize as usize;
            write_u32(&mut elf, base, name);
            write_u32(&mut elf, base + 4, kind);
            write_u64(&mut elf, base + 16, addr);
            write_u64(&mut elf, base + 24, offset);
            write_u64(&mut elf, base + 32, size);
            write_u64(&mut elf, base + 48, align);
            write_u64(&mut elf, base + 56, entry_size);
        };

        // Index 0 stays SHT_NULL.
        for (i, section) in self.sections.iter().enumerate() {
            write_section(
                i + 1,
                name_offsets[i],
                section.kind,
                section.addr,
                offsets[i],
                section.size,
                section.align,
                section.entry_size,
            );
        }
        let strtab_index = self.sections.len() + 1;
        write_section(
            strtab_index,
            name_offsets[self.sections.len()],
            SHT_STRTAB,
            0,
            names_offset,
            names.len() as u64,
            1,
            0,
        );

        write_u64(&mut elf, 0x28, shoff);
        write_u16(&mut elf, 0x3A, shentsize);
        write_u16(&mut elf, 0x3C, shnum);
        write_u16(&mut elf, 0x3E, strtab_index as u16);

        elf
    }
}

/// Host file service backed by an in-memory list of files.
#[derive(Default)]
pub struct MockFiles {
    pub files: Vec<(String, Vec<u8>)>,
}

impl MockFiles {
    pub fn with(path: &str, data: Vec<u8>) -> Self {
        Self {
            files: vec![(path.to_string(), data)],
        }
    }
}

impl HostFiles for MockFiles {
    fn read_whole_file(&self, path: &str) -> HostResult<Vec<u8>> {
        self.files
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, data)| data.clone())
            .ok_or(HostError::NotFound)
    }

    fn copy_directory(&self, _src: &str, _dst: &str, _ignore_errors: bool) -> HostResult<()> {
        Err(HostError::Unsupported)
    }
}

fn append_at(elf: &mut Vec<u8>, offset: u64, data: &[u8]) -> u64 {
    let end = offset as usize + data.len();
    if elf.len() < end {
        elf.resize(end, 0);
    }
    elf[offset as usize..end].copy_from_slice(data);
    end as u64
}

fn align_to_mod(val: u64, align: u64, modulo: u64) -> u64 {
    let a = align.max(1);
    let mod_target = modulo % a;
    let r = val % a;
    let delta = (mod_target + a - r) % a;
    val + delta
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap())
}

pub fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}
