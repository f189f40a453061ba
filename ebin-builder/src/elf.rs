use std::collections::HashMap;
use std::fs;
use std::path::Path;

use goblin::elf::Elf;
use log::debug;

use crate::error::BuildError;

/// ELF relocation type for an absolute 32-bit word. Not present in goblin's
/// `relocation_constants` (which only covers x86/ARM/etc.), so it's defined
/// locally; it is the RISC-V psABI's `R_RISCV_32`.
pub const R_RISCV_32: u32 = 1;

/// The slice of a named section's layout we actually need downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionInfo {
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
}

/// The linked ELF, parsed once and kept around (borrowing the raw bytes) so
/// every later stage can look sections and symbols up by name without
/// re-invoking any external tool.
pub struct LinkedElf {
    pub bytes: Vec<u8>,
    pub sections: HashMap<String, SectionInfo>,
}

impl LinkedElf {
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let bytes = fs::read(path)?;
        let elf = Elf::parse(&bytes).map_err(|e| BuildError::MalformedElf(e.to_string()))?;

        let mut sections = HashMap::new();
        for sh in &elf.section_headers {
            let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }
            sections.insert(
                name,
                SectionInfo {
                    addr: sh.sh_addr,
                    offset: sh.sh_offset,
                    size: sh.sh_size,
                },
            );
        }

        if !sections.contains_key(".text") {
            return Err(BuildError::MalformedElf("linked object has no .text section".into()));
        }

        debug!("parsed ELF: {} section(s)", sections.len());
        Ok(Self { bytes, sections })
    }

    pub fn section(&self, name: &str) -> Option<SectionInfo> {
        self.sections.get(name).copied()
    }

    /// Raw file bytes backing a section, or an empty slice if the section is
    /// absent or occupies no file space (e.g. `.bss`).
    fn section_bytes(&self, info: SectionInfo) -> &[u8] {
        let start = info.offset as usize;
        let end = start + info.size as usize;
        self.bytes.get(start..end).unwrap_or(&[])
    }

    /// Code blob: `.text` followed by `.rodata`, byte-for-byte as laid out by
    /// the linker — they must already be contiguous for this to be
    /// meaningful, which the fixed linker script guarantees.
    pub fn code_blob(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(text) = self.section(".text") {
            out.extend_from_slice(self.section_bytes(text));
        }
        if let Some(rodata) = self.section(".rodata") {
            out.extend_from_slice(self.section_bytes(rodata));
        }
        out
    }

    /// Data blob: `.data` followed by `.got`.
    pub fn data_blob(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(data) = self.section(".data") {
            out.extend_from_slice(self.section_bytes(data));
        }
        if let Some(got) = self.section(".got") {
            out.extend_from_slice(self.section_bytes(got));
        }
        out
    }

    pub fn bss_size(&self) -> u64 {
        self.section(".bss").map(|s| s.size).unwrap_or(0)
    }

    /// `entry_address - text_base`. Defaults to 0 if `.text`
    /// has no resolvable base, matching the common case (the linker script
    /// places `.text` at VMA 0).
    pub fn resolve_entry(&self, elf: &Elf, symbol: &str) -> Result<u32, BuildError> {
        let text_base = self.section(".text").map(|s| s.addr).unwrap_or(0);

        let address = find_symbol(elf, symbol).ok_or_else(|| BuildError::EntryNotFound(symbol.to_string()))?;

        Ok((address.saturating_sub(text_base)) as u32)
    }
}

fn find_symbol(elf: &Elf, name: &str) -> Option<u64> {
    for sym in elf.syms.iter() {
        if sym.st_value == 0 && sym.st_shndx == 0 {
            continue;
        }
        if elf.strtab.get_at(sym.st_name) == Some(name) {
            return Some(sym.st_value);
        }
    }
    for sym in elf.dynsyms.iter() {
        if elf.dynstrtab.get_at(sym.st_name) == Some(name) {
            return Some(sym.st_value);
        }
    }
    None
}

/// Re-parses the ELF wrapper type alongside [`LinkedElf`]'s owned bytes.
/// `goblin::elf::Elf` borrows from the byte buffer, so callers need both:
/// the owned bytes for section extraction and a freshly parsed `Elf` for
/// symbol/relocation lookups against those same bytes.
pub fn parse(bytes: &[u8]) -> Result<Elf<'_>, BuildError> {
    Elf::parse(bytes).map_err(|e| BuildError::MalformedElf(e.to_string()))
}
