use std::collections::HashSet;

use ebin_format::{RelocEntry, RelocSection};
use goblin::elf::Elf;
use log::{debug, info};

use crate::elf::{LinkedElf, R_RISCV_32};
use crate::error::BuildError;

/// Result of the relocation extractor: the merged table plus a count of
/// GOT-synthesized entries for `-v` diagnostics.
pub struct RelocationReport {
    pub relocations: Vec<RelocEntry>,
    pub synthesized_count: usize,
}

/// Mines ELF-reported `R_RISCV_32` relocations in `.data`/`.rodata`, then
/// synthesizes GOT relocations the linker resolved statically.
pub fn extract(linked: &LinkedElf, elf: &Elf) -> Result<RelocationReport, BuildError> {
    let data_base = linked.section(".data").map(|s| s.addr).unwrap_or(0);
    let rodata_base = linked.section(".rodata").map(|s| s.addr).unwrap_or(0);
    let text_base = linked.section(".text").map(|s| s.addr).unwrap_or(0);
    let code_size_before_rodata = linked.section(".text").map(|s| s.size).unwrap_or(0);

    let mut relocations = Vec::new();
    let mut data_offsets_seen: HashSet<u32> = HashSet::new();

    for (_shndx, relocs) in elf.shdr_relocs.iter() {
        for reloc in relocs.iter() {
            if reloc.r_type != R_RISCV_32 {
                continue;
            }
            let vaddr = reloc.r_offset;

            if let Some(data) = linked.section(".data") {
                if vaddr >= data.addr && vaddr < data.addr + data.size {
                    let offset = (vaddr - data_base) as u32;
                    relocations.push(RelocEntry::absolute(offset, RelocSection::Data));
                    data_offsets_seen.insert(offset);
                    continue;
                }
            }

            if let Some(rodata) = linked.section(".rodata") {
                if vaddr >= rodata.addr && vaddr < rodata.addr + rodata.size {
                    // `R_RISCV_32` in `.rodata` maps to the code blob instead of
                    // silently mislabeling it as a data-blob relocation. The code
                    // blob is `.text` ++ `.rodata`, so the rodata-relative offset
                    // shifts by the size of `.text` that precedes it.
                    let rodata_relative = vaddr - rodata_base;
                    let offset = (rodata_relative + code_size_before_rodata) as u32;
                    relocations.push(RelocEntry::absolute(offset, RelocSection::Code));
                    continue;
                }
            }

            debug!(
                "ignoring R_RISCV_32 relocation at {:#x} outside .data/.rodata (text base {:#x})",
                vaddr, text_base
            );
        }
    }

    let synthesized_count = synthesize_got_relocations(linked, data_base, &data_offsets_seen, &mut relocations)?;

    info!(
        "relocations: {} ELF-reported, {} GOT-synthesized",
        relocations.len() - synthesized_count,
        synthesized_count
    );

    Ok(RelocationReport { relocations, synthesized_count })
}

/// The GOT is part of the data blob by construction (the
/// linker script places `.got` immediately after `.data`), so GOT offsets
/// are expressed relative to `.data`'s base, matching how the data blob is
/// assembled.
fn synthesize_got_relocations(
    linked: &LinkedElf,
    data_base: u64,
    already_seen: &HashSet<u32>,
    relocations: &mut Vec<RelocEntry>,
) -> Result<usize, BuildError> {
    let Some(got) = linked.section(".got") else {
        return Ok(0);
    };
    if got.size == 0 {
        return Ok(0);
    }

    // Computed from `.bss`'s own address range, not summed from extracted blob
    // lengths: `rv32imafc`'s compressed extension routinely leaves `.text`
    // unaligned, so the ALIGN(4) gap before `.rodata` (and the like between
    // `.data`/`.got`) would otherwise go uncounted and undershoot the true
    // end-of-image address.
    let load_span = linked.section(".bss").map(|s| s.addr + s.size).unwrap_or(0);

    let got_start = got.offset as usize;
    let got_end = got_start + got.size as usize;
    let got_bytes = linked
        .bytes
        .get(got_start..got_end)
        .ok_or_else(|| BuildError::MalformedElf("`.got` section extends past end of file".into()))?;

    let mut count = 0;
    for (i, word) in got_bytes.chunks_exact(4).enumerate() {
        let addr = got.addr + (i as u64) * 4;
        let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as u64;

        let data_off = (addr - data_base) as u32;
        if already_seen.contains(&data_off) {
            continue;
        }
        if value > 0 && value <= load_span {
            relocations.push(RelocEntry::absolute(data_off, RelocSection::Data));
            count += 1;
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u32, section: RelocSection) -> RelocEntry {
        RelocEntry::absolute(offset, section)
    }

    #[test]
    fn relocation_entries_carry_absolute_type() {
        let r = entry(4, RelocSection::Data);
        assert_eq!(r.section, RelocSection::Data);
        assert_eq!(r.offset, 4);
    }
}
