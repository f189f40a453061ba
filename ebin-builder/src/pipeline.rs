use ebin_format::{Container, ContainerConfig};
use log::info;

use crate::cli::Args;
use crate::compiler;
use crate::elf::{self, LinkedElf};
use crate::error::BuildError;
use crate::linker;
use crate::relocations;
use crate::toolchain::Toolchain;
use crate::workspace::Workspace;

/// The outcome of a successful build, returned so the CLI layer can print a
/// `-v` summary without re-deriving anything from the written file.
pub struct BuildSummary {
    pub code_size: usize,
    pub data_size: usize,
    pub bss_size: u64,
    pub entry_offset: u32,
    pub reloc_count: usize,
    pub synthesized_reloc_count: usize,
}

/// Runs the full probe -> compile -> link -> extract -> serialize pipeline
/// and writes the EBIN file atomically.
pub fn run(args: &Args) -> Result<BuildSummary, BuildError> {
    args.validate()?;

    let toolchain = Toolchain::probe(&args.toolchain_prefixes)?;
    info!("using toolchain prefix `{}`", toolchain.prefix());

    let workspace = Workspace::new()?;

    let objects = compiler::compile_all(
        &toolchain,
        &workspace,
        &args.sources,
        &args.include_dirs,
        &args.defines,
        args.debug,
    )?;

    let elf_path = linker::link(&toolchain, &workspace, &objects, &args.entry)?;

    let linked = LinkedElf::load(&elf_path)?;
    let parsed = elf::parse(&linked.bytes)?;

    let entry_offset = linked.resolve_entry(&parsed, &args.entry)?;

    let code = linked.code_blob();
    let data = linked.data_blob();
    let bss_size = linked.bss_size();

    let report = relocations::extract(&linked, &parsed)?;

    let config = ContainerConfig {
        component_type: args.component_type,
        interface_version: args.interface_version,
        min_ram: args.min_ram,
        debug: args.debug,
    };

    let code_size = code.len();
    let data_size = data.len();
    let reloc_count = report.relocations.len();

    let container = Container::build(code, data, bss_size as u32, entry_offset, report.relocations, config);

    write_atomically(&args.output, &container.to_bytes())?;

    Ok(BuildSummary {
        code_size,
        data_size,
        bss_size,
        entry_offset,
        reloc_count,
        synthesized_reloc_count: report.synthesized_count,
    })
}

/// Write-then-rename so a partially produced file never replaces an existing
/// output.
fn write_atomically(output: &std::path::Path, bytes: &[u8]) -> Result<(), BuildError> {
    let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(bytes)?;
    tmp.persist(output).map_err(|e| BuildError::Io(e.error))?;
    Ok(())
}
