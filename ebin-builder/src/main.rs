mod cli;
mod compiler;
mod elf;
mod error;
mod linker;
mod pipeline;
mod relocations;
mod toolchain;
mod workspace;

use clap::Parser;

use cli::Args;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let summary = pipeline::run(&args)?;
    if args.verbose {
        println!(
            "code_size={} data_size={} bss_size={} entry_offset={} relocations={} (synthesized={})",
            summary.code_size,
            summary.data_size,
            summary.bss_size,
            summary.entry_offset,
            summary.reloc_count,
            summary.synthesized_reloc_count,
        );
    }
    Ok(())
}
