use std::path::PathBuf;

use clap::Parser;
use ebin_format::ComponentType;

use crate::error::BuildError;

/// Compiles C source files into an EBIN component for the espTari dynamic loader.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// C source files to compile.
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Output EBIN path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Component type.
    #[arg(short = 't', long = "type", value_parser = parse_component_type)]
    pub component_type: ComponentType,

    /// Entry point symbol.
    #[arg(short, long, default_value = "component_entry")]
    pub entry: String,

    /// Include directory. May be repeated.
    #[arg(short = 'I', long = "include")]
    pub include_dirs: Vec<PathBuf>,

    /// Preprocessor define. May be repeated.
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Interface version, stored verbatim in the header. Accepts hex (`0x...`) or decimal.
    #[arg(long = "interface-version", value_parser = parse_u32, default_value = "0x00010000")]
    pub interface_version: u32,

    /// RAM floor required at load time, stored verbatim in the header.
    #[arg(long = "min-ram", default_value_t = 0)]
    pub min_ram: u32,

    /// Debug build: adds `-g` to the compile flags and sets the header's debug flag.
    #[arg(long)]
    pub debug: bool,

    /// Print blob sizes, entry offset, and relocation count.
    #[arg(short, long)]
    pub verbose: bool,

    /// Candidate cross-toolchain prefixes to try, in order, before the built-in fallback list.
    #[arg(long = "toolchain-prefix")]
    pub toolchain_prefixes: Vec<String>,
}

fn parse_component_type(s: &str) -> Result<ComponentType, String> {
    s.parse::<ComponentType>().map_err(|e| e.to_string())
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u32>().map_err(|e| e.to_string())
    }
}

impl Args {
    /// Validates the parts of the configuration clap's `value_parser`s can't express,
    /// e.g. source-basename collisions, which are reported as `ConfigError`.
    pub fn validate(&self) -> Result<(), BuildError> {
        let mut seen = std::collections::HashSet::new();
        for src in &self.sources {
            let stem = src.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                BuildError::ConfigError(format!("source path has no usable file name: {}", src.display()))
            })?;
            if !seen.insert(stem.to_string()) {
                return Err(BuildError::ConfigError(format!(
                    "two source files would produce the same object file name: `{stem}.o`"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_version_accepts_hex_and_decimal() {
        assert_eq!(parse_u32("0x00010000").unwrap(), 0x0001_0000);
        assert_eq!(parse_u32("65536").unwrap(), 65536);
    }

    #[test]
    fn rejects_colliding_source_basenames() {
        let args = Args {
            sources: vec![PathBuf::from("a/foo.c"), PathBuf::from("b/foo.c")],
            output: PathBuf::from("out.ebin"),
            component_type: ComponentType::Cpu,
            entry: "component_entry".into(),
            include_dirs: vec![],
            defines: vec![],
            interface_version: 0x0001_0000,
            min_ram: 0,
            debug: false,
            verbose: false,
            toolchain_prefixes: vec![],
        };
        assert!(args.validate().is_err());
    }
}
