use std::path::PathBuf;
use std::process::Command;

use log::debug;

use crate::error::BuildError;

/// A fallback list tried when the caller supplies no `--toolchain-prefix` of its own.
const DEFAULT_PREFIXES: &[&str] = &["riscv32-unknown-elf-", "riscv32-esp-elf-", "riscv64-unknown-elf-"];

/// A probed, working cross-toolchain, identified by its tool-name prefix.
#[derive(Debug, Clone)]
pub struct Toolchain {
    prefix: String,
}

impl Toolchain {
    /// Tries each candidate prefix in order, returning the first for which
    /// `{prefix}gcc --version` exits zero.
    pub fn probe(candidates: &[String]) -> Result<Self, BuildError> {
        let mut tried = Vec::new();
        let owned: Vec<String>;
        let prefixes: &[String] = if candidates.is_empty() {
            owned = DEFAULT_PREFIXES.iter().map(|s| s.to_string()).collect();
            &owned
        } else {
            candidates
        };

        for prefix in prefixes {
            tried.push(prefix.clone());
            debug!("probing toolchain prefix `{prefix}`");
            let ok = Command::new(format!("{prefix}gcc"))
                .arg("--version")
                .output()
                .map(|out| out.status.success())
                .unwrap_or(false);
            if ok {
                debug!("toolchain prefix `{prefix}` is usable");
                return Ok(Self { prefix: prefix.clone() });
            }
        }

        Err(BuildError::ToolchainMissing { tried })
    }

    pub fn gcc(&self) -> PathBuf {
        PathBuf::from(format!("{}gcc", self.prefix))
    }

    pub fn ld(&self) -> PathBuf {
        PathBuf::from(format!("{}ld", self.prefix))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
