use std::path::PathBuf;

use thiserror::Error;

/// Every way the pipeline can fail. All of these are fatal: there is no retry
/// logic anywhere in this crate.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "could not find a working cross-toolchain; tried prefixes: {}",
        tried.join(", ")
    )]
    ToolchainMissing { tried: Vec<String> },

    #[error("{0}")]
    ConfigError(String),

    #[error("compilation failed for {source}:\n{stderr}")]
    CompileFailed { source: PathBuf, stderr: String },

    #[error("linking failed:\n{0}")]
    LinkFailed(String),

    #[error("malformed ELF: {0}")]
    MalformedElf(String),

    #[error("entry symbol `{0}` was not found")]
    EntryNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
