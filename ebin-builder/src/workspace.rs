use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::BuildError;

/// A scratch directory for object files, the linked ELF, and the generated
/// linker script. Removed when dropped, on every exit path including errors.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self, BuildError> {
        let dir = TempDir::new()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn object_path(&self, source: &Path) -> PathBuf {
        let stem = source.file_stem().unwrap_or_default();
        self.dir.path().join(stem).with_extension("o")
    }

    pub fn linker_script_path(&self) -> PathBuf {
        self.dir.path().join("component.ld")
    }

    pub fn elf_path(&self) -> PathBuf {
        self.dir.path().join("component.elf")
    }
}
