use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::error::BuildError;
use crate::toolchain::Toolchain;
use crate::workspace::Workspace;

/// Flags applied to every compile invocation, in order. Not individually
/// configurable: PIC and no-relax keep `auipc` pairs intact for the loader,
/// gc-sections needs function/data sections, and the rest keep libc out.
const MANDATORY_FLAGS: &[&str] = &[
    "-c",
    "-fPIC",
    "-fno-common",
    "-ffunction-sections",
    "-fdata-sections",
    "-march=rv32imafc",
    "-mabi=ilp32f",
    "-mno-relax",
    "-O2",
    "-nostdlib",
    "-ffreestanding",
    "-Wall",
    "-Wextra",
];

/// Compiles every source file to an object file in `workspace`, in the order given.
/// Returns the object file paths in the same order, which the linker driver
/// then passes on its command line unchanged, preserving deterministic object order.
pub fn compile_all(
    toolchain: &Toolchain,
    workspace: &Workspace,
    sources: &[PathBuf],
    include_dirs: &[PathBuf],
    defines: &[String],
    debug_build: bool,
) -> Result<Vec<PathBuf>, BuildError> {
    let mut objects = Vec::with_capacity(sources.len());
    for source in sources {
        let object = workspace.object_path(source);
        compile_one(toolchain, source, &object, include_dirs, defines, debug_build)?;
        objects.push(object);
    }
    Ok(objects)
}

fn compile_one(
    toolchain: &Toolchain,
    source: &Path,
    object: &Path,
    include_dirs: &[PathBuf],
    defines: &[String],
    debug_build: bool,
) -> Result<(), BuildError> {
    let mut cmd = Command::new(toolchain.gcc());
    cmd.args(MANDATORY_FLAGS);
    if debug_build {
        cmd.arg("-g");
    }
    for dir in include_dirs {
        cmd.arg("-I").arg(dir);
    }
    for define in defines {
        cmd.arg(format!("-D{define}"));
    }
    cmd.arg(source).arg("-o").arg(object);

    debug!("compiling {} -> {}", source.display(), object.display());
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(BuildError::CompileFailed {
            source: source.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}
