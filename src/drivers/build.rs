//! Kernel build driver.
//!
//! Renders the kernel template for a run, writes it to a scoped source file and compiles it
//! into a freestanding static executable with the external compiler.

use crate::{
    config::{RunConfig, Toolchain},
    consts::ARTIFACT_NAME,
    error::{Result, SweepError},
    kernels::KernelTemplate,
    utils::{run_tool, Deadline},
};

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

/// Flags shared by every build: no libc, no startup files, no PIE, fixed optimization level.
pub const CFLAGS: [&str; 5] = ["-static", "-nostdlib", "-fno-stack-protector", "-fno-pic", "-O3"];

/// Compiles `kernel` for `config` inside `dir` and returns the path of the executable.
///
/// The source file only lives for the duration of the compilation; the executable is always
/// written to `dir/`[`ARTIFACT_NAME`].
pub fn build(
    kernel: &KernelTemplate,
    config: &RunConfig,
    dir: &Path,
    tools: &Toolchain,
    deadline: &Deadline,
) -> Result<PathBuf> {
    let mut src = tempfile::Builder::new()
        .prefix(kernel.name())
        .suffix(".c")
        .tempfile_in(dir)?;
    src.write_all(kernel.render(config).as_bytes())?;
    src.flush()?;

    let mut cmd = Command::new(&tools.compiler);
    cmd.args(CFLAGS)
        .args(config.defines())
        .arg(src.path())
        .arg("-o")
        .arg(ARTIFACT_NAME);

    let out = run_tool(cmd, dir, deadline)?;
    if !out.status.success() {
        return Err(SweepError::Build {
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        });
    }

    Ok(dir.join(ARTIFACT_NAME))
}
