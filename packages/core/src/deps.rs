//! Discovery of required local helper programs.
//!
//! The workflow shells out to sshpass, sshfs, and the local unmount tools;
//! all of them must be present before a session is attempted so the failure
//! is a single actionable message instead of a mid-workflow surprise.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{MissingDependenciesSnafu, Result};

/// Programs the workflow invokes locally.
pub const REQUIRED_TOOLS: &[&str] = &["sshpass", "sshfs", "fusermount", "umount"];

/// Install hints printed alongside a missing-dependency failure.
pub const INSTALL_HINTS: &[&str] = &[
    "To install on Debian/Ubuntu: sudo apt install sshfs sshpass",
    "To install on Arch: sudo pacman -S sshfs sshpass",
    "To install on Fedora: sudo dnf install fuse-sshfs sshpass",
];

/// Fails with the full list of missing tools if any required program is
/// absent from PATH.
pub fn check_local_dependencies() -> Result<()> {
    let missing: Vec<String> = REQUIRED_TOOLS
        .iter()
        .filter(|tool| find_in_path(tool).is_none())
        .map(|tool| tool.to_string())
        .collect();
    snafu::ensure!(missing.is_empty(), MissingDependenciesSnafu { tools: missing });
    Ok(())
}

/// Locates an executable by scanning the PATH environment variable.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    find_in(program, env::split_paths(&path_var))
}

/// Locates an executable within an explicit list of directories.
fn find_in(program: &str, dirs: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    dirs.into_iter()
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.is_file()
        && path
            .metadata()
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}
