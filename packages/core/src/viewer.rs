//! Post-mount launch of a local file manager.
//!
//! Strictly best-effort: the first available candidate is spawned detached
//! and forgotten. Nothing here can fail the workflow; outcomes are only
//! logged.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::deps::find_in_path;

/// Candidate file managers, in order of preference.
const FILE_MANAGERS: &[(&str, &str)] = &[
    ("thunar", "Thunar (XFCE)"),
    ("dolphin", "Dolphin (KDE)"),
    ("nautilus", "Nautilus (GNOME)"),
    ("pcmanfm", "PCManFM (LXDE)"),
    ("nemo", "Nemo (Cinnamon)"),
];

/// Opens the first available file manager at `mount_dir`, detached.
///
/// Skipped entirely without a graphical session.
pub fn launch_file_manager(mount_dir: &Path) {
    if std::env::var_os("DISPLAY").is_none() {
        info!("no graphical session detected, skipping file manager launch");
        return;
    }

    for (program, label) in FILE_MANAGERS {
        if find_in_path(program).is_none() {
            continue;
        }
        match spawn_detached(program, mount_dir) {
            Ok(()) => {
                info!("opened {label} at {}", mount_dir.display());
                return;
            }
            Err(err) => warn!("failed to launch {label}: {err}"),
        }
    }

    info!(
        "no supported file manager found, files are at {}",
        mount_dir.display()
    );
}

fn spawn_detached(program: &str, mount_dir: &Path) -> std::io::Result<()> {
    let mut command = Command::new(program);
    command
        .arg(mount_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // Detach into its own session so it outlives the workflow process.
    unsafe {
        command.pre_exec(|| {
            let _ = nix::unistd::setsid();
            Ok(())
        });
    }
    command.spawn().map(|_| ())
}
