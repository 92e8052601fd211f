//! Local network-filesystem bridge over sshfs.
//!
//! The bridge mounts the remote mount point into the local mount directory.
//! The SSH password is written to sshfs over stdin (`-o password_stdin`),
//! never placed in argv. Unmounting tries an ordered list of strategies and
//! accepts the first one that succeeds, so teardown keeps working across
//! environments where fusermount or plain umount are unavailable.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::config::Profile;
use crate::error::{
    BridgeMountSnafu, BridgeTimeoutSnafu, BridgeUnmountSnafu, IoResultExt, Result,
};

/// Keep-alive probe interval passed to sshfs, in seconds.
pub const SERVER_ALIVE_INTERVAL_SECS: u32 = 20;

/// Number of unanswered keep-alive probes before sshfs gives up.
pub const SERVER_ALIVE_COUNT_MAX: u32 = 5;

/// Connection timeout passed to sshfs, in seconds.
pub const SSHFS_CONNECT_TIMEOUT_SECS: u32 = 20;

/// How long the mount itself may take before the child is killed.
pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(30);

/// Unmount strategies tried in order: FUSE unmount, lazy unmount, plain
/// unmount, privileged unmount.
const UNMOUNT_STRATEGIES: &[&[&str]] = &[
    &["fusermount", "-u"],
    &["umount", "-l"],
    &["umount"],
    &["sudo", "umount"],
];

/// Mounts and unmounts the local view of the remote filesystem.
pub trait Bridge {
    /// Mounts `profile.mount_point` from the remote host at `local_dir`.
    fn mount(&self, profile: &Profile, local_dir: &Path) -> Result<()>;

    /// Unmounts `local_dir`.
    fn unmount(&self, local_dir: &Path) -> Result<()>;
}

/// Bridge backed by the system `sshfs` binary.
#[derive(Debug, Clone)]
pub struct SshfsBridge {
    mount_timeout: Duration,
}

impl SshfsBridge {
    pub fn new() -> Self {
        Self {
            mount_timeout: MOUNT_TIMEOUT,
        }
    }

    fn sshfs_argv(profile: &Profile, local_dir: &Path) -> Vec<String> {
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        vec![
            "-p".to_string(),
            profile.port.clone(),
            "-o".to_string(),
            "reconnect".to_string(),
            "-o".to_string(),
            format!("ServerAliveInterval={SERVER_ALIVE_INTERVAL_SECS}"),
            "-o".to_string(),
            format!("ServerAliveCountMax={SERVER_ALIVE_COUNT_MAX}"),
            "-o".to_string(),
            format!("ConnectTimeout={SSHFS_CONNECT_TIMEOUT_SECS}"),
            "-o".to_string(),
            "password_stdin".to_string(),
            "-o".to_string(),
            format!("uid={uid}"),
            "-o".to_string(),
            format!("gid={gid}"),
            "-o".to_string(),
            "allow_other".to_string(),
            format!("{}:{}", profile.remote_target(), profile.mount_point),
            local_dir.display().to_string(),
        ]
    }

    fn wait_with_timeout(&self, mut child: Child) -> Result<(i32, String)> {
        let stdout_reader = spawn_output_reader(child.stdout.take());
        let stderr_reader = spawn_output_reader(child.stderr.take());

        let start = Instant::now();
        let mut exit_status = None;
        while start.elapsed() <= self.mount_timeout {
            match child.try_wait().command_context("sshfs")? {
                Some(status) => {
                    exit_status = Some(status);
                    break;
                }
                None => thread::sleep(Duration::from_millis(25)),
            }
        }

        let Some(status) = exit_status else {
            let _ = child.kill();
            let _ = child.wait();
            return BridgeTimeoutSnafu {
                secs: self.mount_timeout.as_secs(),
            }
            .fail();
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        let diagnostic = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        Ok((status.code().unwrap_or(-1), diagnostic))
    }
}

impl Default for SshfsBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge for SshfsBridge {
    fn mount(&self, profile: &Profile, local_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(local_dir).dir_context(local_dir)?;

        let mut child = Command::new("sshfs")
            .args(Self::sshfs_argv(profile, local_dir))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .command_context("sshfs")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(profile.password.as_bytes())
                .command_context("sshfs")?;
            stdin.write_all(b"\n").command_context("sshfs")?;
        }

        let (status, diagnostic) = self.wait_with_timeout(child)?;
        snafu::ensure!(status == 0, BridgeMountSnafu { stderr: diagnostic });
        Ok(())
    }

    fn unmount(&self, local_dir: &Path) -> Result<()> {
        for strategy in UNMOUNT_STRATEGIES {
            let Some((program, flags)) = strategy.split_first() else {
                continue;
            };
            let result = Command::new(program).args(flags).arg(local_dir).output();
            match result {
                Ok(output) if output.status.success() => return Ok(()),
                Ok(output) => debug!(
                    "{} failed on {}: {}",
                    strategy.join(" "),
                    local_dir.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                Err(err) => debug!("{program} unavailable: {err}"),
            }
        }
        BridgeUnmountSnafu {
            path: local_dir.to_path_buf(),
        }
        .fail()
    }
}

fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = pipe {
            let _ = reader.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}
