//! Remote LUKS volume operations.
//!
//! Every function here is one blocking round-trip through a [`Transport`]:
//! verify the tool, open and close the mapping, mount and unmount the
//! unlocked volume. Failure output from cryptsetup is classified so a
//! wrong-passphrase condition surfaces distinctly from other unlock errors.

use snafu::ensure;

use crate::config::Profile;
use crate::error::{
    CloseSnafu, CryptsetupMissingSnafu, RemoteMountSnafu, RemoteUnmountSnafu, Result, UnlockSnafu,
    WrongPassphraseSnafu,
};
use crate::remote::{RemoteCommand, Transport};

/// Checks that cryptsetup is installed on the remote host.
///
/// Mirrors a login shell lookup: `command -v`, then `which`, then a
/// privileged `which` for installations restricted to root's PATH.
pub fn verify_cryptsetup<T: Transport>(transport: &T, profile: &Profile) -> Result<()> {
    let command = RemoteCommand::new("command")
        .raw_arg("-v")
        .raw_arg("cryptsetup")
        .or("which")
        .raw_arg("cryptsetup")
        .or("sudo")
        .raw_arg("which")
        .raw_arg("cryptsetup");
    let output = transport.run(profile, &command)?;
    ensure!(output.success(), CryptsetupMissingSnafu);
    Ok(())
}

/// Unlocks the encrypted device into `/dev/mapper/<mapper>`.
///
/// The passphrase is piped to the privilege-elevation prompt and the
/// disk-encryption tool over stdin; a pseudo-terminal is requested so the
/// remote `sudo -S` accepts the piped credential.
pub fn open<T: Transport>(transport: &T, profile: &Profile, passphrase: &str) -> Result<()> {
    let command = RemoteCommand::new("sudo")
        .raw_arg("-S")
        .raw_arg("cryptsetup")
        .raw_arg("luksOpen")
        .arg(&profile.device)
        .arg(&profile.mapper)
        .request_tty()
        .stdin(format!("{passphrase}\n"));
    let output = transport.run(profile, &command)?;
    if output.success() {
        return Ok(());
    }
    ensure!(!is_wrong_key(&output.stderr), WrongPassphraseSnafu);
    UnlockSnafu {
        stderr: output.diagnostic(),
    }
    .fail()
}

/// Mounts the mapped device at the profile's remote mount point and relaxes
/// permissions so every remote user can traverse it.
pub fn mount<T: Transport>(transport: &T, profile: &Profile, passphrase: &str) -> Result<()> {
    let mapper_path = format!("/dev/mapper/{}", profile.mapper);
    let command = RemoteCommand::new("sudo")
        .raw_arg("-S")
        .raw_arg("mkdir")
        .raw_arg("-p")
        .arg(&profile.mount_point)
        .then("sudo")
        .raw_arg("mount")
        .arg(&mapper_path)
        .arg(&profile.mount_point)
        .then("sudo")
        .raw_arg("chmod")
        .raw_arg("-R")
        .raw_arg("777")
        .arg(&profile.mount_point)
        .request_tty()
        .stdin(format!("{passphrase}\n"));
    let output = transport.run(profile, &command)?;
    ensure!(
        output.success(),
        RemoteMountSnafu {
            stderr: output.diagnostic(),
        }
    );
    Ok(())
}

/// Unmounts the remote mount point.
pub fn unmount<T: Transport>(transport: &T, profile: &Profile) -> Result<()> {
    let command = RemoteCommand::new("sudo")
        .raw_arg("umount")
        .arg(&profile.mount_point);
    let output = transport.run(profile, &command)?;
    ensure!(
        output.success(),
        RemoteUnmountSnafu {
            mount_point: profile.mount_point.clone(),
            stderr: output.diagnostic(),
        }
    );
    Ok(())
}

/// Closes the LUKS mapping, locking the volume again.
pub fn close<T: Transport>(transport: &T, profile: &Profile) -> Result<()> {
    let command = RemoteCommand::new("sudo")
        .raw_arg("cryptsetup")
        .raw_arg("luksClose")
        .arg(&profile.mapper);
    let output = transport.run(profile, &command)?;
    ensure!(
        output.success(),
        CloseSnafu {
            mapper: profile.mapper.clone(),
            stderr: output.diagnostic(),
        }
    );
    Ok(())
}

/// Checks cryptsetup output for key-material rejection.
fn is_wrong_key(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no key available")
        || lower.contains("wrong key")
        || lower.contains("passphrase is incorrect")
        || lower.contains("invalid passphrase")
}
