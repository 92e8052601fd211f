//! Session workflow: connect, mount, unwind, disconnect.
//!
//! A session is an explicit value handed to every workflow step; there is no
//! ambient process-wide state. The workflow is strictly sequential: every
//! remote operation is a blocking round-trip, and exactly one session exists
//! at a time.
//!
//! Forward steps are gated on the previous step's success and roll back only
//! what already completed. Teardown is the opposite: every unwind sub-step
//! runs regardless of earlier failures, and the session always ends
//! unmounted.

use std::path::{Path, PathBuf};

use log::{info, warn};
use snafu::OptionExt;

use crate::bridge::Bridge;
use crate::config::Profile;
use crate::error::{
    AuthenticationFailedSnafu, InvalidPortSnafu, NotConnectedSnafu, PortUnreachableSnafu, Result,
};
use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::remote::{RemoteCommand, Transport};
use crate::vault;
use crate::viewer;

/// Marker echoed through the remote shell to validate authentication.
const AUTH_MARKER: &str = "CONNECTION_TEST_SUCCESS";

/// One active connection to a remote vault.
///
/// Invariant: `mounted` implies `connected`. The profile is owned by the
/// session for its whole lifetime and released on disconnect.
#[derive(Debug)]
pub struct Session {
    profile: Profile,
    local_mount: PathBuf,
    connected: bool,
    mounted: bool,
}

/// Per-step outcome of a teardown pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindReport {
    /// The local bridge mount was removed.
    pub bridge_unmounted: bool,
    /// The remote mount point was unmounted.
    pub remote_unmounted: bool,
    /// The LUKS mapping was closed.
    pub locked: bool,
}

impl UnwindReport {
    /// Report for a teardown with nothing to tear down.
    fn clean() -> Self {
        Self {
            bridge_unmounted: true,
            remote_unmounted: true,
            locked: true,
        }
    }

    /// True when every sub-step succeeded.
    pub fn success(&self) -> bool {
        self.bridge_unmounted && self.remote_unmounted && self.locked
    }
}

impl Session {
    /// Establishes a session: reachability pre-check, authentication check,
    /// remote tool check.
    ///
    /// Any failure returns an error and retains nothing; a returned session
    /// is always connected.
    pub fn connect<T: Transport>(
        transport: &T,
        profile: Profile,
        local_mount: PathBuf,
    ) -> Result<Self> {
        let port = profile.port_number().context(InvalidPortSnafu {
            port: profile.port.clone(),
        })?;
        snafu::ensure!(
            transport.reachable(&profile.hostname, port, DEFAULT_PROBE_TIMEOUT),
            PortUnreachableSnafu {
                host: profile.hostname.clone(),
                port,
            }
        );

        let echo = RemoteCommand::new("echo").arg(AUTH_MARKER);
        let output = transport.run(&profile, &echo)?;
        snafu::ensure!(
            output.stdout.contains(AUTH_MARKER),
            AuthenticationFailedSnafu {
                stderr: output.diagnostic(),
            }
        );

        vault::verify_cryptsetup(transport, &profile)?;

        info!("connected to {}", profile.remote_target());
        Ok(Self {
            profile,
            local_mount,
            connected: true,
            mounted: false,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn local_mount(&self) -> &Path {
        &self.local_mount
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Unlocks, mounts remotely, and bridges locally.
    ///
    /// Three gated sub-steps; a failure rolls back exactly the sub-steps that
    /// already completed and leaves the session connected but unmounted. On
    /// success the post-mount viewer launch runs best-effort when
    /// `open_viewer` is set.
    pub fn mount<T: Transport, B: Bridge>(
        &mut self,
        transport: &T,
        bridge: &B,
        passphrase: &str,
        open_viewer: bool,
    ) -> Result<()> {
        snafu::ensure!(self.connected, NotConnectedSnafu);

        info!("[1/3] unlocking LUKS container {}", self.profile.mapper);
        vault::open(transport, &self.profile, passphrase)?;

        info!(
            "[2/3] mounting volume on remote at {}",
            self.profile.mount_point
        );
        if let Err(err) = vault::mount(transport, &self.profile, passphrase) {
            if let Err(close_err) = vault::close(transport, &self.profile) {
                warn!("rollback failed: {close_err}");
            }
            return Err(err);
        }

        info!(
            "[3/3] mounting locally via SSHFS at {}",
            self.local_mount.display()
        );
        if let Err(err) = bridge.mount(&self.profile, &self.local_mount) {
            if let Err(unmount_err) = vault::unmount(transport, &self.profile) {
                warn!("rollback failed: {unmount_err}");
            }
            if let Err(close_err) = vault::close(transport, &self.profile) {
                warn!("rollback failed: {close_err}");
            }
            return Err(err);
        }

        self.mounted = true;
        if open_viewer {
            viewer::launch_file_manager(&self.local_mount);
        }
        Ok(())
    }

    /// Tears down bridge mount, remote mount, and LUKS mapping.
    ///
    /// Every sub-step is attempted regardless of earlier failures; failures
    /// are downgraded to warnings. The session is unmounted afterwards no
    /// matter what.
    pub fn unwind<T: Transport, B: Bridge>(&mut self, transport: &T, bridge: &B) -> UnwindReport {
        if !self.mounted {
            return UnwindReport::clean();
        }

        info!("[1/3] unmounting SSHFS at {}", self.local_mount.display());
        let bridge_unmounted = match bridge.unmount(&self.local_mount) {
            Ok(()) => true,
            Err(err) => {
                warn!("{err}");
                warn!(
                    "try manually: sudo umount -f {}",
                    self.local_mount.display()
                );
                false
            }
        };

        info!(
            "[2/3] unmounting remote volume at {}",
            self.profile.mount_point
        );
        let remote_unmounted = match vault::unmount(transport, &self.profile) {
            Ok(()) => true,
            Err(err) => {
                warn!("{err}");
                false
            }
        };

        info!("[3/3] locking LUKS container {}", self.profile.mapper);
        let locked = match vault::close(transport, &self.profile) {
            Ok(()) => true,
            Err(err) => {
                warn!("{err}");
                false
            }
        };

        self.mounted = false;
        UnwindReport {
            bridge_unmounted,
            remote_unmounted,
            locked,
        }
    }

    /// Ends the session, unwinding first when mounted.
    ///
    /// Consumes the session; the profile and its credential are dropped with
    /// it.
    pub fn disconnect<T: Transport, B: Bridge>(
        mut self,
        transport: &T,
        bridge: &B,
    ) -> UnwindReport {
        let report = if self.mounted {
            self.unwind(transport, bridge)
        } else {
            UnwindReport::clean()
        };
        self.connected = false;
        info!("disconnected from {}", self.profile.remote_target());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeMountSnafu, BridgeUnmountSnafu, Error};
    use crate::remote::RemoteOutput;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn sample_profile() -> Profile {
        Profile {
            name: "home".to_string(),
            hostname: "203.0.113.5".to_string(),
            port: "2222".to_string(),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            device: "/dev/sdb1".to_string(),
            mapper: "vault1".to_string(),
            mount_point: "/mnt/vault".to_string(),
        }
    }

    fn local_mount() -> PathBuf {
        PathBuf::from("/tmp/remote-vault-test/mnt")
    }

    /// Transport scripted through per-operation switches, recording every
    /// rendered command.
    #[derive(Clone)]
    struct ScriptedTransport {
        reachable: bool,
        auth_ok: bool,
        cryptsetup_present: bool,
        unlock_ok: bool,
        remote_mount_ok: bool,
        remote_unmount_ok: bool,
        close_ok: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedTransport {
        fn healthy() -> Self {
            Self {
                reachable: true,
                auth_ok: true,
                cryptsetup_present: true,
                unlock_ok: true,
                remote_mount_ok: true,
                remote_unmount_ok: true,
                close_ok: true,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn reachable(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
            self.reachable
        }

        fn run(&self, _profile: &Profile, command: &RemoteCommand) -> Result<RemoteOutput> {
            let rendered = command.render();
            self.calls.lock().unwrap().push(rendered.clone());

            let outcome = |ok: bool, stdout: &str, stderr: &str| {
                Ok(RemoteOutput {
                    status: if ok { 0 } else { 1 },
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                })
            };

            if rendered.starts_with("echo") {
                return outcome(true, if self.auth_ok { AUTH_MARKER } else { "" }, "");
            }
            if rendered.starts_with("command -v cryptsetup") {
                return outcome(self.cryptsetup_present, "", "");
            }
            if rendered.contains("luksOpen") {
                let stderr = if self.unlock_ok {
                    ""
                } else {
                    "No key available with this passphrase."
                };
                return outcome(self.unlock_ok, "", stderr);
            }
            if rendered.contains("mkdir") {
                return outcome(self.remote_mount_ok, "", "mount: special device missing");
            }
            if rendered.contains("luksClose") {
                return outcome(self.close_ok, "", "");
            }
            if rendered.starts_with("sudo umount") {
                return outcome(self.remote_unmount_ok, "", "");
            }
            outcome(true, "", "")
        }
    }

    /// Bridge with switchable outcomes and call recording.
    #[derive(Clone)]
    struct FakeBridge {
        mount_ok: bool,
        unmount_ok: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeBridge {
        fn healthy() -> Self {
            Self {
                mount_ok: true,
                unmount_ok: true,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Bridge for FakeBridge {
        fn mount(&self, _profile: &Profile, local_dir: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("mount {}", local_dir.display()));
            if self.mount_ok {
                Ok(())
            } else {
                BridgeMountSnafu {
                    stderr: "read: Connection reset by peer".to_string(),
                }
                .fail()
            }
        }

        fn unmount(&self, local_dir: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("unmount {}", local_dir.display()));
            if self.unmount_ok {
                Ok(())
            } else {
                BridgeUnmountSnafu {
                    path: local_dir.to_path_buf(),
                }
                .fail()
            }
        }
    }

    fn connected(transport: &ScriptedTransport) -> Session {
        Session::connect(transport, sample_profile(), local_mount()).unwrap()
    }

    fn mounted(transport: &ScriptedTransport, bridge: &FakeBridge) -> Session {
        let mut session = connected(transport);
        session.mount(transport, bridge, "sekrit", false).unwrap();
        session
    }

    #[test]
    fn test_connect_succeeds_with_healthy_remote() {
        let transport = ScriptedTransport::healthy();
        let session = connected(&transport);

        assert!(session.is_connected());
        assert!(!session.is_mounted());
        assert_eq!(session.profile().name, "home");
    }

    #[test]
    fn test_connect_unreachable_port_short_circuits() {
        let transport = ScriptedTransport {
            reachable: false,
            ..ScriptedTransport::healthy()
        };

        let err =
            Session::connect(&transport, sample_profile(), local_mount()).unwrap_err();
        assert!(matches!(err, Error::PortUnreachable { port: 2222, .. }));
        // No authentication attempt was made.
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_connect_rejects_invalid_port() {
        let transport = ScriptedTransport::healthy();
        let mut profile = sample_profile();
        profile.port = "twenty-two".to_string();

        let err = Session::connect(&transport, profile, local_mount()).unwrap_err();
        assert!(matches!(err, Error::InvalidPort { .. }));
    }

    #[test]
    fn test_connect_missing_auth_marker_fails() {
        let transport = ScriptedTransport {
            auth_ok: false,
            ..ScriptedTransport::healthy()
        };

        let err =
            Session::connect(&transport, sample_profile(), local_mount()).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed { .. }));
        // The tool check never ran.
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_connect_missing_cryptsetup_fails() {
        let transport = ScriptedTransport {
            cryptsetup_present: false,
            ..ScriptedTransport::healthy()
        };

        let err =
            Session::connect(&transport, sample_profile(), local_mount()).unwrap_err();
        assert!(matches!(err, Error::CryptsetupMissing));
    }

    #[test]
    fn test_unlock_failure_leaves_remote_untouched() {
        let transport = ScriptedTransport {
            unlock_ok: false,
            ..ScriptedTransport::healthy()
        };
        let bridge = FakeBridge::healthy();
        let mut session = connected(&transport);

        let err = session
            .mount(&transport, &bridge, "sekrit", false)
            .unwrap_err();
        assert!(matches!(err, Error::WrongPassphrase));
        assert!(!session.is_mounted());

        let calls = transport.calls();
        // Unlock was the last remote call: no mount attempt, no compensation.
        assert!(calls.last().unwrap().contains("luksOpen"));
        assert!(!calls.iter().any(|call| call.contains("mkdir")));
        assert!(!calls.iter().any(|call| call.contains("luksClose")));
        assert!(bridge.calls().is_empty());
    }

    #[test]
    fn test_remote_mount_failure_closes_mapping_once() {
        let transport = ScriptedTransport {
            remote_mount_ok: false,
            ..ScriptedTransport::healthy()
        };
        let bridge = FakeBridge::healthy();
        let mut session = connected(&transport);

        let err = session
            .mount(&transport, &bridge, "sekrit", false)
            .unwrap_err();
        assert!(matches!(err, Error::RemoteMount { .. }));

        let calls = transport.calls();
        let closes = calls.iter().filter(|c| c.contains("luksClose")).count();
        assert_eq!(closes, 1);
        assert!(!calls.iter().any(|call| call.starts_with("sudo umount")));
        assert!(bridge.calls().is_empty());
    }

    #[test]
    fn test_bridge_failure_rolls_back_unmount_then_close() {
        let transport = ScriptedTransport::healthy();
        let bridge = FakeBridge {
            mount_ok: false,
            ..FakeBridge::healthy()
        };
        let mut session = connected(&transport);

        let err = session
            .mount(&transport, &bridge, "sekrit", false)
            .unwrap_err();
        assert!(matches!(err, Error::BridgeMount { .. }));
        assert!(!session.is_mounted());

        let calls = transport.calls();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(tail[0], "sudo umount /mnt/vault");
        assert_eq!(tail[1], "sudo cryptsetup luksClose vault1");
    }

    #[test]
    fn test_mount_success_sets_mounted() {
        let transport = ScriptedTransport::healthy();
        let bridge = FakeBridge::healthy();
        let session = mounted(&transport, &bridge);

        assert!(session.is_mounted());
        assert_eq!(
            bridge.calls(),
            vec![format!("mount {}", local_mount().display())]
        );
    }

    #[test]
    fn test_unwind_attempts_every_step_despite_failures() {
        let transport = ScriptedTransport {
            remote_unmount_ok: false,
            close_ok: false,
            ..ScriptedTransport::healthy()
        };
        let bridge = FakeBridge {
            unmount_ok: false,
            ..FakeBridge::healthy()
        };
        let mut session = mounted(&transport, &bridge);

        let report = session.unwind(&transport, &bridge);
        assert!(!report.bridge_unmounted);
        assert!(!report.remote_unmounted);
        assert!(!report.locked);
        assert!(!report.success());
        // Final state is unmounted even though every step failed.
        assert!(!session.is_mounted());

        assert!(bridge.calls().iter().any(|c| c.starts_with("unmount")));
        let calls = transport.calls();
        assert!(calls.iter().any(|c| c.starts_with("sudo umount")));
        assert!(calls.iter().any(|c| c.contains("luksClose")));
    }

    #[test]
    fn test_unwind_clean_run_reports_success() {
        let transport = ScriptedTransport::healthy();
        let bridge = FakeBridge::healthy();
        let mut session = mounted(&transport, &bridge);

        let report = session.unwind(&transport, &bridge);
        assert!(report.success());
        assert!(!session.is_mounted());
        assert!(session.is_connected());
    }

    #[test]
    fn test_disconnect_unwinds_when_mounted() {
        let transport = ScriptedTransport::healthy();
        let bridge = FakeBridge::healthy();
        let session = mounted(&transport, &bridge);

        let report = session.disconnect(&transport, &bridge);
        assert!(report.success());
        assert!(bridge.calls().iter().any(|c| c.starts_with("unmount")));
    }

    #[test]
    fn test_full_session_lifecycle() {
        let transport = ScriptedTransport::healthy();
        let bridge = FakeBridge::healthy();

        let mut session =
            Session::connect(&transport, sample_profile(), local_mount()).unwrap();
        assert!(session.is_connected());

        session.mount(&transport, &bridge, "sekrit", false).unwrap();
        assert!(session.is_mounted());

        let report = session.unwind(&transport, &bridge);
        assert!(report.success());
        assert!(!session.is_mounted());
        assert!(session.is_connected());

        let report = session.disconnect(&transport, &bridge);
        assert!(report.success());
    }
}
