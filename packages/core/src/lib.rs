//! remote-vault-core: Core library for mounting remote encrypted volumes.
//!
//! This library drives a remote host over SSH to unlock a LUKS container,
//! mounts the unlocked volume remotely, and bridges it into the local
//! filesystem via SSHFS. All heavy lifting is delegated to external programs
//! invoked as subprocesses; the library contributes the workflow sequencing,
//! the profile store, and failure-path cleanup ordering.
//!
//! # Modules
//!
//! - [`config`]: Connection profiles and the persisted profile store
//! - [`probe`]: TCP reachability pre-check
//! - [`remote`]: Remote command building and execution over ssh
//! - [`vault`]: Remote LUKS open/close and mount/unmount operations
//! - [`bridge`]: Local SSHFS bridge mount and fallback unmount
//! - [`deps`]: Local helper program discovery
//! - [`viewer`]: Best-effort post-mount file manager launch
//! - [`session`]: The connect/mount/unwind/disconnect workflow
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use remote_vault_core::{Paths, Profile, Session, SshTransport, SshfsBridge};
//!
//! let paths = Paths::discover().unwrap();
//! paths.ensure_exists().unwrap();
//!
//! let profile = Profile {
//!     name: "home".into(),
//!     hostname: "203.0.113.5".into(),
//!     port: "2222".into(),
//!     username: "alice".into(),
//!     password: "secret".into(),
//!     device: "/dev/sdb1".into(),
//!     mapper: "vault1".into(),
//!     mount_point: "/mnt/vault".into(),
//! };
//!
//! let transport = SshTransport::new();
//! let bridge = SshfsBridge::new();
//! let mut session = Session::connect(&transport, profile, paths.mount_dir.clone()).unwrap();
//! session.mount(&transport, &bridge, "luks passphrase", true).unwrap();
//! // ... volume is available under paths.mount_dir ...
//! session.disconnect(&transport, &bridge);
//! ```

pub mod bridge;
pub mod config;
pub mod deps;
pub mod error;
pub mod probe;
pub mod remote;
pub mod session;
pub mod vault;
pub mod viewer;

// Re-export commonly used types
pub use bridge::{Bridge, SshfsBridge};
pub use config::{Paths, Profile, ProfileStore};
pub use error::{Error, Result};
pub use remote::{RemoteCommand, RemoteOutput, SshTransport, Transport};
pub use session::{Session, UnwindReport};
