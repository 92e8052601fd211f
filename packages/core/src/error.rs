//! Unified error types for the remote-vault-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to spawn or wait on a local command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Required local helper programs are not installed.
    #[snafu(display("missing required dependencies: {}", tools.join(", ")))]
    MissingDependencies { tools: Vec<String> },

    /// The remote port did not accept a TCP connection within the probe timeout.
    #[snafu(display("port {port} not reachable on {host}"))]
    PortUnreachable { host: String, port: u16 },

    /// The profile carries a port that is not a valid TCP port number.
    #[snafu(display("invalid port number '{port}'"))]
    InvalidPort { port: String },

    /// The remote shell did not echo the expected marker back.
    #[snafu(display("SSH connection failed: {stderr}"))]
    AuthenticationFailed { stderr: String },

    /// cryptsetup is not installed on the remote host.
    #[snafu(display("cryptsetup not found on remote server"))]
    CryptsetupMissing,

    /// cryptsetup rejected the supplied key material.
    #[snafu(display("wrong passphrase or not a LUKS device"))]
    WrongPassphrase,

    /// cryptsetup failed to open the container for a reason other than key material.
    #[snafu(display("failed to unlock LUKS container: {stderr}"))]
    Unlock { stderr: String },

    /// Mounting the mapped device on the remote host failed.
    #[snafu(display("failed to mount volume on remote: {stderr}"))]
    RemoteMount { stderr: String },

    /// Unmounting the remote mount point failed.
    #[snafu(display("failed to unmount remote {mount_point}: {stderr}"))]
    RemoteUnmount { mount_point: String, stderr: String },

    /// Closing the LUKS mapping failed.
    #[snafu(display("failed to close LUKS mapping '{mapper}': {stderr}"))]
    Close { mapper: String, stderr: String },

    /// The local SSHFS mount exited with an error.
    #[snafu(display("SSHFS mount failed: {stderr}"))]
    BridgeMount { stderr: String },

    /// The local SSHFS mount did not complete in time.
    #[snafu(display("SSHFS mount timed out after {secs}s"))]
    BridgeTimeout { secs: u64 },

    /// Every local unmount strategy failed.
    #[snafu(display("could not unmount {}", path.display()))]
    BridgeUnmount { path: PathBuf },

    /// A mount was requested on a session that is not connected.
    #[snafu(display("not connected to SSH server"))]
    NotConnected,

    /// Failed to read the profile store.
    #[snafu(display("failed to read profile store at {}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the profile store.
    #[snafu(display("failed to write profile store at {}", path.display()))]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The profile store is not valid TOML.
    #[snafu(display("failed to parse profile store at {}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A profile could not be rendered back to TOML.
    #[snafu(display("failed to serialize profile '{name}'"))]
    ConfigSerialize {
        name: String,
        source: toml::ser::Error,
    },

    /// A required directory could not be created.
    #[snafu(display("failed to create directory {}", path.display()))]
    DirCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Home directory not found.
    #[snafu(display("could not determine home directory"))]
    HomeDirNotFound,

    /// A profile field that must be non-empty was empty.
    #[snafu(display("{field} cannot be empty"))]
    EmptyField { field: &'static str },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for profile store read errors.
    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for profile store write errors.
    fn config_write_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for directory creation errors.
    fn dir_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(ConfigReadSnafu { path: path.into() })
    }

    fn config_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(ConfigWriteSnafu { path: path.into() })
    }

    fn dir_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(DirCreationSnafu { path: path.into() })
    }
}
