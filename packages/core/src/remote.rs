//! Remote command execution over the system `ssh` client.
//!
//! Commands are assembled through [`RemoteCommand`], which keeps trusted
//! command templates apart from variable arguments: template atoms are added
//! with [`RemoteCommand::raw_arg`], everything that originates from a profile
//! or user input goes through [`RemoteCommand::arg`] and is single-quote
//! escaped before it reaches the remote shell.
//!
//! [`Transport`] is the seam the session workflow talks through; the real
//! implementation, [`SshTransport`], drives `sshpass`/`ssh` as subprocesses.
//! The SSH password travels in the `SSHPASS` environment variable and any
//! per-command credential is piped over stdin, never embedded in argv.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::config::Profile;
use crate::error::{IoResultExt, Result};
use crate::probe;

/// Connection timeout passed to the ssh client.
pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Captured result of one remote invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    /// Process exit code, -1 when terminated by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    /// True when the remote command exited with status zero.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Returns stderr if non-empty, otherwise stdout, trimmed.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Stage {
    chain: Chain,
    argv: Vec<String>,
}

/// Builder for a command line executed on the remote host.
///
/// Stages chained with [`then`](Self::then) are joined with `&&`, stages
/// chained with [`or`](Self::or) with `||`.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    stages: Vec<Stage>,
    request_tty: bool,
    stdin: Option<Vec<u8>>,
}

impl RemoteCommand {
    /// Starts a command with a trusted program name.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            stages: vec![Stage {
                chain: Chain::And,
                argv: vec![program.into()],
            }],
            request_tty: false,
            stdin: None,
        }
    }

    /// Appends a variable argument; it is shell-quoted on render.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.push_arg(shell_quote(arg.as_ref()));
        self
    }

    /// Appends a trusted template atom verbatim (flags, fixed operands).
    pub fn raw_arg(mut self, arg: impl Into<String>) -> Self {
        self.push_arg(arg.into());
        self
    }

    /// Starts a new stage executed only if the previous stages succeeded.
    pub fn then(mut self, program: impl Into<String>) -> Self {
        self.stages.push(Stage {
            chain: Chain::And,
            argv: vec![program.into()],
        });
        self
    }

    /// Starts a new stage executed only if the previous stages failed.
    pub fn or(mut self, program: impl Into<String>) -> Self {
        self.stages.push(Stage {
            chain: Chain::Or,
            argv: vec![program.into()],
        });
        self
    }

    /// Requests a pseudo-terminal for the remote side.
    ///
    /// Needed when a privilege-elevation prompt is answered over piped input.
    pub fn request_tty(mut self) -> Self {
        self.request_tty = true;
        self
    }

    /// Pipes `payload` to the remote command's standard input.
    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Whether a pseudo-terminal was requested.
    pub fn wants_tty(&self) -> bool {
        self.request_tty
    }

    /// The payload to pipe to the remote command, if any.
    pub fn stdin_payload(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Renders the full remote command line.
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if index > 0 {
                rendered.push_str(match stage.chain {
                    Chain::And => " && ",
                    Chain::Or => " || ",
                });
            }
            rendered.push_str(&stage.argv.join(" "));
        }
        rendered
    }

    fn push_arg(&mut self, arg: String) {
        if let Some(stage) = self.stages.last_mut() {
            stage.argv.push(arg);
        }
    }
}

/// Quotes an argument for safe embedding in a remote shell command line.
///
/// Plain path-like arguments pass through untouched; anything else is
/// wrapped in single quotes with embedded quotes escaped as `'\''`.
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Executes commands on the remote host described by a profile.
pub trait Transport {
    /// Fast TCP pre-check; the default delegates to the probe module.
    fn reachable(&self, host: &str, port: u16, timeout: Duration) -> bool {
        probe::is_reachable(host, port, timeout)
    }

    /// Runs `command` on the remote host, blocking until it finishes.
    fn run(&self, profile: &Profile, command: &RemoteCommand) -> Result<RemoteOutput>;
}

/// Transport backed by the system `sshpass` and `ssh` binaries.
#[derive(Debug, Clone)]
pub struct SshTransport {
    connect_timeout: Duration,
}

impl SshTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: SSH_CONNECT_TIMEOUT,
        }
    }

    /// Arguments passed to `sshpass`, excluding the program itself.
    fn ssh_argv(&self, profile: &Profile, command: &RemoteCommand) -> Vec<String> {
        let mut argv = vec![
            "-e".to_string(),
            "ssh".to_string(),
            "-p".to_string(),
            profile.port.clone(),
        ];
        if command.wants_tty() {
            argv.push("-t".to_string());
        }
        argv.push("-o".to_string());
        argv.push("StrictHostKeyChecking=no".to_string());
        argv.push("-o".to_string());
        argv.push(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        argv.push(profile.remote_target());
        argv.push(command.render());
        argv
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SshTransport {
    fn run(&self, profile: &Profile, command: &RemoteCommand) -> Result<RemoteOutput> {
        let mut child = Command::new("sshpass")
            .args(self.ssh_argv(profile, command))
            .env("SSHPASS", &profile.password)
            .stdin(if command.stdin_payload().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .command_context("sshpass ssh")?;

        if let Some(payload) = command.stdin_payload() {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload).command_context("sshpass ssh")?;
            }
        }

        let output = child.wait_with_output().command_context("sshpass ssh")?;
        Ok(RemoteOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
