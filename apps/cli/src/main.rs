//! Remote vault CLI - unlock and mount an encrypted remote volume locally.
//!
//! `open` runs the whole workflow: dependency check, profile selection,
//! connect, unlock + mount + bridge, then holds until Enter or Ctrl-C and
//! tears everything down again. An interrupt during the hold means "proceed
//! to teardown", not abrupt termination.

mod prompt;

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::warn;
use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use remote_vault_core::{
    Error as CoreError, Paths, ProfileStore, Session, SshTransport, SshfsBridge, deps,
};

/// Remote vault CLI tool.
#[derive(Parser)]
#[command(name = "remote-vault")]
#[command(about = "Unlock and mount a remote LUKS volume over SSHFS", long_about = None)]
struct Cli {
    /// Configuration root holding the profile store and the default mount dir.
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, unlock, and mount a profile's volume; unmounts on exit.
    Open {
        /// Saved profile name; prompts interactively when omitted.
        profile: Option<String>,

        /// Local mount directory (default: <config dir>/mnt).
        #[arg(long, value_name = "DIR")]
        mount_dir: Option<PathBuf>,

        /// Skip launching a file manager after mounting.
        #[arg(long)]
        no_viewer: bool,
    },
    /// List saved connection profiles.
    Profiles,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = match cli.config_dir {
        Some(dir) => Paths::with_config_dir(dir),
        None => Paths::discover()?,
    };

    match cli.command {
        Commands::Open {
            profile,
            mount_dir,
            no_viewer,
        } => {
            let paths = match mount_dir {
                Some(dir) => paths.with_mount_dir(dir),
                None => paths,
            };
            open(paths, profile, no_viewer)
        }
        Commands::Profiles => list_profiles(&ProfileStore::new(paths.store_path())),
    }
}

fn list_profiles(store: &ProfileStore) -> Result<()> {
    let profiles = store.load_all()?;
    if profiles.is_empty() {
        println!("No saved profiles.");
        return Ok(());
    }
    for profile in &profiles {
        println!("{}", prompt::describe(profile));
    }
    Ok(())
}

fn open(paths: Paths, name: Option<String>, no_viewer: bool) -> Result<()> {
    deps::check_local_dependencies()?;
    paths.ensure_exists()?;

    let store = ProfileStore::new(paths.store_path());
    let profiles = store.load_all()?;
    let profile = match name {
        Some(name) => profiles
            .into_iter()
            .find(|profile| profile.name == name)
            .with_context(|| format!("no saved profile named '{name}'"))?,
        None => prompt::select_or_create(&store, &profiles)?,
    };

    let transport = SshTransport::new();
    let bridge = SshfsBridge::new();

    println!("\nConnecting to remote server...");
    let mut session = Session::connect(&transport, profile, paths.mount_dir.clone())?;

    let passphrase = prompt::read_passphrase()?;
    println!("Mounting LUKS volume...");
    if let Err(err) = session.mount(&transport, &bridge, &passphrase, !no_viewer) {
        session.disconnect(&transport, &bridge);
        return Err(err.into());
    }

    println!("\nSuccessfully mounted!");
    println!("Access files at: {}", session.local_mount().display());

    wait_for_release();

    let report = session.disconnect(&transport, &bridge);
    if report.success() {
        println!("Volume successfully unmounted and locked");
    } else {
        warn!("teardown finished with warnings, see messages above");
    }
    println!("\nOperation completed");
    Ok(())
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Installs a SIGINT handler without SA_RESTART, so the blocking stdin read
/// in the hold state returns with EINTR instead of resuming.
fn install_sigint_handler() {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        let _ = signal::sigaction(Signal::SIGINT, &action);
    }
}

/// Blocks until the user presses Enter or sends an interrupt; both advance
/// the workflow to teardown.
fn wait_for_release() {
    install_sigint_handler();
    println!("\nPress Enter to unmount and disconnect...");

    let mut buf = [0u8; 64];
    loop {
        match io::stdin().lock().read(&mut buf) {
            // EOF or Enter both release the hold.
            Ok(0) => break,
            Ok(read) if buf[..read].contains(&b'\n') => break,
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                if INTERRUPTED.load(Ordering::Relaxed) {
                    println!("\nInterrupt received, unmounting...");
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn report_failure(err: &anyhow::Error) {
    eprintln!("Error: {err:#}");
    if let Some(core) = err.downcast_ref::<CoreError>() {
        for hint in failure_hints(core) {
            eprintln!("{hint}");
        }
    }
}

/// Likely causes printed after a failure, mirroring what each error class
/// usually means in the field.
fn failure_hints(err: &CoreError) -> &'static [&'static str] {
    match err {
        CoreError::MissingDependencies { .. } => deps::INSTALL_HINTS,
        CoreError::PortUnreachable { .. } => &["Check firewall/port forwarding settings"],
        CoreError::AuthenticationFailed { .. } => &[
            "Potential issues:",
            "- Incorrect credentials",
            "- SSH server configuration",
            "- Network restrictions",
        ],
        CoreError::CryptsetupMissing => &["Install with: sudo apt install cryptsetup"],
        CoreError::BridgeTimeout { .. } => &["Operation timed out - check network connection"],
        _ => &[],
    }
}
