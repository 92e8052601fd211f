//! Interactive prompts for selecting and creating connection profiles.
//!
//! Creation re-prompts until every required field is non-empty; an incomplete
//! profile is never persisted. Secrets are read without echo.

use std::io::{self, Write};

use anyhow::Result;
use remote_vault_core::config::{
    DEFAULT_MAPPER, DEFAULT_MOUNT_POINT, DEFAULT_PORT, Profile, ProfileStore,
};

/// One-line summary of a profile for listings and selection menus.
pub fn describe(profile: &Profile) -> String {
    format!("{} ({}:{})", profile.name, profile.hostname, profile.port)
}

/// Offers the saved profiles for selection, falling back to interactive
/// creation. A newly created profile is validated and saved before use.
pub fn select_or_create(store: &ProfileStore, profiles: &[Profile]) -> Result<Profile> {
    if !profiles.is_empty() {
        println!("\nSaved profiles:");
        for (index, profile) in profiles.iter().enumerate() {
            println!("{}. {}", index + 1, describe(profile));
        }
        println!("\n0. Create new profile");
        let choice = read_line("\nSelect profile (number): ")?;
        if let Some(profile) = parse_selection(&choice, profiles) {
            if confirm(&format!("Use profile '{}'? [Y/n]: ", profile.name))? {
                return Ok(profile.clone());
            }
        }
    }

    println!("\nCreate new profile:");
    let profile = create_profile()?;
    store.save(&profile)?;
    Ok(profile)
}

/// Reads the LUKS passphrase without echoing it.
pub fn read_passphrase() -> Result<String> {
    prompt_secret("Enter LUKS passphrase: ", "Passphrase")
}

fn create_profile() -> Result<Profile> {
    let name = prompt_nonempty("Profile name: ", "Profile name")?;

    println!("\nEnter SSH connection details:");
    let hostname = prompt_nonempty("Hostname/IP: ", "Hostname")?;
    let port = prompt_with_default("Port", DEFAULT_PORT)?;
    let username = prompt_nonempty("Username: ", "Username")?;
    let password = prompt_secret("Password: ", "Password")?;

    println!("\nEnter LUKS volume details:");
    let device = prompt_nonempty("Device (e.g. /dev/sdb1): ", "Device")?;
    let mapper = prompt_with_default("Mapper name", DEFAULT_MAPPER)?;
    let mount_point = prompt_with_default("Mount point", DEFAULT_MOUNT_POINT)?;

    let profile = Profile {
        name,
        hostname,
        port,
        username,
        password,
        device,
        mapper,
        mount_point,
    };
    profile.validate()?;
    Ok(profile)
}

/// Maps a menu answer to a saved profile; `0`, out-of-range, and junk all
/// mean "no selection".
fn parse_selection<'a>(input: &str, profiles: &'a [Profile]) -> Option<&'a Profile> {
    let choice: usize = input.trim().parse().ok()?;
    if (1..=profiles.len()).contains(&choice) {
        Some(&profiles[choice - 1])
    } else {
        None
    }
}

fn prompt_nonempty(prompt: &str, what: &str) -> Result<String> {
    loop {
        let value = read_line(prompt)?;
        let value = value.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
        println!("{what} cannot be empty");
    }
}

fn prompt_secret(prompt: &str, what: &str) -> Result<String> {
    loop {
        let value = rpassword::prompt_password(prompt)?;
        if !value.is_empty() {
            return Ok(value);
        }
        println!("{what} cannot be empty");
    }
}

fn prompt_with_default(label: &str, default: &str) -> Result<String> {
    let value = read_line(&format!("{label} [{default}]: "))?;
    Ok(apply_default(&value, default))
}

fn apply_default(input: &str, default: &str) -> String {
    let input = input.trim();
    if input.is_empty() {
        default.to_string()
    } else {
        input.to_string()
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    let answer = read_line(prompt)?;
    Ok(!answer.trim().to_lowercase().starts_with('n'))
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin().read_line(&mut line)?;
    anyhow::ensure!(read > 0, "input closed");
    Ok(line)
}
