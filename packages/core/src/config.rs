//! Profile store and filesystem layout.
//!
//! Connection profiles are persisted under the configuration root as a TOML
//! document with one table per profile, keyed by profile name. Saving merges
//! into the existing document (read-modify-write) so unrelated profiles are
//! preserved; there is no locking, concurrent writers are not supported.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

use crate::error::{
    ConfigParseSnafu, ConfigSerializeSnafu, EmptyFieldSnafu, HomeDirNotFoundSnafu, IoResultExt,
    Result,
};

/// File name of the profile store inside the configuration root.
pub const STORE_FILE_NAME: &str = "profiles.toml";

/// Directory name of the configuration root under the home directory.
pub const DEFAULT_CONFIG_DIR_NAME: &str = ".remote-vault";

/// Default SSH port offered when creating a profile.
pub const DEFAULT_PORT: &str = "22";

/// Default mapper name offered when creating a profile.
pub const DEFAULT_MAPPER: &str = "encrypted_vault";

/// Default remote mount point offered when creating a profile.
pub const DEFAULT_MOUNT_POINT: &str = "/mnt/encrypted";

/// A named bundle of remote-connection and volume parameters.
///
/// Profiles are immutable once loaded; re-saving under the same name
/// overwrites the stored table. Fields missing from the store deserialize to
/// empty strings and surface downstream, they are not validated on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name; the store's table key, not persisted as a field.
    #[serde(skip)]
    pub name: String,
    /// Remote host address.
    #[serde(default)]
    pub hostname: String,
    /// SSH port, kept as text the way it is entered and passed to tools.
    #[serde(default)]
    pub port: String,
    /// Remote login user.
    #[serde(default)]
    pub username: String,
    /// SSH password, plaintext at rest.
    #[serde(default)]
    pub password: String,
    /// Encrypted block device path on the remote host (e.g. /dev/sdb1).
    #[serde(default)]
    pub device: String,
    /// Mapper name assigned to the unlocked device.
    #[serde(default)]
    pub mapper: String,
    /// Mount point for the unlocked volume on the remote host.
    #[serde(default)]
    pub mount_point: String,
}

impl Profile {
    /// Checks that every field a session needs is present.
    ///
    /// Called before persisting a newly created profile; never called on
    /// loaded profiles.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("profile name", &self.name),
            ("hostname", &self.hostname),
            ("port", &self.port),
            ("username", &self.username),
            ("password", &self.password),
            ("device", &self.device),
            ("mapper", &self.mapper),
            ("mount point", &self.mount_point),
        ] {
            snafu::ensure!(!value.trim().is_empty(), EmptyFieldSnafu { field });
        }
        Ok(())
    }

    /// Returns the `user@host` target string used by ssh and sshfs.
    pub fn remote_target(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }

    /// Parses the port field into a TCP port number.
    pub fn port_number(&self) -> Option<u16> {
        self.port.trim().parse().ok()
    }
}

/// Filesystem layout for the configuration root and the local mount directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory holding the profile store.
    pub config_dir: PathBuf,
    /// Local directory the bridge mounts into.
    pub mount_dir: PathBuf,
}

impl Paths {
    /// Resolves the default layout under the user's home directory.
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir().context(HomeDirNotFoundSnafu)?;
        Ok(Self::with_config_dir(home.join(DEFAULT_CONFIG_DIR_NAME)))
    }

    /// Uses an explicit configuration root; the mount directory defaults to
    /// `mnt` beneath it.
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        let mount_dir = config_dir.join("mnt");
        Self {
            config_dir,
            mount_dir,
        }
    }

    /// Overrides the local mount directory.
    pub fn with_mount_dir(mut self, mount_dir: PathBuf) -> Self {
        self.mount_dir = mount_dir;
        self
    }

    /// Creates the configuration root and mount directory if absent.
    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.config_dir).dir_context(&self.config_dir)?;
        fs::create_dir_all(&self.mount_dir).dir_context(&self.mount_dir)?;
        Ok(())
    }

    /// Path of the profile store file.
    pub fn store_path(&self) -> PathBuf {
        self.config_dir.join(STORE_FILE_NAME)
    }
}

/// Persisted collection of connection profiles.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Opens a store at an explicit path. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every stored profile, sorted by name.
    ///
    /// An absent store yields an empty list.
    pub fn load_all(&self) -> Result<Vec<Profile>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).config_read_context(&self.path)?;
        let tables: BTreeMap<String, Profile> =
            toml::from_str(&content).context(ConfigParseSnafu {
                path: self.path.clone(),
            })?;
        Ok(tables
            .into_iter()
            .map(|(name, mut profile)| {
                profile.name = name;
                profile
            })
            .collect())
    }

    /// Saves a profile under its name, overwriting any existing table with
    /// that name and preserving all other tables.
    pub fn save(&self, profile: &Profile) -> Result<()> {
        let mut document = if self.path.exists() {
            let content = fs::read_to_string(&self.path).config_read_context(&self.path)?;
            content.parse::<toml::Table>().context(ConfigParseSnafu {
                path: self.path.clone(),
            })?
        } else {
            toml::Table::new()
        };

        let table = toml::Value::try_from(profile).context(ConfigSerializeSnafu {
            name: profile.name.clone(),
        })?;
        document.insert(profile.name.clone(), table);

        let rendered = toml::to_string_pretty(&document).context(ConfigSerializeSnafu {
            name: profile.name.clone(),
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).dir_context(parent)?;
        }
        fs::write(&self.path, rendered).config_write_context(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

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

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join(STORE_FILE_NAME));
        let profile = sample_profile();

        store.save(&profile).unwrap();
        let loaded = store.load_all().unwrap();

        assert_eq!(loaded, vec![profile]);
    }

    #[test]
    fn test_load_absent_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join(STORE_FILE_NAME));

        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_save_preserves_other_profiles() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join(STORE_FILE_NAME));

        let mut first = sample_profile();
        store.save(&first).unwrap();

        let mut second = sample_profile();
        second.name = "office".to_string();
        second.hostname = "198.51.100.7".to_string();
        store.save(&second).unwrap();

        // Overwrite-by-name must not clobber the other table.
        first.password = "rotated".to_string();
        store.save(&first).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "home");
        assert_eq!(loaded[0].password, "rotated");
        assert_eq!(loaded[1].name, "office");
        assert_eq!(loaded[1].hostname, "198.51.100.7");
    }

    #[test]
    fn test_load_defaults_missing_fields_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STORE_FILE_NAME);
        std::fs::write(&path, "[partial]\nhostname = \"203.0.113.5\"\n").unwrap();

        let loaded = ProfileStore::new(&path).load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "partial");
        assert_eq!(loaded[0].hostname, "203.0.113.5");
        assert_eq!(loaded[0].username, "");
        assert_eq!(loaded[0].mapper, "");
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut profile = sample_profile();
        profile.device = String::new();

        match profile.validate() {
            Err(Error::EmptyField { field }) => assert_eq!(field, "device"),
            other => panic!("expected EmptyField error, got {:?}", other),
        }

        assert!(sample_profile().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_whitespace_only_fields() {
        let mut profile = sample_profile();
        profile.username = "   ".to_string();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_port_number_parsing() {
        let mut profile = sample_profile();
        assert_eq!(profile.port_number(), Some(2222));

        profile.port = "not-a-port".to_string();
        assert_eq!(profile.port_number(), None);
    }

    #[test]
    fn test_remote_target() {
        assert_eq!(sample_profile().remote_target(), "alice@203.0.113.5");
    }

    #[test]
    fn test_paths_layout() {
        let paths = Paths::with_config_dir(PathBuf::from("/tmp/vault-test"));
        assert_eq!(paths.mount_dir, PathBuf::from("/tmp/vault-test/mnt"));
        assert_eq!(
            paths.store_path(),
            PathBuf::from("/tmp/vault-test").join(STORE_FILE_NAME)
        );

        let paths = paths.with_mount_dir(PathBuf::from("/tmp/elsewhere"));
        assert_eq!(paths.mount_dir, PathBuf::from("/tmp/elsewhere"));
    }
}
