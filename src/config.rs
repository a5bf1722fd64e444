//! Settings and the persisted key-value store behind them.
//!
//! Settings are layered with `figment`: built-in defaults, then the TOML file,
//! then `RAMSYNC_*` environment variables, then command-line overrides.
//!
//! The sync root and the auto-create flag are user choices that change at
//! runtime, so they are read through a [`ConfigStore`] rather than from a
//! loaded `AppConfig` snapshot.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result, anyhow};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::models::Disk;
use crate::core::paths::DEFAULT_VOLUMES_ROOT;
use crate::core::transfer_engine::TransferEngineType;
use crate::core::transfer_engine::rsync::DEFAULT_RSYNC_PATH;

pub const ENV_PREFIX: &str = "RAMSYNC_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Folder under which every disk gets its backup folder. Empty means unset.
    pub sync_root: String,
    /// Recreate the remembered disks on launch.
    pub auto_create_disks: bool,
    pub volumes_root: PathBuf,
    pub rsync_path: PathBuf,
    pub transfer_engine: TransferEngineType,
    /// Create a missing backup folder instead of skipping the disk.
    pub create_backup_folders: bool,
    pub disks: Vec<Disk>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sync_root: String::new(),
            auto_create_disks: false,
            volumes_root: PathBuf::from(DEFAULT_VOLUMES_ROOT),
            rsync_path: PathBuf::from(DEFAULT_RSYNC_PATH),
            transfer_engine: TransferEngineType::Rsync,
            create_backup_folders: false,
            disks: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load settings from `path` (which may not exist), the environment, and
    /// optional overrides serialized from the command line.
    pub fn load<T: Serialize>(path: &Path, overrides: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        debug!(path = %path.display(), engine = ?config.transfer_engine, "Configuration loaded");
        Ok(config)
    }
}

/// `$XDG_CONFIG_HOME/ramsync/config.toml`, falling back to `~/.config`.
pub fn default_config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("ramsync").join("config.toml")
}

/// The user's persisted choices.
///
/// The sync engine only reads [`sync_root`](Self::sync_root); the setters
/// exist for front-ends.
pub trait ConfigStore: Send + Sync {
    /// Configured sync root, or an empty string when unset.
    fn sync_root(&self) -> String;

    fn set_sync_root(&self, root: &str) -> Result<()>;

    fn auto_create_disks(&self) -> bool;

    fn set_auto_create_disks(&self, enabled: bool) -> Result<()>;
}

/// Store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryConfigStore {
    sync_root: RwLock<String>,
    auto_create_disks: RwLock<bool>,
}

impl MemoryConfigStore {
    pub fn new(sync_root: impl Into<String>) -> Self {
        Self {
            sync_root: RwLock::new(sync_root.into()),
            auto_create_disks: RwLock::new(false),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn sync_root(&self) -> String {
        self.sync_root
            .read()
            .map(|root| root.clone())
            .unwrap_or_default()
    }

    fn set_sync_root(&self, root: &str) -> Result<()> {
        let mut guard = self
            .sync_root
            .write()
            .map_err(|_| anyhow!("sync root lock poisoned"))?;
        *guard = root.to_string();
        Ok(())
    }

    fn auto_create_disks(&self) -> bool {
        self.auto_create_disks.read().map(|v| *v).unwrap_or(false)
    }

    fn set_auto_create_disks(&self, enabled: bool) -> Result<()> {
        let mut guard = self
            .auto_create_disks
            .write()
            .map_err(|_| anyhow!("auto-create lock poisoned"))?;
        *guard = enabled;
        Ok(())
    }
}

/// Store backed by the TOML settings file.
///
/// Reads come from the settings loaded at startup. A change rewrites only the
/// key it touches in the file, so values that came from `RAMSYNC_*` variables
/// or command-line overrides never end up saved.
pub struct TomlConfigStore {
    path: PathBuf,
    config: RwLock<AppConfig>,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(
        &self,
        key: &str,
        value: toml::Value,
        apply: impl FnOnce(&mut AppConfig),
    ) -> Result<()> {
        let mut config = self
            .config
            .write()
            .map_err(|_| anyhow!("configuration lock poisoned"))?;

        let mut file = self.read_file()?;
        file.insert(key.to_string(), value);
        self.write_file(&file)?;

        apply(&mut config);
        Ok(())
    }

    /// The file's own contents, without defaults or environment values.
    fn read_file(&self) -> Result<toml::Table> {
        if !self.path.exists() {
            return Ok(toml::Table::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file {}", self.path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", self.path.display()))
    }

    fn write_file(&self, file: &toml::Table) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(file).context("Failed to serialize config")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config file {}", self.path.display()))?;

        info!(path = %self.path.display(), "Configuration saved");
        Ok(())
    }
}

impl ConfigStore for TomlConfigStore {
    fn sync_root(&self) -> String {
        self.config
            .read()
            .map(|c| c.sync_root.clone())
            .unwrap_or_default()
    }

    fn set_sync_root(&self, root: &str) -> Result<()> {
        self.update("sync_root", toml::Value::from(root), |c| {
            c.sync_root = root.to_string()
        })
    }

    fn auto_create_disks(&self) -> bool {
        self.config
            .read()
            .map(|c| c.auto_create_disks)
            .unwrap_or(false)
    }

    fn set_auto_create_disks(&self, enabled: bool) -> Result<()> {
        self.update("auto_create_disks", toml::Value::from(enabled), |c| {
            c.auto_create_disks = enabled
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use tempfile::tempdir;

    // Every test that loads settings runs in a `Jail`, which serializes them
    // and restores any environment variable a test sets.

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("absent.toml");
            let config = AppConfig::load(&path, None::<&AppConfig>).unwrap();

            assert_eq!(config.volumes_root, PathBuf::from("/Volumes"));
            assert_eq!(config.rsync_path, PathBuf::from("/usr/bin/rsync"));
            assert_eq!(config.transfer_engine, TransferEngineType::Rsync);
            assert!(!config.create_backup_folders);
            assert!(config.disks.is_empty());
            Ok(())
        });
    }

    #[test]
    fn file_values_are_loaded() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
transfer_engine = "simulated"
volumes_root = "/mnt"

[[disks]]
name = "Scratch"
volume_name = "Scratch"
capacity = 1073741824

[[disks]]
name = "Unmounted"
"#,
            )?;

            let config =
                AppConfig::load(&jail.directory().join("config.toml"), None::<&AppConfig>).unwrap();
            assert_eq!(config.transfer_engine, TransferEngineType::Simulated);
            assert_eq!(config.volumes_root, PathBuf::from("/mnt"));
            assert_eq!(config.disks.len(), 2);
            assert_eq!(config.disks[0].volume_name.as_deref(), Some("Scratch"));
            assert_eq!(config.disks[1].volume_name, None);
            assert_eq!(config.disks[1].capacity, 0);
            Ok(())
        });
    }

    #[test]
    fn environment_and_overrides_layer_over_file() {
        #[derive(Serialize)]
        struct Overrides {
            transfer_engine: TransferEngineType,
        }

        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "transfer_engine = \"rsync\"\nvolumes_root = \"/mnt\"\n")?;
            jail.set_env("RAMSYNC_VOLUMES_ROOT", "/media");

            let overrides = Overrides {
                transfer_engine: TransferEngineType::Simulated,
            };
            let config =
                AppConfig::load(&jail.directory().join("config.toml"), Some(&overrides)).unwrap();
            assert_eq!(config.transfer_engine, TransferEngineType::Simulated);
            assert_eq!(config.volumes_root, PathBuf::from("/media"));
            Ok(())
        });
    }

    #[test]
    fn toml_store_persists_changes() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested").join("config.toml");
            let store = TomlConfigStore::new(&path, AppConfig::default());

            assert_eq!(store.sync_root(), "");
            store.set_sync_root("/tmp/sync").unwrap();
            store.set_auto_create_disks(true).unwrap();

            assert_eq!(store.sync_root(), "/tmp/sync");
            assert!(store.auto_create_disks());

            let reloaded = AppConfig::load(&path, None::<&AppConfig>).unwrap();
            assert_eq!(reloaded.sync_root, "/tmp/sync");
            assert!(reloaded.auto_create_disks);
            Ok(())
        });
    }

    #[test]
    fn saving_keeps_environment_values_out_of_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "transfer_engine = \"simulated\"\n\n[[disks]]\nname = \"Scratch\"\n",
            )?;
            jail.set_env("RAMSYNC_VOLUMES_ROOT", "/only/for/this/run");
            jail.set_env("RAMSYNC_RSYNC_PATH", "/opt/rsync");

            let path = jail.directory().join("config.toml");
            let config = AppConfig::load(&path, None::<&AppConfig>).unwrap();
            assert_eq!(config.volumes_root, PathBuf::from("/only/for/this/run"));

            let store = TomlConfigStore::new(&path, config);
            store.set_sync_root("/tmp/sync").unwrap();

            let saved: toml::Table = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(saved.get("sync_root").and_then(|v| v.as_str()), Some("/tmp/sync"));
            assert_eq!(
                saved.get("transfer_engine").and_then(|v| v.as_str()),
                Some("simulated")
            );
            assert!(
                saved
                    .get("disks")
                    .and_then(|v| v.as_array())
                    .is_some_and(|d| d.len() == 1)
            );
            assert!(!saved.contains_key("volumes_root"));
            assert!(!saved.contains_key("rsync_path"));
            // defaults the file never set are not written either
            assert!(!saved.contains_key("create_backup_folders"));
            Ok(())
        });
    }

    #[test]
    fn unreadable_file_is_left_alone() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "sync_root = [unterminated").unwrap();

        let store = TomlConfigStore::new(&path, AppConfig::default());
        assert!(store.set_sync_root("/tmp/sync").is_err());
        assert_eq!(store.sync_root(), "");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "sync_root = [unterminated"
        );
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryConfigStore::default();
        assert_eq!(store.sync_root(), "");
        store.set_sync_root("/srv/sync").unwrap();
        assert_eq!(store.sync_root(), "/srv/sync");
        assert!(!store.auto_create_disks());
    }
}
