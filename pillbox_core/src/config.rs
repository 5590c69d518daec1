//! Configuration file support for the pillbox.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/pillbox/config.toml`.
//! Every section is optional.

use crate::{Error, Identity, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("prescriptions.json")
    }
}

/// Signed-in user. Normally supplied by the identity provider; the CLI
/// reads it from here when no `--user` is given.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    pub owner_id: Option<String>,
    pub display_name: Option<String>,
}

impl IdentityConfig {
    pub fn identity(&self) -> Result<Identity> {
        match &self.owner_id {
            Some(id) => Identity::new(id.clone(), self.display_name.clone()),
            None => Err(Error::Identity("please sign in".into())),
        }
    }
}

/// Scheduling rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Hide medicines outside their prescription's start/end dates
    #[serde(default = "default_true")]
    pub enforce_date_range: bool,

    /// Only allow marking doses for today's current time slot
    #[serde(default = "default_true")]
    pub current_slot_only: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enforce_date_range: true,
            current_slot_only: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("pillbox")
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("pillbox").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.schedule.enforce_date_range);
        assert!(config.schedule.current_slot_only);
        assert!(config.identity.owner_id.is_none());
        assert!(config.data.store_path().ends_with("pillbox/prescriptions.json"));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[identity]
owner_id = "user_42"

[schedule]
current_slot_only = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.schedule.current_slot_only);
        assert!(config.schedule.enforce_date_range); // default
        assert_eq!(config.identity.identity().unwrap().owner_id(), "user_42");
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_missing_identity_is_an_error() {
        let config = Config::default();
        assert!(matches!(config.identity.identity(), Err(Error::Identity(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.identity.owner_id = Some("user_7".into());
        config.schedule.enforce_date_range = false;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.identity.owner_id.as_deref(), Some("user_7"));
        assert!(!loaded.schedule.enforce_date_range);
    }
}
