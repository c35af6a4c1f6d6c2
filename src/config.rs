// YAML configuration

use crate::exchange::DEFAULT_TTL_SECONDS;
use crate::store::STORE_DIR;
use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_NAME: &str = "taskboard";
const CONFIG_FILE: &str = "taskboard.yml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "TASKBOARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the record store; board data lives in `.taskboard/` below it
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub reorder: ReorderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            exchange: ExchangeConfig::default(),
            reorder: ReorderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub backend: ExchangeBackend,
    /// SQLite file; `None` puts it next to the record store
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            backend: ExchangeBackend::default(),
            path: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl ExchangeConfig {
    pub fn db_path(&self, store_path: &Path) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => store_path.join(STORE_DIR).join("exchange.db"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderConfig {
    /// Persist every touched column's full order at the end of a drag, not
    /// just the dragged task
    #[serde(default)]
    pub persist_full_order: bool,
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

/// Config file location: `$TASKBOARD_CONFIG`, else `<config_dir>/taskboard/taskboard.yml`
pub fn config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

impl Config {
    /// Load from `explicit`, or the default location; a missing default
    /// file yields the defaults, a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match config_file() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents =
            fs::read_to_string(&path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config =
            Self::from_yaml(&contents).with_context(|| format!("Failed to load config file: {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents).context("Invalid YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.ttl_seconds == 0 {
            bail!("exchange.ttl_seconds must be positive");
        }
        Ok(())
    }

    pub fn exchange_db_path(&self) -> PathBuf {
        self.exchange.db_path(&self.store_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.exchange.backend, ExchangeBackend::Sqlite);
        assert_eq!(config.exchange.ttl_seconds, 1800);
        assert!(!config.reorder.persist_full_order);
        assert!(config.exchange_db_path().ends_with(".taskboard/exchange.db"));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml("store_path: /srv/boards\nexchange:\n  backend: memory\n").unwrap();
        assert_eq!(config.store_path, PathBuf::from("/srv/boards"));
        assert_eq!(config.exchange.backend, ExchangeBackend::Memory);
        assert_eq!(config.exchange.ttl_seconds, DEFAULT_TTL_SECONDS);
        assert_eq!(
            config.exchange_db_path(),
            PathBuf::from("/srv/boards/.taskboard/exchange.db")
        );
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
store_path: /tmp/board
exchange:
  backend: sqlite
  path: /var/lib/taskboard/share.db
  ttl_seconds: 60
reorder:
  persist_full_order: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.exchange.ttl_seconds, 60);
        assert_eq!(config.exchange_db_path(), PathBuf::from("/var/lib/taskboard/share.db"));
        assert!(config.reorder.persist_full_order);
    }

    #[test]
    fn test_rejects_zero_ttl_and_unknown_backend() {
        assert!(Config::from_yaml("exchange:\n  ttl_seconds: 0\n").is_err());
        assert!(Config::from_yaml("exchange:\n  backend: redis\n").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("taskboard.yml");
        fs::write(&path, "reorder:\n  persist_full_order: true\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.reorder.persist_full_order);

        assert!(Config::load(Some(&temp.path().join("missing.yml"))).is_err());
    }
}
