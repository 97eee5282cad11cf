//! Application configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `wrldbldr-vault.toml`, then `WRLDBLDR_VAULT__*` environment variables
//! (e.g. `WRLDBLDR_VAULT__STORAGE__BACKEND=sqlite`). `main` loads `.env`
//! first so those variables may also come from a dotenv file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::application::ports::outbound::BackendKind;

/// Base name of the optional configuration file
pub const CONFIG_FILE: &str = "wrldbldr-vault";

const ENV_PREFIX: &str = "WRLDBLDR_VAULT";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    /// Catalog file overriding the embedded one
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

/// Storage backend selection and SQLite tuning
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub sqlite_path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    /// Create/extend tables at startup; verification runs regardless
    pub provision_schema: bool,
}

impl AppConfig {
    /// Load from the default file name and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Load using `file` (extension optional, may be absent) as the file layer
    pub fn load_from(file: &Path) -> Result<Self> {
        let settings = Config::builder()
            .set_default("storage.backend", BackendKind::Memory.as_str())?
            .set_default("storage.sqlite_path", "./data/wrldbldr-vault.db")?
            .set_default("storage.max_connections", 5_i64)?
            .set_default("storage.busy_timeout_ms", 5_000_i64)?
            .set_default("storage.provision_schema", true)?
            .add_source(File::from(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        settings
            .try_deserialize()
            .context("Invalid wrldbldr-vault configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent")).unwrap();
        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.storage.max_connections, 5);
        assert!(config.storage.provision_schema);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            catalog_path = "catalog/custom.toml"

            [storage]
            backend = "sqlite"
            sqlite_path = "/tmp/vault.db"
            busy_timeout_ms = 250
            provision_schema = false
            "#
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.storage.backend, BackendKind::Sqlite);
        assert_eq!(config.storage.sqlite_path, "/tmp/vault.db");
        assert_eq!(config.storage.busy_timeout_ms, 250);
        assert_eq!(config.storage.max_connections, 5);
        assert!(!config.storage.provision_schema);
        assert_eq!(config.catalog_path, Some(PathBuf::from("catalog/custom.toml")));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.toml");
        std::fs::write(&path, "[storage]\nbackend = \"neo4j\"\n").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
