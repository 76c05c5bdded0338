// src/config.rs

//! Configuration loading utilities.
//!
//! Resolves where the configuration lives and loads it with validation, so
//! a broken deployment fails before it starts serving.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::Config;

/// Configuration path used when nothing else is given.
pub const DEFAULT_CONFIG_PATH: &str = "data/config.toml";

/// Environment variable that overrides the default path.
pub const CONFIG_ENV: &str = "MIRRORGATE_CONFIG";

/// Pick the configuration path: explicit argument, then environment, then default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load and validate configuration.
///
/// Relative id-table paths are resolved against the config file's directory.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load(path)
        .map_err(|e| AppError::config(format!("Failed to load {}: {e}", path.display())))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for provider in &mut config.providers {
        if let Some(table) = provider.id_table.as_mut() {
            if table.is_relative() {
                *table = base.join(&*table);
            }
        }
    }

    config.validate()?;
    log::info!(
        "Loaded configuration from {} ({} providers)",
        path.display(),
        config.providers.len()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CONFIG: &str = r#"
        [aggregator]
        priority = ["tsuki"]

        [[providers]]
        kind = "tsuki"
        base_url = "https://tsuki.test"
        id_table = "tsuki-ids.bin"
    "#;

    #[test]
    fn test_explicit_path_wins() {
        let path = config_path(Some(Path::new("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
    }

    #[test]
    fn test_load_resolves_relative_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, CONFIG).unwrap();

        let config = load_config(&path).unwrap();
        let table = config.providers[0].id_table.as_ref().unwrap();
        assert_eq!(table, &dir.path().join("tsuki-ids.bin"));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[aggregator]\npriority = [\"kuro\"]\n").unwrap();

        assert!(matches!(load_config(&path), Err(AppError::Config(_))));
    }
}
