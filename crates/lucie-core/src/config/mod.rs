//! Configuration management for the Lucie bridge

mod bridge;
pub mod serde_utils;

pub use bridge::{BackoffConfig, BridgeConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lucie")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("bridge.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");

        let config = BridgeConfig::default();
        save_config(&path, &config).unwrap();

        let loaded: BridgeConfig = load_config(&path).unwrap();
        assert_eq!(loaded.rpc_address, config.rpc_address);
        assert_eq!(loaded.max_reconnect_attempts, config.max_reconnect_attempts);
        assert_eq!(loaded.long_running, config.long_running);
    }

    #[test]
    fn test_missing_config_file() {
        let result: Result<BridgeConfig, _> = load_config(Path::new("/nonexistent/bridge.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
