//! Default paths for usherd components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/usher/config.toml` or `~/.config/usher/config.toml`
//! - Data: `$XDG_DATA_HOME/usherd` or `~/.local/share/usherd`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const USHER_CONFIG_ENV: &str = "USHER_CONFIG";

/// Environment variable for overriding the data directory
pub const USHER_DATA_DIR_ENV: &str = "USHER_DATA_DIR";

const CONFIG_DIR: &str = "usher";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "usherd";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$USHER_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/usher/config.toml`
/// 3. `~/.config/usher/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(USHER_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home)
            .join(CONFIG_DIR)
            .join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(CONFIG_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$USHER_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/usherd`
/// 3. `~/.local/share/usherd`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(USHER_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking USHER_DATA_DIR.
/// Used for config defaults where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
