//! TOML configuration file I/O
//!
//! Handles loading and saving the client configuration to/from TOML files
//! in the user's configuration directory.

use crate::config::ClientConfig;
use crate::error::{ConfigError, EduVpnError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "EDUVPN_CONFIG_DIR";

/// Get the default configuration directory
///
/// Returns ~/.config/eduvpn, or EDUVPN_CONFIG_DIR if set
pub fn get_config_dir() -> Result<PathBuf, EduVpnError> {
    if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(config_dir));
    }

    let home = std::env::var("HOME").map_err(|_| {
        EduVpnError::Config(ConfigError::IoError {
            message: "HOME environment variable not set".to_string(),
        })
    })?;

    Ok(PathBuf::from(home).join(".config").join("eduvpn"))
}

/// Get the default configuration file path
pub fn get_config_path() -> Result<PathBuf, EduVpnError> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Directory holding runtime state such as the persisted connection attempt
pub fn state_dir(config: &ClientConfig) -> Result<PathBuf, EduVpnError> {
    match &config.storage.state_dir {
        Some(dir) => Ok(dir.clone()),
        None => get_config_dir(),
    }
}

/// Load the configuration from the default TOML file
///
/// A missing file yields the defaults.
pub fn load_config() -> Result<ClientConfig, EduVpnError> {
    let config_path = get_config_path()?;
    if !config_path.exists() {
        debug!(path = %config_path.display(), "No config file, using defaults");
        return Ok(ClientConfig::default());
    }
    load_config_from_path(&config_path)
}

/// Load the configuration from a specific TOML file
pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<ClientConfig, EduVpnError> {
    let contents = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EduVpnError::Config(ConfigError::LoadFailed {
            path: path.as_ref().to_string_lossy().to_string(),
        }),
        _ => EduVpnError::Config(ConfigError::IoError {
            message: format!("Failed to read config file: {}", e),
        }),
    })?;

    let config: ClientConfig = toml::from_str(&contents).map_err(|e| {
        EduVpnError::Config(ConfigError::IoError {
            message: format!("Failed to parse TOML: {}", e),
        })
    })?;

    config.validate()?;
    debug!(path = %path.as_ref().display(), "Loaded configuration");
    Ok(config)
}

/// Save the configuration to the default TOML file
pub fn save_config(config: &ClientConfig) -> Result<PathBuf, EduVpnError> {
    let config_path = get_config_path()?;
    save_config_to_path(config, &config_path)?;
    Ok(config_path)
}

/// Save the configuration to a specific TOML file
pub fn save_config_to_path<P: AsRef<Path>>(
    config: &ClientConfig,
    path: P,
) -> Result<(), EduVpnError> {
    config.validate()?;

    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            EduVpnError::Config(ConfigError::IoError {
                message: format!("Failed to create config directory: {}", e),
            })
        })?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents).map_err(|_e| {
        EduVpnError::Config(ConfigError::SaveFailed {
            path: path.as_ref().to_string_lossy().to_string(),
        })
    })?;

    info!("Saved configuration to {:?}", path.as_ref());
    Ok(())
}

/// Check if a configuration file exists
pub fn config_exists() -> Result<bool, EduVpnError> {
    Ok(get_config_path()?.exists())
}
