//! Config file discovery and IO.
//!
//! Resolution order: an explicit `--config` path, then a project-local
//! `epistle.toml` in the working directory, then the user config directory
//! (`$EPISTLE_CONFIG_DIR` or the platform config dir under `epistle/`).
//! When nothing is found the defaults apply.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::EpistleConfig;

/// Environment variable overriding the user config directory.
pub const CONFIG_DIR_ENV: &str = "EPISTLE_CONFIG_DIR";

/// File name looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "epistle.toml";

/// File name looked up in the user config directory.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// A loaded configuration together with its origin, `None` for defaults.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EpistleConfig,
    pub path: Option<PathBuf>,
}

/// The user-level config directory.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("epistle")
}

/// Full path of the user-level config file.
pub fn user_config_path() -> PathBuf {
    config_dir().join(USER_CONFIG_FILE)
}

/// Locate the config file to use, if any.
///
/// An explicit path that does not exist is an error; missing discovered
/// paths are not.
pub fn find_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }

    let project = PathBuf::from(PROJECT_CONFIG_FILE);
    if project.is_file() {
        return Ok(Some(project));
    }

    let user = user_config_path();
    if user.is_file() {
        return Ok(Some(user));
    }

    Ok(None)
}

/// Load the effective configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    match find_config(explicit)? {
        Some(path) => {
            let config = load_config_file(&path)?;
            debug!(path = %path.display(), "loaded config");
            Ok(LoadedConfig {
                config,
                path: Some(path),
            })
        }
        None => {
            debug!("no config file found, using defaults");
            Ok(LoadedConfig {
                config: EpistleConfig::default(),
                path: None,
            })
        }
    }
}

/// Read and parse a single config file.
pub fn load_config_file(path: &Path) -> Result<EpistleConfig> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    EpistleConfig::from_toml(&text)
}

/// Write a config file, creating parent directories as needed.
pub fn save_config(config: &EpistleConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let text = config.to_toml()?;
    fs::write(path, text).map_err(|source| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source,
    })
}
