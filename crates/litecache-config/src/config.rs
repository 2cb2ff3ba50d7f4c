// crates/litecache-config/src/config.rs
// ============================================================================
// Module: Litecache Configuration
// Description: Configuration loading and validation for litecache.
// Purpose: Parse a TOML file into coordinator settings with hard limits.
// Dependencies: litecache, serde, thiserror, toml, tracing
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits
//! and fails closed on anything malformed. The file has two sections:
//!
//! ```toml
//! [store]
//! path = "data/app.sqlite3"
//! watch_backend = "data_version"
//!
//! [init]
//! script_path = "schema.sql"
//! ```
//!
//! Relative `store.path` and `init.script_path` values resolve against the
//! directory containing the config file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use litecache::CacheCoordinator;
use litecache::CoordinatorConfig;
use litecache::LitecacheError;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "litecache.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "LITECACHE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum init script size in bytes.
pub const MAX_INIT_SCRIPT_SIZE: usize = 4 * 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Top-level litecache configuration file.
///
/// # Invariants
/// - `store` passes [`CoordinatorConfig::validate`] after [`Self::validate`].
/// - At most one of `init.script` and `init.script_path` is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LitecacheConfig {
    /// Coordinator and store settings.
    pub store: CoordinatorConfig,
    /// Optional first-run initialization script.
    #[serde(default)]
    pub init: Option<InitConfig>,
}

/// First-run initialization script source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    /// Inline SQL script.
    #[serde(default)]
    pub script: Option<String>,
    /// Path to a SQL script file.
    #[serde(default)]
    pub script_path: Option<PathBuf>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration or the init script.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The configured coordinator failed to open.
    #[error(transparent)]
    Open(#[from] LitecacheError),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl LitecacheConfig {
    /// Loads configuration from `path`, the `LITECACHE_CONFIG` environment
    /// variable, or `litecache.toml` in the working directory, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds limits,
    /// fails to parse, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        if let Some(base) = resolved.parent() {
            config.resolve_relative_paths(base);
        }
        config.validate()?;
        tracing::debug!(
            config = %resolved.display(),
            store = %config.store.path.display(),
            "loaded litecache config"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid config.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("store.path", &self.store.path)?;
        self.store.validate().map_err(|err| ConfigError::Invalid(format!("store: {err}")))?;
        if let Some(init) = &self.init {
            init.validate()?;
        }
        Ok(())
    }

    /// Returns the init script text, reading `init.script_path` if set.
    ///
    /// A missing `[init]` section yields an empty script.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the script file cannot be read or exceeds
    /// [`MAX_INIT_SCRIPT_SIZE`].
    pub fn init_script(&self) -> Result<String, ConfigError> {
        let Some(init) = &self.init else {
            return Ok(String::new());
        };
        if let Some(script) = &init.script {
            return Ok(script.clone());
        }
        let Some(script_path) = &init.script_path else {
            return Ok(String::new());
        };
        let bytes = fs::read(script_path).map_err(|err| {
            ConfigError::Io(format!("init script {}: {err}", script_path.display()))
        })?;
        if bytes.len() > MAX_INIT_SCRIPT_SIZE {
            return Err(ConfigError::Invalid("init script exceeds size limit".to_string()));
        }
        String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("init script must be utf-8".to_string()))
    }

    /// Opens a coordinator for the configured store and init script.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the init script cannot be read, or
    /// [`ConfigError::Open`] when the coordinator fails to open.
    pub fn open_coordinator(&self) -> Result<CacheCoordinator, ConfigError> {
        let script = self.init_script()?;
        Ok(CacheCoordinator::open_with_config(self.store.clone(), &script)?)
    }

    /// Anchors relative paths at `base`.
    fn resolve_relative_paths(&mut self, base: &Path) {
        if self.store.path.is_relative() {
            self.store.path = base.join(&self.store.path);
        }
        if let Some(script_path) = self.init.as_mut().and_then(|init| init.script_path.as_mut())
            && script_path.is_relative()
        {
            *script_path = base.join(&*script_path);
        }
    }
}

impl InitConfig {
    /// Validates the init section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when both sources are set or the
    /// script path is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script.is_some() && self.script_path.is_some() {
            return Err(ConfigError::Invalid(
                "init.script and init.script_path are mutually exclusive".to_string(),
            ));
        }
        if let Some(script) = &self.script
            && script.len() > MAX_INIT_SCRIPT_SIZE
        {
            return Err(ConfigError::Invalid("init.script exceeds size limit".to_string()));
        }
        if let Some(script_path) = &self.script_path {
            validate_path_string("init.script_path", script_path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved config path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path field against emptiness and length limits.
fn validate_path_string(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use super::*;

    #[test]
    fn validate_path_string_rejects_empty_string() {
        let result = validate_path_string("store.path", Path::new(""));
        assert!(result.unwrap_err().to_string().contains("non-empty"));
    }

    #[test]
    fn validate_path_string_rejects_long_component() {
        let long = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        let result = validate_path_string("store.path", Path::new(&long));
        assert!(result.unwrap_err().to_string().contains("component too long"));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let mut config = LitecacheConfig::from_toml_str(
            "[store]\npath = \"db/app.sqlite3\"\n[init]\nscript_path = \"schema.sql\"\n",
        )
        .unwrap();
        config.resolve_relative_paths(Path::new("/etc/app"));
        assert_eq!(config.store.path, PathBuf::from("/etc/app/db/app.sqlite3"));
        let script_path = config.init.and_then(|init| init.script_path).unwrap();
        assert_eq!(script_path, PathBuf::from("/etc/app/schema.sql"));
    }

    #[test]
    fn absolute_paths_are_untouched() {
        let mut config =
            LitecacheConfig::from_toml_str("[store]\npath = \"/var/lib/app.sqlite3\"\n").unwrap();
        config.resolve_relative_paths(Path::new("/etc/app"));
        assert_eq!(config.store.path, PathBuf::from("/var/lib/app.sqlite3"));
    }
}
