//! Layered configuration loading.
//!
//! A named config is resolved from three sources, later ones winning:
//! the type's `Default`, `<config_dir>/<name>.json`, and environment
//! variables named `<PREFIX>_<NAME>_<FIELD>`.

use crate::types::HwiConfig;
use crate::{HwiError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `HWI_HWI_TESTNET=true`.
pub const ENV_PREFIX: &str = "HWI";

/// Name of the library's own config file, without extension.
pub const CONFIG_NAME: &str = "hwi";

/// Configuration source priority (higher number = higher priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    Default = 0,
    File = 1,
    Environment = 2,
    Override = 3,
}

/// Configuration manager for handling multiple configuration sources
pub struct ConfigManager {
    config_dir: PathBuf,
    environment_prefix: String,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf, environment_prefix: &str) -> Self {
        Self {
            config_dir,
            environment_prefix: environment_prefix.to_string(),
        }
    }

    fn config_path(&self, config_name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.json", config_name))
    }

    /// Load configuration from defaults, file and process environment.
    pub fn load_config<T>(&self, config_name: &str) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        self.load_config_with_env(config_name, std::env::vars())
    }

    /// Like [`load_config`](Self::load_config) with an explicit set of
    /// environment variables.
    pub fn load_config_with_env<T, I>(&self, config_name: &str, vars: I) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config_value = serde_json::to_value(T::default())?;

        let config_file_path = self.config_path(config_name);
        if config_file_path.exists() {
            let file_config = Self::load_from_file(&config_file_path)?;
            Self::merge_config_values(&mut config_value, file_config, ConfigSource::File);
        }

        let env_config = self.load_from_environment(config_name, vars);
        Self::merge_config_values(&mut config_value, env_config, ConfigSource::Environment);

        serde_json::from_value(config_value)
            .map_err(|e| HwiError::invalid_input(format!("Failed to deserialize config '{}': {}", config_name, e)))
    }

    pub fn save_config<T: Serialize>(&self, config_name: &str, config: &T) -> Result<()> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir)?;
        }

        let config_file_path = self.config_path(config_name);
        fs::write(&config_file_path, serde_json::to_string_pretty(config)?)?;

        log::info!("Configuration '{}' saved to {:?}", config_name, config_file_path);
        Ok(())
    }

    pub fn config_exists(&self, config_name: &str) -> bool {
        self.config_path(config_name).exists()
    }

    pub fn delete_config(&self, config_name: &str) -> Result<()> {
        let config_file_path = self.config_path(config_name);
        if config_file_path.exists() {
            fs::remove_file(&config_file_path)?;
            log::info!("Configuration '{}' deleted", config_name);
        }
        Ok(())
    }

    /// Names of all `.json` configs in the config directory.
    pub fn list_configs(&self) -> Result<Vec<String>> {
        if !self.config_dir.exists() {
            return Ok(Vec::new());
        }

        let mut configs = Vec::new();
        for entry in fs::read_dir(&self.config_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) {
                    configs.push(file_stem.to_string());
                }
            }
        }

        configs.sort();
        Ok(configs)
    }

    fn load_from_file(file_path: &Path) -> Result<serde_json::Value> {
        let content = fs::read_to_string(file_path)?;
        serde_json::from_str(&content)
            .map_err(|e| HwiError::invalid_input(format!("Failed to parse config file {:?}: {}", file_path, e)))
    }

    fn load_from_environment<I>(&self, config_name: &str, vars: I) -> serde_json::Value
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env_config = serde_json::Map::new();
        let prefix = format!("{}_{}_", self.environment_prefix, config_name.to_uppercase());

        for (key, value) in vars {
            if let Some(field) = key.strip_prefix(&prefix) {
                // JSON first so booleans and numbers keep their type
                let parsed_value =
                    serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
                env_config.insert(field.to_lowercase(), parsed_value);
            }
        }

        serde_json::Value::Object(env_config)
    }

    fn merge_config_values(base: &mut serde_json::Value, overlay: serde_json::Value, source: ConfigSource) {
        match (base, overlay) {
            (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
                for (key, value) in overlay_map {
                    log::trace!("config key '{}' set from {:?}", key, source);
                    base_map.insert(key, value);
                }
            }
            (base, overlay) => {
                *base = overlay;
            }
        }
    }
}

/// Loads [`HwiConfig`] from `config_dir` with `HWI_HWI_*` overrides.
pub fn load_hwi_config(config_dir: &Path) -> Result<HwiConfig> {
    ConfigManager::new(config_dir.to_path_buf(), ENV_PREFIX).load_config(CONFIG_NAME)
}

/// Configuration builder for fluent configuration creation
pub struct ConfigBuilder<T> {
    config: T,
    overrides: HashMap<String, serde_json::Value>,
}

impl<T: Default> ConfigBuilder<T> {
    pub fn new() -> Self {
        Self::from_config(T::default())
    }
}

impl<T> ConfigBuilder<T> {
    pub fn from_config(config: T) -> Self {
        Self {
            config,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override<V: Serialize>(mut self, key: &str, value: V) -> Result<Self> {
        self.overrides.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn build(self) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut config_value = serde_json::to_value(&self.config)?;
        let overrides = serde_json::Value::Object(self.overrides.into_iter().collect());
        ConfigManager::merge_config_values(&mut config_value, overrides, ConfigSource::Override);

        serde_json::from_value(config_value)
            .map_err(|e| HwiError::invalid_input(format!("Failed to deserialize final config: {}", e)))
    }
}

impl<T: Default> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
