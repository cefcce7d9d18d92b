//! Configuration file loading
//!
//! Files are read with `figment`, the provider chosen by extension
//! (`yaml`/`yml`, `toml`, `json`). Environment variables with the `PLC_`
//! prefix are merged on top; `__` separates nested keys, so
//! `PLC_DEFAULTS__CALL_TIMEOUT_MS=8000` overrides `defaults.call_timeout_ms`.

use std::path::Path;

use errors::ConfigError;
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use tracing::info;

use crate::store::{ConfigFile, ConfigStore};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "PLC_";

/// Load a store from a file, with `PLC_` environment overrides
pub fn load_store_from_file<P: AsRef<Path>>(path: P) -> Result<ConfigStore, ConfigError> {
    load_store_with_env(path, ENV_PREFIX)
}

/// Load a store from a file, with environment overrides under `env_prefix`
pub fn load_store_with_env<P: AsRef<Path>>(
    path: P,
    env_prefix: &str,
) -> Result<ConfigStore, ConfigError> {
    let path = path.as_ref();
    let file: ConfigFile = figment_for(path)?
        .merge(Env::prefixed(env_prefix).split("__"))
        .extract()
        .map_err(|e| {
            ConfigError::Load(format!(
                "Failed to load configuration from {}: {}",
                path.display(),
                e
            ))
        })?;

    let store = ConfigStore::from_config(file)?;
    info!(
        "[CONFIG] Loaded {} ({} devices, {} datagrams)",
        path.display(),
        store.devices().count(),
        store.datagrams().count()
    );
    Ok(store)
}

/// Load only the file, without environment overrides
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<ConfigFile, ConfigError> {
    let path = path.as_ref();
    figment_for(path)?.extract().map_err(|e| {
        ConfigError::Load(format!(
            "Failed to load configuration from {}: {}",
            path.display(),
            e
        ))
    })
}

fn figment_for(path: &Path) -> Result<Figment, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Load(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConfigError::Load("Config file must have an extension".to_string()))?;

    let figment = match extension.to_ascii_lowercase().as_str() {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        _ => {
            return Err(ConfigError::Load(format!(
                "Unsupported config file format: {}",
                extension
            )))
        },
    };
    Ok(figment)
}
