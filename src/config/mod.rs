pub mod schema;

pub use schema::{OportunaConfig, StoreBackend};

use anyhow::{Context, Result};
use std::path::Path;

/// File name of the config inside the home directory.
pub const CONFIG_FILE: &str = "oportuna.toml";

/// Load config from the given path, or return defaults.
///
/// Environment overrides are applied in both cases.
pub fn load_config(path: &Path) -> Result<OportunaConfig> {
    let mut config = if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read oportuna config file")?;
        toml::from_str(&contents).context("Failed to parse oportuna config (TOML)")?
    } else {
        OportunaConfig::default()
    };
    config.apply_env();
    Ok(config)
}

/// Log level for a run: the explicit flag, else the config file's, else `info`.
pub fn resolve_log_level(flag: Option<&str>, config_path: &Path) -> String {
    if let Some(level) = flag.map(str::trim).filter(|l| !l.is_empty()) {
        return level.to_string();
    }
    load_config(config_path)
        .map(|c| c.log_level)
        .ok()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &OportunaConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}
