use std::path::Path;

use crate::error::{Error, Result};
use crate::types::config::RunSettings;


/// Returns the settings used when no settings file is given.
pub fn default_run_settings() -> RunSettings {
    RunSettings::default()
}


/// Load `RunSettings` from a YAML file. Missing keys keep their defaults.
pub fn load(path: &Path) -> Result<RunSettings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(path.display().to_string(), format!("cannot read: {}", e)))?;
    parse(&content).map_err(|e| match e {
        Error::Config { reason, .. } => Error::config(path.display().to_string(), reason),
        other => other,
    })
}


/// Parse settings from a YAML string. An empty document yields the defaults.
pub fn parse(content: &str) -> Result<RunSettings> {
    if content.trim().is_empty() {
        return Ok(default_run_settings());
    }
    let settings: RunSettings =
        serde_yaml::from_str(content).map_err(|e| Error::config("settings", e.to_string()))?;
    if settings.max_notifications == 0 {
        return Err(Error::config("max_notifications", "must be at least 1"));
    }
    Ok(settings)
}
