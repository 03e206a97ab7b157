use std::path::{Path, PathBuf};

use crate::error::{LandingError, Result};
use crate::models::Settings;

pub const SETTINGS_FILENAME: &str = "landing.yaml";

/// Environment variable overriding the stacks configuration root.
pub const STACKS_DIR_ENV: &str = "CONFIG_STACKS_DIR";

pub fn load(settings_path: &Path) -> Result<Settings> {
    load_with_env(settings_path, |key| std::env::var(key).ok())
}

pub fn load_with_env<F>(settings_path: &Path, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    if !settings_path.exists() {
        return Err(LandingError::ConfigNotFound(settings_path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(settings_path)?;
    let mut settings: Settings = serde_yaml::from_str(&contents)
        .map_err(|e| LandingError::InvalidConfig(e.to_string()))?;

    if settings.silos.is_empty() {
        return Err(LandingError::InvalidConfig(
            "at least one silo name is required".into(),
        ));
    }
    if let Some(unknown) = settings
        .preprod_silos
        .iter()
        .find(|p| !settings.silos.contains(*p))
    {
        return Err(LandingError::InvalidConfig(format!(
            "preprod silo '{unknown}' is not in the silo list"
        )));
    }
    if let Some(dir) = env(STACKS_DIR_ENV).filter(|d| !d.is_empty()) {
        settings.stacks_dir = PathBuf::from(dir);
    }
    Ok(settings)
}
