use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{LandingError, Result};
use crate::models::{PackageKey, Settings, SiloConfig, SiloStatus};

/// Reads and writes the config record inside a silo directory, and mirrors
/// every save to the status publication directory.
#[derive(Debug, Clone)]
pub struct SiloConfigStore {
    config_filename: String,
    publish_dir: Option<PathBuf>,
}

impl SiloConfigStore {
    pub fn new(config_filename: impl Into<String>, publish_dir: Option<PathBuf>) -> Self {
        Self {
            config_filename: config_filename.into(),
            publish_dir,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.config_filename.clone(),
            settings.status_publish_dir.clone(),
        )
    }

    pub fn config_path(&self, silo_dir: &Path) -> PathBuf {
        silo_dir.join(&self.config_filename)
    }

    /// Where the published copy of a silo's config lands, if publishing is on.
    pub fn published_path(&self, silo_dir: &Path) -> Option<PathBuf> {
        let publish_dir = self.publish_dir.as_ref()?;
        let silo_name = silo_dir.file_name()?.to_str()?;
        Some(publish_dir.join(format!("{silo_name}.json")))
    }

    /// The silo's config, or `None` when it has none or it cannot be read.
    pub async fn load(&self, silo_dir: &Path) -> Option<SiloConfig> {
        let path = self.config_path(silo_dir);
        if !path.exists() {
            return None;
        }
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) => {
                warn!("Can't read {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(
                    "{} is not a valid silo config, treating the silo as not configured: {e}",
                    path.display()
                );
                None
            }
        }
    }

    /// Replace the silo's config in one rename, then publish a copy.
    pub async fn save(&self, config: &SiloConfig, silo_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        write_atomically(&self.config_path(silo_dir), &json).await?;

        if let Some(published) = self.published_path(silo_dir) {
            write_atomically(&published, &json).await?;
        }
        Ok(())
    }

    async fn update<F>(&self, silo_dir: &Path, change: F) -> Result<()>
    where
        F: FnOnce(&mut SiloConfig),
    {
        let mut config = self.load(silo_dir).await.ok_or_else(|| {
            LandingError::SiloNotConfigured(silo_dir.display().to_string())
        })?;
        change(&mut config);
        self.save(&config, silo_dir).await
    }

    pub async fn set_step(&self, silo_dir: &Path, step: &str) -> Result<()> {
        info!("Silo {}: step {step}", silo_dir.display());
        self.update(silo_dir, |config| config.global.step = step.to_string())
            .await
    }

    pub async fn set_status(&self, silo_dir: &Path, status: SiloStatus) -> Result<()> {
        info!("Silo {}: {}", silo_dir.display(), status.message);
        self.update(silo_dir, |config| config.global.status = status)
            .await
    }

    pub async fn set_package_version_list(
        &self,
        silo_dir: &Path,
        packages: Vec<PackageKey>,
    ) -> Result<()> {
        self.update(silo_dir, |config| config.global.pkgversionlist = packages)
            .await
    }
}

/// Write next to the target under a per-process name and rename over it, so
/// readers see either the old or the new file.
async fn write_atomically(target: &Path, contents: &str) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| LandingError::State(format!("{} has no parent", target.display())))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| LandingError::State(format!("failed to create {}: {e}", parent.display())))?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config");
    let temp = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));
    tokio::fs::write(&temp, contents)
        .await
        .map_err(|e| LandingError::State(format!("failed to write {}: {e}", temp.display())))?;
    tokio::fs::rename(&temp, target)
        .await
        .map_err(|e| LandingError::State(format!("failed to replace {}: {e}", target.display())))?;
    Ok(())
}
