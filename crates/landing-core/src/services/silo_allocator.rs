use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::error::{LandingError, Result};
use crate::models::Settings;

use super::silo_store::SiloConfigStore;

/// Created exclusively inside a silo directory by whoever claims the silo.
pub const CLAIM_FILENAME: &str = ".claim";

/// The fixed, ordered pool of silos on this host.
#[derive(Debug, Clone)]
pub struct SiloAllocator {
    silo_root: PathBuf,
    silos: Vec<String>,
    preprod_silos: Vec<String>,
    store: SiloConfigStore,
}

impl SiloAllocator {
    pub fn new(
        silo_root: impl Into<PathBuf>,
        silos: Vec<String>,
        preprod_silos: Vec<String>,
        store: SiloConfigStore,
    ) -> Self {
        Self {
            silo_root: silo_root.into(),
            silos,
            preprod_silos,
            store,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.silo_root.clone(),
            settings.silos.clone(),
            settings.preprod_silos.clone(),
            SiloConfigStore::from_settings(settings),
        )
    }

    pub fn store(&self) -> &SiloConfigStore {
        &self.store
    }

    pub fn silo_dir(&self, name: &str) -> PathBuf {
        self.silo_root.join(name)
    }

    fn candidates(&self, preprod: bool) -> impl Iterator<Item = &String> {
        self.silos
            .iter()
            .filter(move |name| !preprod || self.preprod_silos.contains(*name))
    }

    fn has_config(&self, name: &str) -> bool {
        self.store.config_path(&self.silo_dir(name)).is_file()
    }

    /// First silo without a config, in pool order. Another process may take
    /// it before the caller does; use [`Self::claim_first_available`] to
    /// hold it.
    pub fn return_first_available_silo(&self, preprod: bool) -> Option<String> {
        self.candidates(preprod)
            .find(|name| !self.has_config(name))
            .cloned()
    }

    /// False when a silo other than `ignoring` already lands `project` into
    /// the same series and destination.
    pub async fn is_project_not_in_any_config(
        &self,
        project: &str,
        series: &str,
        dest: &str,
        ignoring: Option<&str>,
    ) -> bool {
        self.conflicting_silo(project, series, dest, ignoring)
            .await
            .is_none()
    }

    /// The first silo other than `ignoring` whose config lands `project`
    /// into the same series and destination.
    pub async fn conflicting_silo(
        &self,
        project: &str,
        series: &str,
        dest: &str,
        ignoring: Option<&str>,
    ) -> Option<String> {
        info!(
            "Checking whether {project} is already configured for {dest} ({series}) in another silo"
        );
        for name in &self.silos {
            if ignoring == Some(name.as_str()) {
                continue;
            }
            let Some(config) = self.store.load(&self.silo_dir(name)).await else {
                continue;
            };
            if config.targets(series, dest) && config.tracks_project(project) {
                error!(
                    "{project} is already prepared for the same series and destination in {name}"
                );
                return Some(name.clone());
            }
        }
        None
    }

    /// Take `name` for this process. Returns false when the silo is
    /// configured or already claimed.
    ///
    /// The claim file records the claimer's pid but nothing checks it: a
    /// claim left behind by a process that died stays until [`Self::release`]
    /// removes it.
    pub async fn claim(&self, name: &str) -> Result<bool> {
        if !self.silos.iter().any(|s| s == name) {
            return Err(LandingError::SiloUnknown(name.to_string()));
        }
        if self.has_config(name) {
            return Ok(false);
        }

        let silo_dir = self.silo_dir(name);
        tokio::fs::create_dir_all(&silo_dir).await?;
        let claim_path = silo_dir.join(CLAIM_FILENAME);
        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&claim_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let pid = std::process::id().to_string();
        let written = write_claim(file, pid.as_bytes()).await;
        discard_claim_on_error(&claim_path, written).await?;

        // A config written without a claim still wins.
        if self.has_config(name) {
            tokio::fs::remove_file(&claim_path).await?;
            return Ok(false);
        }
        info!("Claimed silo {name}");
        Ok(true)
    }

    pub async fn claim_first_available(&self, preprod: bool) -> Result<Option<String>> {
        for name in self.candidates(preprod) {
            if self.claim(name).await? {
                return Ok(Some(name.clone()));
            }
        }
        Ok(None)
    }

    /// Free a silo: drop its config, the published copy and the claim.
    pub async fn release(&self, name: &str) -> Result<()> {
        if !self.silos.iter().any(|s| s == name) {
            return Err(LandingError::SiloUnknown(name.to_string()));
        }
        let silo_dir = self.silo_dir(name);
        remove_if_present(&self.store.config_path(&silo_dir)).await?;
        if let Some(published) = self.store.published_path(&silo_dir) {
            remove_if_present(&published).await?;
        }
        remove_if_present(&silo_dir.join(CLAIM_FILENAME)).await?;
        info!("Released silo {name}");
        Ok(())
    }
}

async fn write_claim<W>(mut file: W, contents: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

/// A claim whose pid never reached the disk is removed before the error is
/// returned.
async fn discard_claim_on_error(claim_path: &Path, written: Result<()>) -> Result<()> {
    if written.is_err() {
        remove_if_present(claim_path).await?;
    }
    written
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
