use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::Result;
use crate::models::{describe_packages, PackageKey, Settings};

use super::archive::ArchiveStatusClient;
use super::upload_monitor::{UploadSetMonitor, UploadSets};

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    /// How long a source may stay invisible in the archive before giving up.
    pub source_publish_timeout: Duration,
    pub restrict_to_indep_arch: bool,
}

impl From<&Settings> for WatchOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            source_publish_timeout: settings.source_publish_timeout(),
            restrict_to_indep_arch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Published,
    Failed(Vec<PackageKey>),
    SourcesNeverPublished(Vec<PackageKey>),
}

/// Poll until every upload published or failed, or until sources that
/// never showed up exceed their deadline.
pub async fn watch_uploads<C: ArchiveStatusClient>(
    monitor: &mut UploadSetMonitor<C>,
    sets: &mut UploadSets,
    options: &WatchOptions,
) -> Result<WatchOutcome> {
    let started = Instant::now();
    loop {
        monitor
            .update_all(sets, options.restrict_to_indep_arch)
            .await?;
        if sets.is_settled() {
            break;
        }
        if !sets.not_in_dest.is_empty() && started.elapsed() >= options.source_publish_timeout {
            error!(
                "Sources never appeared in the archive: {}",
                describe_packages(&sets.not_in_dest)
            );
            return Ok(WatchOutcome::SourcesNeverPublished(
                sets.not_in_dest.iter().cloned().collect(),
            ));
        }
        info!(
            "Waiting on {} building and {} not yet visible",
            sets.building.len(),
            sets.not_in_dest.len()
        );
        tokio::time::sleep(options.poll_interval).await;
    }

    if sets.failed.is_empty() {
        info!("All packages published");
        Ok(WatchOutcome::Published)
    } else {
        error!("Some packages failed: {}", describe_packages(&sets.failed));
        Ok(WatchOutcome::Failed(sets.failed.iter().cloned().collect()))
    }
}
