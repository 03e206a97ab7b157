use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ArchBuildState, PackageKey};

use super::archive::ArchiveStatusClient;
use super::tracker::{IgnoreMarkers, PackageStatusTracker};

/// Working partition of a landing's uploads. A package that published is in
/// none of the three sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSets {
    pub not_in_dest: BTreeSet<PackageKey>,
    pub building: BTreeSet<PackageKey>,
    pub failed: BTreeSet<PackageKey>,
}

impl UploadSets {
    /// Every upload starts out not yet visible in the archive.
    pub fn pending<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = PackageKey>,
    {
        Self {
            not_in_dest: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Nothing left to wait on: every package either published or failed.
    pub fn is_settled(&self) -> bool {
        self.not_in_dest.is_empty() && self.building.is_empty()
    }
}

pub struct UploadSetMonitor<C> {
    archive: C,
    markers: IgnoreMarkers,
    trackers: BTreeMap<PackageKey, PackageStatusTracker>,
}

impl<C: ArchiveStatusClient> UploadSetMonitor<C> {
    pub fn new(archive: C, markers: IgnoreMarkers) -> Self {
        Self {
            archive,
            markers,
            trackers: BTreeMap::new(),
        }
    }

    /// Start tracking a package, replacing any tracker for the same upload.
    pub fn track(&mut self, tracker: PackageStatusTracker) -> PackageKey {
        let key = tracker.package().key().clone();
        self.trackers.insert(key.clone(), tracker);
        key
    }

    pub fn tracker(&self, key: &PackageKey) -> Option<&PackageStatusTracker> {
        self.trackers.get(key)
    }

    /// Poll every package that is not visible yet or still building and move
    /// it to the set matching its new status.
    pub async fn update_all(
        &mut self,
        sets: &mut UploadSets,
        restrict_to_indep_arch: bool,
    ) -> Result<()> {
        let pending: Vec<PackageKey> = sets
            .not_in_dest
            .union(&sets.building)
            .cloned()
            .collect();

        for key in pending {
            let Some(tracker) = self.trackers.get_mut(&key) else {
                warn!("{key} is in the upload sets but has no tracker");
                continue;
            };
            info!("Checking {key}");
            let status = tracker
                .get_status(&self.archive, &self.markers, restrict_to_indep_arch)
                .await?;
            match status {
                None => {}
                Some(ArchBuildState::Building) => {
                    sets.not_in_dest.remove(&key);
                    sets.building.insert(key);
                }
                Some(ArchBuildState::Failed) => {
                    sets.not_in_dest.remove(&key);
                    sets.building.remove(&key);
                    sets.failed.insert(key);
                }
                Some(ArchBuildState::Published) => {
                    sets.not_in_dest.remove(&key);
                    sets.building.remove(&key);
                }
            }
        }
        Ok(())
    }
}
