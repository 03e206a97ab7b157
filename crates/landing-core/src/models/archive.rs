use std::collections::BTreeSet;

use serde::Deserialize;

use super::package::Arch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PublicationStatus {
    Pending,
    Published,
    Superseded,
    Deleted,
    Obsolete,
    #[serde(other)]
    Unknown,
}

/// A source package publication in an archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourcePublication {
    pub self_link: String,
    pub source_package_name: String,
    pub source_package_version: String,
    pub status: PublicationStatus,
}

/// A binary publication produced from a source publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPublication {
    pub arch_tag: Arch,
    pub status: PublicationStatus,
    pub architecture_specific: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BuildState {
    #[serde(rename = "Needs building")]
    NeedsBuilding,
    #[serde(rename = "Successfully built")]
    FullyBuilt,
    #[serde(rename = "Failed to build")]
    FailedToBuild,
    #[serde(rename = "Dependency wait")]
    DependencyWait,
    #[serde(rename = "Chroot problem")]
    ChrootProblem,
    #[serde(rename = "Build for superseded Source")]
    SupersededSource,
    #[serde(rename = "Currently building")]
    CurrentlyBuilding,
    #[serde(rename = "Failed to upload")]
    FailedToUpload,
    #[serde(rename = "Uploading build")]
    Uploading,
    #[serde(rename = "Cancelling build")]
    Cancelling,
    #[serde(rename = "Cancelled build")]
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl BuildState {
    /// Build states after which the farm will not produce binaries.
    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            BuildState::FailedToBuild
                | BuildState::ChrootProblem
                | BuildState::FailedToUpload
                | BuildState::Cancelled
                | BuildState::SupersededSource
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildRecord {
    pub arch_tag: Arch,
    #[serde(rename = "buildstate")]
    pub state: BuildState,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub web_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeriesArchitecture {
    pub architecture_tag: Arch,
    #[serde(default)]
    pub is_nominated_arch_indep: bool,
}

/// The architectures an archive builds on, and which of them hosts
/// architecture-independent builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArchitectures {
    pub available: BTreeSet<Arch>,
    pub indep_arch: Arch,
}

impl ArchiveArchitectures {
    /// Virtualized archives only build on a fixed list; the first entry
    /// builds the architecture-independent packages.
    pub fn virtualized(archs: &[Arch]) -> Option<Self> {
        let indep_arch = archs.first()?.clone();
        Some(Self {
            available: archs.iter().cloned().collect(),
            indep_arch,
        })
    }

    pub fn from_series(archs: &[SeriesArchitecture]) -> Option<Self> {
        let indep_arch = archs
            .iter()
            .find(|a| a.is_nominated_arch_indep)?
            .architecture_tag
            .clone();
        Some(Self {
            available: archs.iter().map(|a| a.architecture_tag.clone()).collect(),
            indep_arch,
        })
    }
}
