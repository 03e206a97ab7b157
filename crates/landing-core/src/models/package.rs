use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Architecture tag as the archive reports it (`amd64`, `i386`, ...).
pub type Arch = String;

/// Identity of an upload: one source package at one version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub source_name: String,
    pub version: String,
}

impl PackageKey {
    pub fn new(source_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source_name, self.version)
    }
}

/// An uploaded source package and the architectures it must build on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    key: PackageKey,
    target_series: String,
    required_archs: BTreeSet<Arch>,
    archs_ignorable_if_absent: BTreeSet<Arch>,
}

impl Package {
    pub fn new<I, A>(
        source_name: impl Into<String>,
        version: impl Into<String>,
        target_series: impl Into<String>,
        required_archs: I,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arch>,
    {
        Self {
            key: PackageKey::new(source_name, version),
            target_series: target_series.into(),
            required_archs: required_archs.into_iter().map(Into::into).collect(),
            archs_ignorable_if_absent: BTreeSet::new(),
        }
    }

    /// Architectures that are only waited on if the version currently in the
    /// destination produced binaries for them.
    pub fn with_ignorable_archs<I, A>(mut self, archs: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arch>,
    {
        self.archs_ignorable_if_absent = archs.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> &PackageKey {
        &self.key
    }

    pub fn source_name(&self) -> &str {
        &self.key.source_name
    }

    pub fn version(&self) -> &str {
        &self.key.version
    }

    pub fn target_series(&self) -> &str {
        &self.target_series
    }

    pub fn required_archs(&self) -> &BTreeSet<Arch> {
        &self.required_archs
    }

    pub fn archs_ignorable_if_absent(&self) -> &BTreeSet<Arch> {
        &self.archs_ignorable_if_absent
    }

    /// Version without its epoch, as used in upload file names.
    pub fn version_for_files(&self) -> &str {
        version_without_epoch(&self.key.version)
    }
}

pub fn version_without_epoch(version: &str) -> &str {
    version.rsplit(':').next().unwrap_or(version)
}

/// Per-architecture state, also used as the aggregate package state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArchBuildState {
    Building,
    Failed,
    Published,
}

impl fmt::Display for ArchBuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArchBuildState::Building => "building",
            ArchBuildState::Failed => "failed",
            ArchBuildState::Published => "published",
        };
        f.write_str(label)
    }
}

/// Render a package list as `name (version)` entries joined by spaces.
pub fn describe_packages<'a, I>(keys: I) -> String
where
    I: IntoIterator<Item = &'a PackageKey>,
{
    keys.into_iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
