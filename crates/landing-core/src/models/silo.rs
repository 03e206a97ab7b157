use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::package::PackageKey;

/// Persisted configuration of one silo. The presence of this record is what
/// marks a silo as taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiloConfig {
    pub global: GlobalConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requestid: Option<u64>,
    /// Projects landing through merge proposals, with their proposal links.
    /// Older records store a bare list of project names.
    #[serde(default, deserialize_with = "merge_proposals")]
    pub mps: BTreeMap<String, Vec<String>>,
    /// Projects uploaded directly as source packages.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub dest: String,
    pub series: String,
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub status: SiloStatus,
    #[serde(default)]
    pub pkgversionlist: Vec<PackageKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiloStatus {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SiloStatus {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ping: false,
            url: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MergeProposals {
    Listed(Vec<String>),
    Linked(BTreeMap<String, Vec<String>>),
}

fn merge_proposals<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match MergeProposals::deserialize(deserializer)? {
        MergeProposals::Listed(projects) => projects
            .into_iter()
            .map(|project| (project, Vec::new()))
            .collect(),
        MergeProposals::Linked(links) => links,
    })
}

impl SiloConfig {
    pub fn new(dest: impl Into<String>, series: impl Into<String>) -> Self {
        Self {
            global: GlobalConfig {
                dest: dest.into(),
                series: series.into(),
                step: String::new(),
                status: SiloStatus::default(),
                pkgversionlist: Vec::new(),
            },
            requestid: None,
            mps: BTreeMap::new(),
            sources: Vec::new(),
        }
    }

    pub fn targets(&self, series: &str, dest: &str) -> bool {
        self.global.series == series && self.global.dest == dest
    }

    pub fn tracks_project(&self, project: &str) -> bool {
        self.mps.contains_key(project) || self.sources.iter().any(|s| s == project)
    }
}
