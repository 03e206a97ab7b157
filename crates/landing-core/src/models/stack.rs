use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// A stack is addressed by its namespace (the release it belongs to) and
/// its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackId {
    pub namespace: String,
    pub name: String,
}

impl StackId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.namespace)
    }
}

/// One stack definition. Its dependency edges live in the graph that
/// loaded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub id: StackId,
    pub manual_publish: bool,
    pub enabled: bool,
    pub status_ignored: bool,
    pub projects: Vec<String>,
}

/// Outcome recorded by a stack's own build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    Ok,
    Failed,
    NeedsManualPublish,
    Aborted,
    Unknown,
}

impl StackStatus {
    pub fn from_record(value: i64) -> Self {
        match value {
            0 => StackStatus::Ok,
            1 => StackStatus::Failed,
            2 => StackStatus::NeedsManualPublish,
            3 | -1 => StackStatus::Aborted,
            _ => StackStatus::Unknown,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StackStatus::Ok
    }
}

/// On-disk layout of a `<name>.cfg` stack file.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StackFile {
    #[serde(default)]
    pub stack: Option<StackSection>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StackSection {
    #[serde(default)]
    pub dependencies: Option<Vec<DependencyEntry>>,
    #[serde(default)]
    pub manualpublish: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status_ignored: bool,
    #[serde(default)]
    pub projects: Option<Vec<ProjectEntry>>,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            dependencies: None,
            manualpublish: false,
            enabled: true,
            status_ignored: false,
            projects: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DependencyEntry {
    Name(String),
    Qualified { name: String, release: String },
}

impl DependencyEntry {
    pub fn resolve(&self, own_namespace: &str) -> StackId {
        match self {
            DependencyEntry::Name(name) => StackId::new(own_namespace, name.clone()),
            DependencyEntry::Qualified { name, release } => {
                StackId::new(release.clone(), name.clone())
            }
        }
    }
}

/// A project is listed either by name or as a single-key mapping carrying
/// per-project options.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProjectEntry {
    Name(String),
    Detailed(BTreeMap<String, serde_yaml::Value>),
}

impl ProjectEntry {
    pub fn name(&self) -> Option<&str> {
        match self {
            ProjectEntry::Name(name) => Some(name),
            ProjectEntry::Detailed(map) => map.keys().next().map(String::as_str),
        }
    }
}
