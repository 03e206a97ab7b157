use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{LandingError, Result};
use crate::models::stack::StackFile;
use crate::models::{Settings, Stack, StackId, StackStatus};

/// Where stack builds leave their status and started markers:
/// `<root>/<namespace>/<stack>/<filename>`.
#[derive(Debug, Clone)]
pub struct StatusLayout {
    pub root: PathBuf,
    pub status_filename: String,
    pub started_filename: String,
}

impl StatusLayout {
    fn stack_dir(&self, id: &StackId) -> PathBuf {
        self.root.join(&id.namespace).join(&id.name)
    }
}

/// Every stack known under the stacks root with its direct dependency edges.
/// Loaded once; nothing is re-read from the stack files afterwards.
#[derive(Debug)]
pub struct StackDependencyGraph {
    stacks: Vec<Stack>,
    index: HashMap<StackId, usize>,
    /// `(dependent, dependency)` pairs in declaration order.
    edges: Vec<(usize, usize)>,
    layout: StatusLayout,
}

impl StackDependencyGraph {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::load(
            &settings.stacks_dir,
            StatusLayout {
                root: settings.stack_status_root.clone(),
                status_filename: settings.stack_status_filename.clone(),
                started_filename: settings.stack_started_filename.clone(),
            },
        )
    }

    /// Read every `<namespace>/**/<name>.cfg` under `stacks_dir`.
    pub fn load(stacks_dir: &Path, layout: StatusLayout) -> Result<Self> {
        let mut stacks = Vec::new();
        let mut declared = Vec::new();
        let mut index = HashMap::new();

        for namespace_dir in sorted_entries(stacks_dir)? {
            if !namespace_dir.is_dir() {
                continue;
            }
            let Some(namespace) = namespace_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let mut cfg_files = Vec::new();
            collect_cfg_files(&namespace_dir, &mut cfg_files)?;

            for path in cfg_files {
                let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
                    continue;
                };
                let id = StackId::new(namespace, name);
                if index.contains_key(&id) {
                    warn!("{id} is defined more than once, keeping the first definition");
                    continue;
                }
                let (stack, dependencies) = parse_stack_file(id.clone(), &path)?;
                index.insert(id, stacks.len());
                stacks.push(stack);
                declared.push(dependencies);
            }
        }

        let mut edges = Vec::new();
        for (dependent, dependencies) in declared.iter().enumerate() {
            for dependency in dependencies {
                let target = index.get(dependency).copied().ok_or_else(|| {
                    LandingError::StackNotFound {
                        name: dependency.name.clone(),
                        namespace: dependency.namespace.clone(),
                    }
                })?;
                edges.push((dependent, target));
            }
        }

        info!("Loaded {} stacks from {}", stacks.len(), stacks_dir.display());
        Ok(Self {
            stacks,
            index,
            edges,
            layout,
        })
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.iter()
    }

    fn position(&self, id: &StackId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| LandingError::StackNotFound {
                name: id.name.clone(),
                namespace: id.namespace.clone(),
            })
    }

    /// Direct dependencies, in declaration order.
    pub fn dependencies(&self, id: &StackId) -> Result<Vec<&Stack>> {
        let from = self.position(id)?;
        Ok(self
            .edges
            .iter()
            .filter(|(dependent, _)| *dependent == from)
            .map(|&(_, dependency)| &self.stacks[dependency])
            .collect())
    }

    /// Stacks that directly depend on `id`.
    pub fn reverse_dependencies(&self, id: &StackId) -> Result<Vec<&Stack>> {
        let to = self.position(id)?;
        Ok(self
            .edges
            .iter()
            .filter(|(_, dependency)| *dependency == to)
            .map(|&(dependent, _)| &self.stacks[dependent])
            .collect())
    }

    pub fn is_enabled(&self, id: &StackId) -> Result<bool> {
        Ok(self.stacks[self.position(id)?].enabled)
    }

    /// A stack is started while it waits on dependencies or builds.
    pub fn is_started(&self, id: &StackId) -> Result<bool> {
        self.position(id)?;
        Ok(self
            .layout
            .stack_dir(id)
            .join(&self.layout.started_filename)
            .is_file())
    }

    /// Status recorded by the stack's last run. A missing or unreadable
    /// record is `Unknown`.
    pub fn get_status(&self, id: &StackId) -> Result<StackStatus> {
        let stack = &self.stacks[self.position(id)?];
        if stack.status_ignored {
            return Ok(StackStatus::Ok);
        }

        let path = self.layout.stack_dir(id).join(&self.layout.status_filename);
        if !path.is_file() {
            return Ok(StackStatus::Unknown);
        }
        let contents = std::fs::read_to_string(&path)?;
        match contents.trim().parse::<i64>() {
            Ok(value) => Ok(StackStatus::from_record(value)),
            Err(_) => {
                warn!("{}: unreadable status record {contents:?}", path.display());
                Ok(StackStatus::Unknown)
            }
        }
    }

    /// One message per direct dependency that should block publishing `id`,
    /// in declaration order. Dependencies of dependencies are not looked at.
    pub fn generate_dependency_report(&self, id: &StackId) -> Result<Vec<String>> {
        let mut report = Vec::new();
        for dependency in self.dependencies(id)? {
            info!("Checking status of {}", dependency.id);
            let status = self.get_status(&dependency.id)?;
            if status.is_ok() {
                continue;
            }
            let message = dependency_message(&dependency.id, status);
            warn!("{message}");
            report.push(message);
        }
        Ok(report)
    }

    /// Projects any stack of `namespace` may upload.
    pub fn allowed_projects(&self, namespace: &str) -> BTreeSet<String> {
        self.stacks
            .iter()
            .filter(|s| s.id.namespace == namespace)
            .flat_map(|s| s.projects.iter().cloned())
            .collect()
    }
}

const SOLO_PUBLISH_ADVICE: &str = "To publish this stack alone, first verify it is safe \
without its dependencies: nothing in it may rely on, or be broken by, a change in a stack \
it depends on (API or ABI changes landed in both trunks must not be published separately).";

fn dependency_message(dependency: &StackId, status: StackStatus) -> String {
    match status {
        StackStatus::Failed => format!(
            "{dependency} failed to publish: it did not build or its integration tests \
             fail with the previous stack.\n\
             To publish both stacks, rerun the {dependency} integration tests including the \
             components of this stack and publish both together if they pass.\n\
             {SOLO_PUBLISH_ADVICE}"
        ),
        StackStatus::NeedsManualPublish => format!(
            "{dependency} is waiting for a manual publish: it has packaging changes or \
             depends on an unpublished stack.\n\
             If {dependency} can be published, publish both stacks together.\n\
             {SOLO_PUBLISH_ADVICE}"
        ),
        StackStatus::Aborted => format!(
            "{dependency} was aborted or failed for an unknown reason: a job was stopped by \
             hand or the build service failed.\n\
             {SOLO_PUBLISH_ADVICE}"
        ),
        StackStatus::Unknown | StackStatus::Ok => format!(
            "Cannot determine the status of {dependency}. Unless it is running right now this \
             should not happen; treat it as blocking."
        ),
    }
}

fn parse_stack_file(id: StackId, path: &Path) -> Result<(Stack, Vec<StackId>)> {
    let contents = std::fs::read_to_string(path)?;
    let file: StackFile = if contents.trim().is_empty() {
        StackFile::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|e| LandingError::StackConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };
    let section = file.stack.unwrap_or_default();

    let dependencies: Vec<StackId> = section
        .dependencies
        .iter()
        .flatten()
        .map(|d| d.resolve(&id.namespace))
        .collect();
    let projects = section
        .projects
        .iter()
        .flatten()
        .filter_map(|p| p.name())
        .map(str::to_string)
        .collect();

    let stack = Stack {
        id,
        manual_publish: section.manualpublish,
        enabled: section.enabled,
        status_ignored: section.status_ignored,
        projects,
    };
    Ok((stack, dependencies))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn collect_cfg_files(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for path in sorted_entries(dir)? {
        if path.is_dir() {
            collect_cfg_files(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == "cfg") {
            found.push(path);
        }
    }
    Ok(())
}
