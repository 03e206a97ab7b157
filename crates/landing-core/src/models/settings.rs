use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Deployment settings shared by every landing process on a host.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Silo names, in allocation order.
    pub silos: Vec<String>,
    /// Subset of `silos` reserved for preproduction landings.
    #[serde(default)]
    pub preprod_silos: Vec<String>,
    pub silo_root: PathBuf,
    #[serde(default = "default_config_filename")]
    pub config_filename: String,
    /// Where a copy of every saved silo config is published for dashboards.
    #[serde(default)]
    pub status_publish_dir: Option<PathBuf>,
    pub stacks_dir: PathBuf,
    pub stack_status_root: PathBuf,
    #[serde(default = "default_stack_status_filename")]
    pub stack_status_filename: String,
    #[serde(default = "default_stack_started_filename")]
    pub stack_started_filename: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_source_publish_timeout_secs")]
    pub source_publish_timeout_secs: u64,
    #[serde(default = "default_virtualized_archs")]
    pub virtualized_archs: Vec<String>,
    #[serde(default = "default_launchpad_api_root")]
    pub launchpad_api_root: String,
    #[serde(default = "default_distribution")]
    pub distribution: String,
    /// Team owning the per-silo PPAs packages build in.
    #[serde(default = "default_ppa_owner")]
    pub ppa_owner: String,
    #[serde(default = "default_true")]
    pub virtualized_ppas: bool,
    /// Architectures not waited on when the destination never built them.
    #[serde(default)]
    pub archs_to_eventually_ignore: Vec<String>,
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn source_publish_timeout(&self) -> Duration {
        Duration::from_secs(self.source_publish_timeout_secs)
    }
}

fn default_config_filename() -> String {
    "config".into()
}

fn default_stack_status_filename() -> String {
    "stack.status".into()
}

fn default_stack_started_filename() -> String {
    "stack.started".into()
}

fn default_poll_interval_secs() -> u64 {
    5 * 60
}

fn default_source_publish_timeout_secs() -> u64 {
    20 * 60
}

fn default_virtualized_archs() -> Vec<String> {
    vec!["i386".into(), "amd64".into()]
}

fn default_launchpad_api_root() -> String {
    "https://api.launchpad.net/devel".into()
}

fn default_distribution() -> String {
    "ubuntu".into()
}

fn default_ppa_owner() -> String {
    "ci-train-ppa-service".into()
}

fn default_true() -> bool {
    true
}
