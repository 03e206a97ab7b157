// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use landing_core::models::SiloConfig;
use landing_core::services::{SiloAllocator, SiloConfigStore, StackDependencyGraph, StatusLayout};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub const DEST: &str = "https://api.launchpad.net/devel/~ci-train-ppa-service/+archive/ubuntu/landing-000";
pub const SERIES: &str = "https://api.launchpad.net/devel/ubuntu/trusty";

/// A pool of the given silo names rooted in `root`, publishing copies under
/// `root/published`.
pub fn make_pool(root: &Path, names: &[&str]) -> SiloAllocator {
    SiloAllocator::new(
        root.join("silos"),
        names.iter().map(|n| n.to_string()).collect(),
        Vec::new(),
        SiloConfigStore::new("config", Some(root.join("published"))),
    )
}

/// A config landing `sources` from direct uploads into `dest` for `series`.
pub fn make_config(dest: &str, series: &str, sources: &[&str]) -> SiloConfig {
    let mut config = SiloConfig::new(dest, series);
    config.sources = sources.iter().map(|s| s.to_string()).collect();
    config
}

/// Stack files and status records laid out the way stack builds leave them.
pub struct StackTree {
    pub stacks_dir: PathBuf,
    pub status_root: PathBuf,
}

impl StackTree {
    pub fn new(root: &Path) -> Self {
        let tree = Self {
            stacks_dir: root.join("stacks"),
            status_root: root.join("work"),
        };
        fs::create_dir_all(&tree.stacks_dir).unwrap();
        tree
    }

    pub fn write_stack(&self, namespace: &str, relative: &str, yaml: &str) {
        let path = self.stacks_dir.join(namespace).join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, yaml).unwrap();
    }

    pub fn write_status(&self, namespace: &str, stack: &str, value: i64) {
        let dir = self.status_root.join(namespace).join(stack);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stack.status"), format!("{value}\n")).unwrap();
    }

    pub fn load(&self) -> StackDependencyGraph {
        StackDependencyGraph::load(
            &self.stacks_dir,
            StatusLayout {
                root: self.status_root.clone(),
                status_filename: "stack.status".into(),
                started_filename: "stack.started".into(),
            },
        )
        .unwrap()
    }
}

/// Collects formatted log lines emitted on the current thread while the
/// returned guard is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
