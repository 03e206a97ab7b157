use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{Arch, ArchBuildState, Package, PublicationStatus, SourcePublication};

use super::archive::ArchiveStatusClient;

/// Operator-created `<source>.<arch>.ignore` files asking to stop waiting
/// on one architecture of one package.
#[derive(Debug, Clone)]
pub struct IgnoreMarkers {
    directory: PathBuf,
}

impl IgnoreMarkers {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn marker_path(&self, source_name: &str, arch: &str) -> PathBuf {
        self.directory.join(format!("{source_name}.{arch}.ignore"))
    }

    pub fn is_ignored(&self, source_name: &str, arch: &str) -> bool {
        self.marker_path(source_name, arch).is_file()
    }
}

/// Follows one uploaded package through the build farm, architecture by
/// architecture.
///
/// `observed` only moves forward (BUILDING to FAILED or PUBLISHED); the
/// inheritance from the architecture-independent builder is applied on a
/// copy when reporting.
#[derive(Debug, Clone)]
pub struct PackageStatusTracker {
    package: Package,
    indep_arch: Arch,
    archs: BTreeSet<Arch>,
    observed: BTreeMap<Arch, ArchBuildState>,
    source: Option<SourcePublication>,
}

impl PackageStatusTracker {
    /// Build a tracker, dropping every ignorable architecture the version
    /// currently published in `destination` never built for.
    pub async fn new<C: ArchiveStatusClient>(
        package: Package,
        indep_arch: impl Into<Arch>,
        destination: &C,
    ) -> Result<Self> {
        let mut archs = package.required_archs().clone();
        let mut absent = package.archs_ignorable_if_absent().clone();

        if !absent.is_empty() {
            let previous = destination
                .find_latest_published_source(package.source_name(), package.target_series())
                .await?;
            if let Some(previous) = previous {
                for binary in destination.list_published_binaries(&previous).await? {
                    if binary.architecture_specific {
                        absent.remove(&binary.arch_tag);
                    }
                    if absent.is_empty() {
                        break;
                    }
                }
            }
            for arch in &absent {
                if archs.remove(arch) {
                    info!(
                        "{}: not waiting on {arch}, the destination version never built on it",
                        package.source_name()
                    );
                }
            }
        }

        Ok(Self {
            package,
            indep_arch: indep_arch.into(),
            archs,
            observed: BTreeMap::new(),
            source: None,
        })
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Architectures still waited on.
    pub fn tracked_archs(&self) -> &BTreeSet<Arch> {
        &self.archs
    }

    /// Per-architecture states as reported, after inheritance from the
    /// architecture-independent builder. Empty until the source is visible.
    pub fn arch_states(&self) -> BTreeMap<Arch, ArchBuildState> {
        let mut states = self.observed.clone();
        let Some(indep_state) = self.observed.get(&self.indep_arch).copied() else {
            return states;
        };
        if indep_state == ArchBuildState::Published {
            return states;
        }
        for (arch, state) in states.iter_mut() {
            if *arch != self.indep_arch {
                *state = indep_state;
            }
        }
        states
    }

    /// Refresh from the archive and aggregate. `None` means the source is
    /// not visible in the archive yet.
    pub async fn get_status<C: ArchiveStatusClient>(
        &mut self,
        archive: &C,
        markers: &IgnoreMarkers,
        restrict_to_indep_arch: bool,
    ) -> Result<Option<ArchBuildState>> {
        self.drop_ignored_archs(markers);

        if self.source.is_none() {
            let found = archive
                .find_published_source(
                    self.package.source_name(),
                    self.package.version(),
                    self.package.target_series(),
                )
                .await?;
            let Some(source) = found else {
                return Ok(None);
            };
            info!("{} source available in archive", self.package.key());
            self.observed = self
                .archs
                .iter()
                .map(|arch| (arch.clone(), ArchBuildState::Building))
                .collect();
            self.source = Some(source);
        }

        self.refresh_binaries(archive).await?;
        self.log_inherited_failures();

        let states = self.arch_states();
        let mut building = false;
        let mut failed = false;
        for (arch, state) in &states {
            if restrict_to_indep_arch && *arch != self.indep_arch {
                continue;
            }
            info!("{}: arch {arch}, status {state}", self.package.source_name());
            match state {
                ArchBuildState::Building => building = true,
                ArchBuildState::Failed => failed = true,
                ArchBuildState::Published => {}
            }
        }

        Ok(Some(if building {
            ArchBuildState::Building
        } else if failed {
            ArchBuildState::Failed
        } else {
            ArchBuildState::Published
        }))
    }

    fn log_inherited_failures(&self) {
        if self.observed.get(&self.indep_arch) != Some(&ArchBuildState::Failed) {
            return;
        }
        for (arch, state) in &self.observed {
            if *arch != self.indep_arch && *state != ArchBuildState::Failed {
                error!(
                    "{arch} marked as failed because {} failed and architecture-independent packages may be missing",
                    self.indep_arch
                );
            }
        }
    }

    fn drop_ignored_archs(&mut self, markers: &IgnoreMarkers) {
        let source_name = self.package.source_name();
        let ignored: Vec<Arch> = self
            .archs
            .iter()
            .filter(|arch| markers.is_ignored(source_name, arch))
            .cloned()
            .collect();
        for arch in ignored {
            warn!("Request to ignore {source_name} on {arch}");
            self.archs.remove(&arch);
            self.observed.remove(&arch);
        }
    }

    async fn refresh_binaries<C: ArchiveStatusClient>(&mut self, archive: &C) -> Result<()> {
        let Some(source) = self.source.as_ref() else {
            return Ok(());
        };

        // The archive also lists architecture-independent binaries under
        // architectures that never built them.
        for binary in archive.list_published_binaries(source).await? {
            if binary.status != PublicationStatus::Published {
                continue;
            }
            if binary.arch_tag != self.indep_arch && !binary.architecture_specific {
                continue;
            }
            if let Some(state) = self.observed.get_mut(&binary.arch_tag) {
                *state = ArchBuildState::Published;
            }
        }

        if !self
            .observed
            .values()
            .any(|s| *s == ArchBuildState::Building)
        {
            return Ok(());
        }

        let current = archive.refresh_source(source).await?;
        let superseded = current.status == PublicationStatus::Superseded;
        let builds = archive.list_builds(source).await?;
        for build in builds {
            let Some(state) = self.observed.get_mut(&build.arch_tag) else {
                continue;
            };
            if *state != ArchBuildState::Building {
                continue;
            }
            if build.state.is_terminal_failure() {
                error!(
                    "{}: build {} ({}) failed: {:?}",
                    build.arch_tag, build.title, build.web_link, build.state
                );
                *state = ArchBuildState::Failed;
            } else if superseded {
                // Binaries of a superseded source drop out of the published
                // listing; a non-failed build means they did publish.
                *state = ArchBuildState::Published;
            }
        }
        self.source = Some(current);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LandingError;
    use crate::models::BuildState;
    use crate::services::archive::fake::FakeArchive;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::subscriber::DefaultGuard;

    const SERIES: &str = "trusty";

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        fn clear(&self) {
            self.0.lock().unwrap().clear();
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (LogBuffer, DefaultGuard) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    fn foo() -> Package {
        Package::new("foo", "2.0", SERIES, ["amd64", "i386"])
    }

    async fn tracker(package: Package) -> PackageStatusTracker {
        PackageStatusTracker::new(package, "i386", &FakeArchive::new())
            .await
            .unwrap()
    }

    fn markers() -> (tempfile::TempDir, IgnoreMarkers) {
        let dir = tempfile::tempdir().unwrap();
        let markers = IgnoreMarkers::new(dir.path());
        (dir, markers)
    }

    #[tokio::test]
    async fn invisible_source_then_building() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;

        assert_eq!(tracker.get_status(&archive, &markers, false).await.unwrap(), None);
        assert!(tracker.arch_states().is_empty());

        archive.publish_source("foo", "2.0", SERIES);
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Building)
        );
        let states = tracker.arch_states();
        assert_eq!(states.len(), 2);
        assert_eq!(states["amd64"], ArchBuildState::Building);
        assert_eq!(states["i386"], ArchBuildState::Building);
    }

    #[tokio::test]
    async fn published_once_every_arch_publishes() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);

        archive.publish_binary("foo", "2.0", SERIES, "i386", true);
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Building)
        );

        archive.publish_binary("foo", "2.0", SERIES, "amd64", true);
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Published)
        );
    }

    #[tokio::test]
    async fn arch_all_binaries_listed_elsewhere_do_not_count() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.publish_binary("foo", "2.0", SERIES, "i386", false);
        archive.publish_binary("foo", "2.0", SERIES, "amd64", false);

        tracker.get_status(&archive, &markers, false).await.unwrap();
        let states = tracker.arch_states();
        assert_eq!(states["i386"], ArchBuildState::Published);
        assert_eq!(states["amd64"], ArchBuildState::Building);
    }

    #[tokio::test]
    async fn binaries_for_untracked_archs_never_grow_the_set() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.publish_binary("foo", "2.0", SERIES, "armhf", true);

        tracker.get_status(&archive, &markers, false).await.unwrap();
        assert!(!tracker.arch_states().contains_key("armhf"));
        assert_eq!(tracker.arch_states().len(), 2);
    }

    #[tokio::test]
    async fn failed_build_is_reported_once_nothing_builds() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.set_build("foo", "2.0", SERIES, "amd64", BuildState::FailedToBuild);
        archive.set_build("foo", "2.0", SERIES, "i386", BuildState::CurrentlyBuilding);

        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Building)
        );

        archive.publish_binary("foo", "2.0", SERIES, "i386", true);
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Failed)
        );
        assert_eq!(tracker.arch_states()["amd64"], ArchBuildState::Failed);
    }

    #[tokio::test]
    async fn indep_failure_fails_every_arch() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(Package::new(
            "foo",
            "2.0",
            SERIES,
            ["amd64", "i386", "armhf"],
        ))
        .await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.publish_binary("foo", "2.0", SERIES, "amd64", true);
        archive.set_build("foo", "2.0", SERIES, "i386", BuildState::ChrootProblem);

        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Failed)
        );
        for state in tracker.arch_states().values() {
            assert_eq!(*state, ArchBuildState::Failed);
        }
    }

    #[tokio::test]
    async fn inherited_failures_are_logged_by_status_checks_only() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.set_build("foo", "2.0", SERIES, "i386", BuildState::FailedToBuild);

        let (logs, _guard) = capture_logs();
        tracker.get_status(&archive, &markers, false).await.unwrap();
        assert!(logs
            .contents()
            .contains("amd64 marked as failed because i386 failed"));

        logs.clear();
        assert_eq!(tracker.arch_states()["amd64"], ArchBuildState::Failed);
        assert_eq!(tracker.arch_states()["i386"], ArchBuildState::Failed);
        assert!(logs.contents().is_empty());
    }

    #[tokio::test]
    async fn published_arch_waits_on_indep_without_regressing() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.publish_binary("foo", "2.0", SERIES, "amd64", true);

        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Building)
        );
        assert_eq!(tracker.arch_states()["amd64"], ArchBuildState::Building);

        // amd64 drops out of the listing; its earlier observation stands.
        archive.clear_binaries("foo", "2.0", SERIES);
        archive.publish_binary("foo", "2.0", SERIES, "i386", true);
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Published)
        );
    }

    #[tokio::test]
    async fn superseded_source_counts_successful_builds_as_published() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.set_build("foo", "2.0", SERIES, "amd64", BuildState::FullyBuilt);
        archive.set_build("foo", "2.0", SERIES, "i386", BuildState::FullyBuilt);

        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Building)
        );

        archive.set_source_status("foo", "2.0", SERIES, PublicationStatus::Superseded);
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Published)
        );
    }

    #[tokio::test]
    async fn ignore_marker_drops_arch() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.publish_binary("foo", "2.0", SERIES, "i386", true);

        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Building)
        );

        std::fs::write(markers.marker_path("foo", "amd64"), "").unwrap();
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Published)
        );
        assert!(!tracker.tracked_archs().contains("amd64"));
        assert!(!tracker.arch_states().contains_key("amd64"));
    }

    #[tokio::test]
    async fn restrict_to_indep_arch_ignores_other_archs() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.publish_source("foo", "2.0", SERIES);
        archive.publish_binary("foo", "2.0", SERIES, "i386", true);

        assert_eq!(
            tracker.get_status(&archive, &markers, true).await.unwrap(),
            Some(ArchBuildState::Published)
        );
        assert_eq!(
            tracker.get_status(&archive, &markers, false).await.unwrap(),
            Some(ArchBuildState::Building)
        );
    }

    #[tokio::test]
    async fn ignorable_arch_kept_when_destination_built_it() {
        let destination = FakeArchive::new();
        destination.publish_source("foo", "1.0", SERIES);
        destination.publish_binary("foo", "1.0", SERIES, "armhf", true);

        let package = Package::new("foo", "2.0", SERIES, ["amd64", "i386", "armhf", "arm64"])
            .with_ignorable_archs(["armhf", "arm64"]);
        let tracker = PackageStatusTracker::new(package, "i386", &destination)
            .await
            .unwrap();
        assert!(tracker.tracked_archs().contains("armhf"));
        assert!(!tracker.tracked_archs().contains("arm64"));
        assert!(tracker.tracked_archs().contains("amd64"));
    }

    #[tokio::test]
    async fn ignorable_archs_dropped_without_previous_publication() {
        let destination = FakeArchive::new();
        let package = Package::new("foo", "2.0", SERIES, ["amd64", "i386", "armhf"])
            .with_ignorable_archs(["armhf"]);
        let tracker = PackageStatusTracker::new(package, "i386", &destination)
            .await
            .unwrap();
        assert_eq!(tracker.tracked_archs().len(), 2);
        assert!(!tracker.tracked_archs().contains("armhf"));
    }

    #[tokio::test]
    async fn arch_independent_destination_binary_does_not_keep_arch() {
        let destination = FakeArchive::new();
        destination.publish_source("foo", "1.0", SERIES);
        destination.publish_binary("foo", "1.0", SERIES, "armhf", false);

        let package = Package::new("foo", "2.0", SERIES, ["amd64", "armhf"])
            .with_ignorable_archs(["armhf"]);
        let tracker = PackageStatusTracker::new(package, "amd64", &destination)
            .await
            .unwrap();
        assert!(!tracker.tracked_archs().contains("armhf"));
    }

    #[tokio::test]
    async fn no_ignorable_archs_means_no_destination_lookup() {
        let destination = FakeArchive::new();
        PackageStatusTracker::new(foo(), "i386", &destination)
            .await
            .unwrap();
        assert_eq!(destination.calls(), 0);
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        let archive = FakeArchive::new();
        let (_dir, markers) = markers();
        let mut tracker = tracker(foo()).await;
        archive.fail_with("503 Service Unavailable");

        let err = tracker
            .get_status(&archive, &markers, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LandingError::Service(_)));

        archive.recover();
        assert_eq!(tracker.get_status(&archive, &markers, false).await.unwrap(), None);
    }
}
