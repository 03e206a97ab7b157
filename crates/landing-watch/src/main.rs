use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::Utc;
use color_eyre::eyre::{eyre, WrapErr};
use tracing_subscriber::EnvFilter;

use landing_core::models::{
    describe_packages, ArchBuildState, Package, PackageKey, Settings, SiloStatus,
};
use landing_core::services::uploads::{read_dsc_archs, resolve_architectures, uploaded_packages};
use landing_core::services::{
    config_loader, watch_uploads, IgnoreMarkers, LaunchpadClient, PackageStatusTracker,
    SiloAllocator, UploadSetMonitor, UploadSets, WatchOptions, WatchOutcome,
};

const SETTINGS_ENV: &str = "LANDING_SETTINGS";
const SILO_ENV: &str = "SILO_NAME";
const LOG_FILE_ENV: &str = "LANDING_LOG_FILE";

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _log_guard = setup_logging();

    let settings_path = env::var_os(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config_loader::SETTINGS_FILENAME));
    let settings = config_loader::load(&settings_path)
        .wrap_err_with(|| format!("loading {}", settings_path.display()))?;
    let silo_name = env::var(SILO_ENV).map_err(|_| eyre!("{} is not set", SILO_ENV))?;

    match watch_silo(&settings, &silo_name).await? {
        WatchOutcome::Published => Ok(()),
        WatchOutcome::Failed(packages) => Err(eyre!(
            "packages failed to build: {}",
            describe_packages(&packages)
        )),
        WatchOutcome::SourcesNeverPublished(packages) => Err(eyre!(
            "sources never published: {}",
            describe_packages(&packages)
        )),
    }
}

/// Log to stderr, or to `LANDING_LOG_FILE` through a non-blocking writer.
fn setup_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = env::var_os(LOG_FILE_ENV).map(PathBuf::from) else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
        return None;
    };

    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or(OsStr::new("landing-watch.log"));
    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Series and archives are stored as API links; the name is the last segment.
fn last_segment(link: &str) -> &str {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(link)
}

async fn watch_silo(settings: &Settings, silo_name: &str) -> color_eyre::Result<WatchOutcome> {
    let allocator = SiloAllocator::from_settings(settings);
    let store = allocator.store();
    let silo_dir = allocator.silo_dir(silo_name);
    let config = store
        .load(&silo_dir)
        .await
        .ok_or_else(|| eyre!("silo {} is not configured", silo_name))?;
    let series = last_segment(&config.global.series).to_string();

    let silo_ppa = LaunchpadClient::ppa(
        &settings.launchpad_api_root,
        &settings.distribution,
        &settings.ppa_owner,
        silo_name,
    )?;
    let destination = LaunchpadClient::new(
        &settings.launchpad_api_root,
        &settings.distribution,
        config.global.dest.clone(),
    )?;

    let virtualized = settings
        .virtualized_ppas
        .then_some(settings.virtualized_archs.as_slice());
    let archs = resolve_architectures(&silo_ppa, &series, virtualized).await?;
    tracing::info!(
        "Watching {silo_name} on {} for {series}, arch-indep builds on {}",
        silo_ppa.archive_link(),
        archs.indep_arch
    );

    let keys: Vec<PackageKey> = if config.global.pkgversionlist.is_empty() {
        uploaded_packages(&silo_dir).await?.into_iter().collect()
    } else {
        config.global.pkgversionlist.clone()
    };

    let mut monitor = UploadSetMonitor::new(silo_ppa, IgnoreMarkers::new(&silo_dir));
    for key in &keys {
        let required = read_dsc_archs(&silo_dir, key, &archs)
            .await?
            .unwrap_or_else(|| archs.available.clone());
        let package = Package::new(&key.source_name, &key.version, &series, required)
            .with_ignorable_archs(settings.archs_to_eventually_ignore.iter().cloned());
        let tracker =
            PackageStatusTracker::new(package, archs.indep_arch.clone(), &destination).await?;
        monitor.track(tracker);
    }

    store.set_step(&silo_dir, "watching").await?;
    store
        .set_status(&silo_dir, SiloStatus::new("Packages are building"))
        .await?;

    let mut sets = UploadSets::pending(keys);
    let outcome = watch_uploads(&mut monitor, &mut sets, &WatchOptions::from(settings)).await?;

    if let WatchOutcome::Failed(packages) = &outcome {
        for key in packages {
            let Some(tracker) = monitor.tracker(key) else {
                continue;
            };
            let states = tracker.arch_states();
            let failed: Vec<&str> = states
                .iter()
                .filter(|(_, state)| **state == ArchBuildState::Failed)
                .map(|(arch, _)| arch.as_str())
                .collect();
            tracing::error!("{key} failed on {}", failed.join(", "));
        }
    }

    let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let (step, mut status) = match &outcome {
        WatchOutcome::Published => ("built", SiloStatus::new(format!("Packages built ({now})"))),
        WatchOutcome::Failed(packages) => (
            "build failed",
            SiloStatus::new(format!(
                "Packages failed to build: {} ({now})",
                describe_packages(packages)
            )),
        ),
        WatchOutcome::SourcesNeverPublished(packages) => (
            "build failed",
            SiloStatus::new(format!(
                "Sources never appeared in the silo PPA: {} ({now})",
                describe_packages(packages)
            )),
        ),
    };
    status.ping = outcome != WatchOutcome::Published;
    store.set_step(&silo_dir, step).await?;
    store.set_status(&silo_dir, status).await?;

    Ok(outcome)
}
