use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{LandingError, Result};
use crate::models::package::version_without_epoch;
use crate::models::{Arch, ArchiveArchitectures, PackageKey};

use super::archive::ArchiveStatusClient;

static SOURCE_CHANGES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)_([^_]+)_source\.changes$").unwrap());

static DSC_ARCHITECTURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Architecture:[ \t]*(.*?)[ \t]*$").unwrap());

/// Every `(source, version)` with a `<source>_<version>_source.changes` file
/// in `directory`.
pub async fn uploaded_packages(directory: &Path) -> Result<BTreeSet<PackageKey>> {
    let mut packages = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(|e| LandingError::State(format!("reading upload dir: {e}")))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LandingError::State(format!("reading upload entry: {e}")))?
    {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(caps) = SOURCE_CHANGES_RE.captures(file_name) {
            packages.insert(PackageKey::new(&caps[1], &caps[2]));
        }
    }
    Ok(packages)
}

/// Architectures a source package builds on, from the `Architecture:` field
/// of its `.dsc`, restricted to what the archive offers. `None` when the
/// field is missing.
pub fn archs_from_dsc(dsc: &str, archive: &ArchiveArchitectures) -> Option<BTreeSet<Arch>> {
    let field = DSC_ARCHITECTURE_RE.captures(dsc)?.get(1)?.as_str();
    let listed: Vec<&str> = field.split_whitespace().collect();

    if listed.iter().any(|a| a.contains("any")) {
        return Some(archive.available.clone());
    }
    if listed == ["all"] {
        return Some(BTreeSet::from([archive.indep_arch.clone()]));
    }
    Some(
        listed
            .into_iter()
            .filter(|a| archive.available.contains(*a))
            .map(str::to_string)
            .collect(),
    )
}

/// Read `<source>_<version>.dsc` from `directory` and derive its
/// architectures. `Ok(None)` when the file or its field is absent.
pub async fn read_dsc_archs(
    directory: &Path,
    key: &PackageKey,
    archive: &ArchiveArchitectures,
) -> Result<Option<BTreeSet<Arch>>> {
    let path = directory.join(format!(
        "{}_{}.dsc",
        key.source_name,
        version_without_epoch(&key.version)
    ));
    if !path.exists() {
        return Ok(None);
    }
    let contents = tokio::fs::read_to_string(&path).await?;
    Ok(archs_from_dsc(&contents, archive))
}

/// The architectures packages build on in `series`: a fixed list for
/// virtualized archives, otherwise whatever the series declares.
pub async fn resolve_architectures<C: ArchiveStatusClient>(
    archive: &C,
    series: &str,
    virtualized_archs: Option<&[Arch]>,
) -> Result<ArchiveArchitectures> {
    if let Some(archs) = virtualized_archs {
        return ArchiveArchitectures::virtualized(archs)
            .ok_or_else(|| LandingError::InvalidConfig("virtualized arch list is empty".into()));
    }
    let series_archs = archive.series_architectures(series).await?;
    ArchiveArchitectures::from_series(&series_archs).ok_or_else(|| {
        LandingError::Service(format!(
            "series {series} has no architecture nominated for architecture-independent builds"
        ))
    })
}
