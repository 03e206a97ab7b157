use std::future::Future;

use crate::error::Result;
use crate::models::{BinaryPublication, BuildRecord, SeriesArchitecture, SourcePublication};

/// Read-only view of a package archive and the build farm feeding it.
///
/// Not-found conditions are values (`None`, empty lists); errors are only
/// returned for failed requests and are never retried here.
pub trait ArchiveStatusClient {
    /// The publication of exactly `name` at `version` in `series`, in any status.
    fn find_published_source(
        &self,
        name: &str,
        version: &str,
        series: &str,
    ) -> impl Future<Output = Result<Option<SourcePublication>>> + Send;

    /// The newest publication of `name` in `series` whose status is Published.
    fn find_latest_published_source(
        &self,
        name: &str,
        series: &str,
    ) -> impl Future<Output = Result<Option<SourcePublication>>> + Send;

    /// Re-read a publication, picking up status changes such as supersession.
    fn refresh_source(
        &self,
        source: &SourcePublication,
    ) -> impl Future<Output = Result<SourcePublication>> + Send;

    fn list_published_binaries(
        &self,
        source: &SourcePublication,
    ) -> impl Future<Output = Result<Vec<BinaryPublication>>> + Send;

    fn list_builds(
        &self,
        source: &SourcePublication,
    ) -> impl Future<Output = Result<Vec<BuildRecord>>> + Send;

    fn series_architectures(
        &self,
        series: &str,
    ) -> impl Future<Output = Result<Vec<SeriesArchitecture>>> + Send;
}

impl<T: ArchiveStatusClient + Sync> ArchiveStatusClient for &T {
    fn find_published_source(
        &self,
        name: &str,
        version: &str,
        series: &str,
    ) -> impl Future<Output = Result<Option<SourcePublication>>> + Send {
        (**self).find_published_source(name, version, series)
    }

    fn find_latest_published_source(
        &self,
        name: &str,
        series: &str,
    ) -> impl Future<Output = Result<Option<SourcePublication>>> + Send {
        (**self).find_latest_published_source(name, series)
    }

    fn refresh_source(
        &self,
        source: &SourcePublication,
    ) -> impl Future<Output = Result<SourcePublication>> + Send {
        (**self).refresh_source(source)
    }

    fn list_published_binaries(
        &self,
        source: &SourcePublication,
    ) -> impl Future<Output = Result<Vec<BinaryPublication>>> + Send {
        (**self).list_published_binaries(source)
    }

    fn list_builds(
        &self,
        source: &SourcePublication,
    ) -> impl Future<Output = Result<Vec<BuildRecord>>> + Send {
        (**self).list_builds(source)
    }

    fn series_architectures(
        &self,
        series: &str,
    ) -> impl Future<Output = Result<Vec<SeriesArchitecture>>> + Send {
        (**self).series_architectures(series)
    }
}
