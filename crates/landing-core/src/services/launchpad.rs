use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{LandingError, Result};
use crate::models::{
    BinaryPublication, BuildRecord, PublicationStatus, SeriesArchitecture, SourcePublication,
};

use super::archive::ArchiveStatusClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One page of a Launchpad collection resource.
#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    entries: Vec<T>,
    #[serde(default)]
    next_collection_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBinary {
    distro_arch_series_link: String,
    status: PublicationStatus,
    #[serde(default)]
    architecture_specific: bool,
}

impl RawBinary {
    /// The arch tag is the last path segment of the distro arch series link.
    fn into_publication(self) -> BinaryPublication {
        let arch_tag = self
            .distro_arch_series_link
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        BinaryPublication {
            arch_tag,
            status: self.status,
            architecture_specific: self.architecture_specific,
        }
    }
}

/// Anonymous, read-only client for the Launchpad web service, bound to one
/// archive (a PPA or a distribution's primary archive).
#[derive(Debug, Clone)]
pub struct LaunchpadClient {
    http: Client,
    api_root: String,
    distribution: String,
    archive_link: String,
}

impl LaunchpadClient {
    /// `archive_link` is the archive's API self link, as stored in a silo's
    /// `global.dest`.
    pub fn new(
        api_root: impl Into<String>,
        distribution: impl Into<String>,
        archive_link: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_root: api_root.into().trim_end_matches('/').to_owned(),
            distribution: distribution.into(),
            archive_link: archive_link.into(),
        })
    }

    /// Client for the distribution's primary archive.
    pub fn primary_archive(
        api_root: impl Into<String>,
        distribution: impl Into<String>,
    ) -> Result<Self> {
        let api_root = api_root.into();
        let distribution = distribution.into();
        let archive_link = format!(
            "{}/{distribution}/+archive/primary",
            api_root.trim_end_matches('/')
        );
        Self::new(api_root, distribution, archive_link)
    }

    /// Client for the PPA `owner/name`.
    pub fn ppa(
        api_root: impl Into<String>,
        distribution: impl Into<String>,
        owner: &str,
        name: &str,
    ) -> Result<Self> {
        let api_root = api_root.into();
        let distribution = distribution.into();
        let archive_link = format!(
            "{}/~{owner}/+archive/{distribution}/{name}",
            api_root.trim_end_matches('/')
        );
        Self::new(api_root, distribution, archive_link)
    }

    pub fn archive_link(&self) -> &str {
        &self.archive_link
    }

    fn series_link(&self, series: &str) -> String {
        format!("{}/{}/{series}", self.api_root, self.distribution)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!("GET {url} {query:?}");
        let response = self.http.get(url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(LandingError::Service(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Fetch every entry of a collection, following `next_collection_link`.
    async fn get_collection<T>(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut page: Collection<T> = self.get_json(url, query).await?;
        let mut entries = std::mem::take(&mut page.entries);
        while let Some(next) = page.next_collection_link.take() {
            page = self.get_json(&next, &[]).await?;
            entries.append(&mut page.entries);
        }
        Ok(entries)
    }

    async fn published_sources(
        &self,
        name: &str,
        version: Option<&str>,
        series: &str,
    ) -> Result<Option<SourcePublication>> {
        let distro_series = self.series_link(series);
        let mut query = vec![
            ("ws.op", "getPublishedSources"),
            ("exact_match", "true"),
            ("source_name", name),
            ("distro_series", distro_series.as_str()),
        ];
        match version {
            Some(version) => query.push(("version", version)),
            None => query.push(("status", "Published")),
        }
        // Newest first; only the head of the first page is needed.
        let page: Collection<SourcePublication> =
            self.get_json(&self.archive_link, &query).await?;
        Ok(page.entries.into_iter().next())
    }
}

impl ArchiveStatusClient for LaunchpadClient {
    async fn find_published_source(
        &self,
        name: &str,
        version: &str,
        series: &str,
    ) -> Result<Option<SourcePublication>> {
        self.published_sources(name, Some(version), series).await
    }

    async fn find_latest_published_source(
        &self,
        name: &str,
        series: &str,
    ) -> Result<Option<SourcePublication>> {
        self.published_sources(name, None, series).await
    }

    async fn refresh_source(&self, source: &SourcePublication) -> Result<SourcePublication> {
        self.get_json(&source.self_link, &[]).await
    }

    async fn list_published_binaries(
        &self,
        source: &SourcePublication,
    ) -> Result<Vec<BinaryPublication>> {
        let raw: Vec<RawBinary> = self
            .get_collection(&source.self_link, &[("ws.op", "getPublishedBinaries")])
            .await?;
        Ok(raw.into_iter().map(RawBinary::into_publication).collect())
    }

    async fn list_builds(&self, source: &SourcePublication) -> Result<Vec<BuildRecord>> {
        self.get_collection(&source.self_link, &[("ws.op", "getBuilds")])
            .await
    }

    async fn series_architectures(&self, series: &str) -> Result<Vec<SeriesArchitecture>> {
        let url = format!("{}/architectures", self.series_link(series));
        self.get_collection(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildState;

    #[test]
    fn builds_links_from_api_root() {
        let client =
            LaunchpadClient::primary_archive("https://api.launchpad.net/devel/", "ubuntu").unwrap();
        assert_eq!(
            client.archive_link(),
            "https://api.launchpad.net/devel/ubuntu/+archive/primary"
        );
        assert_eq!(
            client.series_link("trusty"),
            "https://api.launchpad.net/devel/ubuntu/trusty"
        );

        let ppa = LaunchpadClient::ppa(
            "https://api.launchpad.net/devel",
            "ubuntu",
            "ci-train-ppa-service",
            "landing-003",
        )
        .unwrap();
        assert_eq!(
            ppa.archive_link(),
            "https://api.launchpad.net/devel/~ci-train-ppa-service/+archive/ubuntu/landing-003"
        );
    }

    #[test]
    fn parses_source_collection_page() {
        let page: Collection<SourcePublication> = serde_json::from_str(
            r#"{
                "total_size": 1,
                "start": 0,
                "entries": [{
                    "self_link": "https://api.launchpad.net/devel/~ci-train-ppa-service/+archive/ubuntu/landing-003/+sourcepub/1",
                    "source_package_name": "foo",
                    "source_package_version": "2.0",
                    "status": "Published",
                    "date_published": null
                }]
            }"#,
        )
        .unwrap();
        assert!(page.next_collection_link.is_none());
        assert_eq!(page.entries[0].source_package_name, "foo");
        assert_eq!(page.entries[0].status, PublicationStatus::Published);
    }

    #[test]
    fn binary_arch_comes_from_distro_arch_series_link() {
        let page: Collection<RawBinary> = serde_json::from_str(
            r#"{
                "entries": [
                    {"distro_arch_series_link": "https://api.launchpad.net/devel/ubuntu/trusty/armhf",
                     "status": "Superseded", "architecture_specific": true},
                    {"distro_arch_series_link": "https://api.launchpad.net/devel/ubuntu/trusty/i386",
                     "status": "Published", "architecture_specific": false}
                ],
                "next_collection_link": "https://api.launchpad.net/devel/next?ws.start=75"
            }"#,
        )
        .unwrap();
        assert!(page.next_collection_link.is_some());

        let binaries: Vec<BinaryPublication> = page
            .entries
            .into_iter()
            .map(RawBinary::into_publication)
            .collect();
        assert_eq!(binaries[0].arch_tag, "armhf");
        assert_eq!(binaries[0].status, PublicationStatus::Superseded);
        assert_eq!(binaries[1].arch_tag, "i386");
        assert!(!binaries[1].architecture_specific);
    }

    #[test]
    fn parses_builds_and_series_architectures() {
        let builds: Collection<BuildRecord> = serde_json::from_str(
            r#"{"entries": [{"arch_tag": "amd64", "buildstate": "Failed to build",
                 "title": "amd64 build of foo 2.0", "web_link": "https://launchpad.net/b/1"}]}"#,
        )
        .unwrap();
        assert_eq!(builds.entries[0].state, BuildState::FailedToBuild);

        let archs: Collection<SeriesArchitecture> = serde_json::from_str(
            r#"{"entries": [
                {"architecture_tag": "amd64", "is_nominated_arch_indep": false},
                {"architecture_tag": "i386", "is_nominated_arch_indep": true}
            ]}"#,
        )
        .unwrap();
        assert!(archs.entries[1].is_nominated_arch_indep);
    }

    #[test]
    fn unknown_publication_status_is_tolerated() {
        let source: SourcePublication = serde_json::from_str(
            r#"{"self_link": "x", "source_package_name": "foo",
                "source_package_version": "1", "status": "Frozen"}"#,
        )
        .unwrap();
        assert_eq!(source.status, PublicationStatus::Unknown);
    }
}
