//! Release hosting contract.
//!
//! Backends (GitHub releases, IPFS gateways, object stores, ...) live
//! outside this crate; they plug in by implementing [`Repository`] and
//! being registered with a [`crate::registry::RepositoryRegistry`].

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::listener::Listener;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Unknown repository: {0}")]
    UnknownRepository(String),

    #[error("Invalid package spec '{0}': expected <repository>:<query>")]
    InvalidSpec(String),

    #[error("No release found for '{0}'")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Repository error: {0}")]
    Backend(String),
}

/// One downloadable release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub name: String,
    pub version: String,
    /// Asset file name; used as the format hint when loading.
    pub file_name: String,
    pub download_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A source of releases.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Registry key, the `<repository>` part of a package spec.
    fn name(&self) -> &str;

    /// Releases matching `query`, in any order.
    async fn list_releases(&self, query: &str) -> Result<Vec<ReleaseInfo>, RepositoryError>;

    /// Fetch an asset, reporting progress through `listener`.
    async fn download(&self, url: &str, listener: &dyn Listener) -> Result<Bytes, RepositoryError>;
}

/// The most recently published release. Releases without a publish date
/// sort before dated ones; ties fall back to the version string.
pub fn latest(releases: &[ReleaseInfo]) -> Option<&ReleaseInfo> {
    releases
        .iter()
        .max_by(|a, b| (a.published_at, &a.version).cmp(&(b.published_at, &b.version)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn release(version: &str, day: Option<u32>) -> ReleaseInfo {
        ReleaseInfo {
            name: "app".to_string(),
            version: version.to_string(),
            file_name: format!("app-{version}.tar.gz"),
            download_url: format!("https://example.invalid/app-{version}.tar.gz"),
            published_at: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn latest_prefers_publish_date() {
        let releases = vec![release("1.2.0", Some(1)), release("1.1.0", Some(5)), release("9.9.9", None)];
        assert_eq!(latest(&releases).unwrap().version, "1.1.0");
    }

    #[test]
    fn latest_of_nothing_is_none() {
        assert!(latest(&[]).is_none());
    }
}
