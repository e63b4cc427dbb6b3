//! Package manager
//!
//! Owns the signer and repository registries, the identity resolver and the
//! listener, and wires them into the container, protocol and verification
//! layers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use ethpkg_schema::{Address, AddressError, VerificationResult};

use crate::container::{ContainerError, Package};
use crate::listener::{Event, Listener, NullListener};
use crate::protocol::{SignOptions, SignOutcome, SignatureError, sign_package};
use crate::registry::{RepositoryRegistry, SignerRegistry};
use crate::repository::{ReleaseInfo, RepositoryError, latest};
use crate::resolver::IdentityResolver;
use crate::settings::Settings;
use crate::signer::{PrivateKeySigner, RpcSigner, Signer, SignerError};
use crate::verify::{VerifyError, VerifyOptions, verify};

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Unknown signer: {0}")]
    UnknownSigner(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("Invalid signer account: {0}")]
    Account(#[from] AddressError),

    #[error("Failed to cache download at {path}: {source}")]
    Cache {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A package fetched from a repository.
#[derive(Debug, Clone)]
pub struct FetchedPackage {
    pub release: ReleaseInfo,
    pub package: Package,
    /// Copy of the downloaded asset below the cache directory.
    pub cached: PathBuf,
}

pub struct PackageManager {
    settings: Settings,
    signers: SignerRegistry,
    repositories: RepositoryRegistry,
    resolver: Option<Arc<dyn IdentityResolver>>,
    listener: Arc<dyn Listener>,
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("settings", &self.settings)
            .field("signers", &self.signers)
            .field("repositories", &self.repositories)
            .field("resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl PackageManager {
    /// A manager with empty registries.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            signers: SignerRegistry::new(),
            repositories: RepositoryRegistry::new(),
            resolver: None,
            listener: Arc::new(NullListener),
        }
    }

    /// A manager with every signer `settings` configures registered.
    pub fn from_settings(settings: Settings) -> Result<Self, ManagerError> {
        let mut manager = Self::new(settings);

        if let Some(signer) = PrivateKeySigner::from_settings(&manager.settings)? {
            info!(address = %signer.address(), "registered private key signer");
            manager.signers.register(Arc::new(signer));
        }
        if let (Some(url), Some(account)) = (
            manager.settings.rpc_url.clone(),
            manager.settings.rpc_account.clone(),
        ) {
            let signer = RpcSigner::new(url, Address::parse(&account)?)?;
            manager.signers.register(Arc::new(signer));
        }

        Ok(manager)
    }

    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn signers(&self) -> &SignerRegistry {
        &self.signers
    }

    pub fn signers_mut(&mut self) -> &mut SignerRegistry {
        &mut self.signers
    }

    pub fn repositories(&self) -> &RepositoryRegistry {
        &self.repositories
    }

    pub fn repositories_mut(&mut self) -> &mut RepositoryRegistry {
        &mut self.repositories
    }

    /// Download the latest release matching `spec` (`<repository>:<query>`)
    /// and load it, using the asset name as a format hint. The asset is
    /// kept at `<cache_dir>/<repository>/<file name>`.
    pub async fn fetch_package(&self, spec: &str) -> Result<FetchedPackage, ManagerError> {
        let (repository, parsed) = self.repositories.select(spec)?;
        self.listener.on_event(&Event::ResolvingRelease {
            spec: parsed.to_string(),
        });

        let releases = repository.list_releases(&parsed.query).await?;
        let release = latest(&releases)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(parsed.to_string()))?;
        info!(spec = %parsed, version = %release.version, file = %release.file_name, "fetching release");

        let bytes = repository
            .download(&release.download_url, self.listener.as_ref())
            .await?;
        let package = Package::load_with_hint(bytes.clone(), &release.file_name)?;
        let cached = self.cache_download(&parsed.repository, &release.file_name, &bytes)?;
        Ok(FetchedPackage {
            release,
            package,
            cached,
        })
    }

    fn cache_download(&self, repository: &str, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ManagerError> {
        // Only the final component, so a hostile asset name cannot escape the cache.
        let name = Path::new(file_name)
            .file_name()
            .map_or_else(|| "download".into(), |n| n.to_os_string());
        let dir = self.settings.cache_dir().join(repository);
        let path = dir.join(name);
        std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::write(&path, bytes))
            .map_err(|source| ManagerError::Cache {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "cached download");
        Ok(path)
    }

    /// Sign `package` with the registered signer `signer_name`.
    pub async fn sign_package(
        &self,
        package: &mut Package,
        signer_name: &str,
        options: &SignOptions,
    ) -> Result<SignOutcome, ManagerError> {
        let signer = self
            .signers
            .get(signer_name)
            .ok_or_else(|| ManagerError::UnknownSigner(signer_name.to_string()))?;
        Ok(sign_package(package, signer.as_ref(), options, self.listener.as_ref()).await?)
    }

    /// Default signing options from the configured validity window.
    pub fn sign_options(&self) -> SignOptions {
        SignOptions {
            validity: self.settings.validity(),
            ..SignOptions::default()
        }
    }

    pub async fn verify_package(
        &self,
        package: &Package,
        options: &VerifyOptions,
    ) -> Result<VerificationResult, ManagerError> {
        Ok(verify(
            package,
            options,
            self.resolver.as_deref(),
            self.listener.as_ref(),
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ArchiveFormat, Container};
    use crate::repository::Repository;
    use crate::resolver::StaticResolver;
    use async_trait::async_trait;
    use bytes::Bytes;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    struct FixtureRepository {
        asset: Bytes,
        file_name: &'static str,
    }

    #[async_trait]
    impl Repository for FixtureRepository {
        fn name(&self) -> &str {
            "fixture"
        }

        async fn list_releases(&self, query: &str) -> Result<Vec<ReleaseInfo>, RepositoryError> {
            Ok(["1.0.0", "1.1.0"]
                .iter()
                .map(|v| ReleaseInfo {
                    name: query.to_string(),
                    version: (*v).to_string(),
                    file_name: self.file_name.to_string(),
                    download_url: format!("fixture://{query}/{v}"),
                    published_at: None,
                })
                .collect())
        }

        async fn download(&self, url: &str, listener: &dyn Listener) -> Result<Bytes, RepositoryError> {
            listener.on_event(&Event::DownloadProgress {
                url: url.to_string(),
                current: self.asset.len() as u64,
                total: Some(self.asset.len() as u64),
            });
            Ok(self.asset.clone())
        }
    }

    fn asset() -> Bytes {
        let mut package = Package::empty(ArchiveFormat::TarGz);
        package.add_entry("foo.txt", "foo".into()).unwrap();
        package.to_bytes().unwrap()
    }

    fn settings_with_key(home: &Path) -> Settings {
        let mut settings = Settings::with_home(home);
        settings.signing_key = Some(KEY.to_string());
        settings
    }

    #[tokio::test]
    async fn fetch_sign_verify() {
        let home = tempfile::tempdir().unwrap();
        let mut manager = PackageManager::from_settings(settings_with_key(home.path())).unwrap();
        let served = asset();
        manager.repositories_mut().register(Arc::new(FixtureRepository {
            asset: served.clone(),
            file_name: "app.tar.gz",
        }));

        let fetched = manager.fetch_package("fixture:app").await.unwrap();
        assert_eq!(fetched.release.version, "1.1.0");
        assert_eq!(fetched.cached, home.path().join("cache/fixture/app.tar.gz"));
        assert_eq!(std::fs::read(&fetched.cached).unwrap(), served.to_vec());
        let mut package = fetched.package;

        let outcome = manager
            .sign_package(&mut package, PrivateKeySigner::NAME, &manager.sign_options())
            .await
            .unwrap();
        assert!(outcome.is_signed());

        let address = manager.signers().get(PrivateKeySigner::NAME).unwrap().address();
        let manager = manager.with_resolver(Arc::new(StaticResolver::new().with("me.eth", address)));
        let result = manager
            .verify_package(
                &package,
                &VerifyOptions {
                    trusted: Some("me.eth".to_string()),
                    ..VerifyOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(result.is_valid && result.is_trusted);
    }

    #[tokio::test]
    async fn cached_name_stays_inside_cache_dir() {
        let home = tempfile::tempdir().unwrap();
        let mut manager = PackageManager::new(Settings::with_home(home.path()));
        manager.repositories_mut().register(Arc::new(FixtureRepository {
            asset: asset(),
            file_name: "../../escape.tar.gz",
        }));
        let fetched = manager.fetch_package("fixture:app").await.unwrap();
        assert_eq!(fetched.cached, home.path().join("cache/fixture/escape.tar.gz"));
        assert!(!home.path().join("escape.tar.gz").exists());
    }

    #[tokio::test]
    async fn format_hint_mismatch_is_reported() {
        let mut manager = PackageManager::new(Settings::with_home("/tmp"));
        manager.repositories_mut().register(Arc::new(FixtureRepository {
            asset: asset(),
            file_name: "app.zip",
        }));
        assert!(matches!(
            manager.fetch_package("fixture:app").await,
            Err(ManagerError::Container(ContainerError::FormatMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn unknown_signer_is_an_error() {
        let manager = PackageManager::new(Settings::with_home("/tmp"));
        let mut package = Package::empty(ArchiveFormat::Tar);
        assert!(matches!(
            manager
                .sign_package(&mut package, "nope", &SignOptions::default())
                .await,
            Err(ManagerError::UnknownSigner(_))
        ));
    }

    #[test]
    fn rpc_signer_needs_account() {
        let mut settings = Settings::with_home("/tmp");
        settings.rpc_url = Some("http://127.0.0.1:8545".to_string());
        let manager = PackageManager::from_settings(settings.clone()).unwrap();
        assert!(manager.signers().is_empty());

        settings.rpc_account = Some("0x1111111111111111111111111111111111111111".to_string());
        let manager = PackageManager::from_settings(settings).unwrap();
        assert!(manager.signers().get(RpcSigner::NAME).is_some());
    }
}
