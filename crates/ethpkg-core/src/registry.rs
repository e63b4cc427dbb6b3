//! Named signers and repositories.
//!
//! Registries are plain values owned by whoever orchestrates the work
//! (normally [`crate::PackageManager`]); there is no global registration.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::repository::{Repository, RepositoryError};
use crate::signer::Signer;

/// Signers keyed by [`Signer::name`].
#[derive(Clone, Default)]
pub struct SignerRegistry {
    signers: BTreeMap<String, Arc<dyn Signer>>,
}

impl std::fmt::Debug for SignerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.signers.keys()).finish()
    }
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signer, returning the one it replaced under the same name.
    pub fn register(&mut self, signer: Arc<dyn Signer>) -> Option<Arc<dyn Signer>> {
        self.signers.insert(signer.name().to_string(), signer)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Signer>> {
        self.signers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

/// Repositories keyed by [`Repository::name`].
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    repositories: BTreeMap<String, Arc<dyn Repository>>,
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.repositories.keys()).finish()
    }
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, repository: Arc<dyn Repository>) -> Option<Arc<dyn Repository>> {
        self.repositories
            .insert(repository.name().to_string(), repository)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Repository>> {
        self.repositories.get(name).cloned()
    }

    /// Repository and query selected by a `<repository>:<query>` spec.
    pub fn select(&self, spec: &str) -> Result<(Arc<dyn Repository>, PackageSpec), RepositoryError> {
        let spec = PackageSpec::parse(spec)?;
        let repository = self
            .get(&spec.repository)
            .ok_or_else(|| RepositoryError::UnknownRepository(spec.repository.clone()))?;
        Ok((repository, spec))
    }
}

/// A parsed `<repository>:<query>` string, e.g. `github:owner/project`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub repository: String,
    pub query: String,
}

impl PackageSpec {
    pub fn parse(spec: &str) -> Result<Self, RepositoryError> {
        match spec.split_once(':') {
            Some((repository, query)) if !repository.is_empty() && !query.is_empty() => Ok(Self {
                repository: repository.to_lowercase(),
                query: query.to_string(),
            }),
            _ => Err(RepositoryError::InvalidSpec(spec.to_string())),
        }
    }
}

impl std::fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::PrivateKeySigner;

    #[test]
    fn spec_parsing() {
        let spec = PackageSpec::parse("GitHub:owner/repo").unwrap();
        assert_eq!(spec.repository, "github");
        assert_eq!(spec.query, "owner/repo");
        assert_eq!(spec.to_string(), "github:owner/repo");
        assert!(PackageSpec::parse("no-colon").is_err());
        assert!(PackageSpec::parse(":query").is_err());
        assert!(PackageSpec::parse("repo:").is_err());
    }

    #[test]
    fn registries_are_independent_values() {
        let mut a = SignerRegistry::new();
        let b = SignerRegistry::new();
        assert!(a.register(Arc::new(PrivateKeySigner::random())).is_none());
        assert!(a.register(Arc::new(PrivateKeySigner::random())).is_some());
        assert!(a.get(PrivateKeySigner::NAME).is_some());
        assert!(b.is_empty());
        assert_eq!(a.names().collect::<Vec<_>>(), vec!["privatekey"]);
    }

    #[test]
    fn unknown_repository_is_an_error() {
        let registry = RepositoryRegistry::new();
        assert!(matches!(
            registry.select("nowhere:thing"),
            Err(RepositoryError::UnknownRepository(ref r)) if r == "nowhere"
        ));
    }
}
