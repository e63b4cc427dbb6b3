//! Human-readable identity resolution.
//!
//! Verification accepts either an address or a name (for example an ENS
//! name). Names are turned into addresses by an [`IdentityResolver`]; a
//! name that cannot be resolved aborts verification rather than silently
//! producing an untrusted result.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use ethpkg_schema::Address;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Cannot resolve '{0}': no identity resolver configured")]
    NoResolver(String),

    #[error("Identity '{0}' did not resolve to an address")]
    Unresolved(String),

    #[error("Identity resolution failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Address registered for `name`, `None` if the name is unknown.
    async fn resolve(&self, name: &str) -> Result<Option<Address>, ResolverError>;
}

/// Fixed name -> address table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<String, Address>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, address: Address) -> Self {
        self.insert(name, address);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, address: Address) {
        self.names.insert(name.into().to_lowercase(), address);
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(&self, name: &str) -> Result<Option<Address>, ResolverError> {
        Ok(self.names.get(&name.to_lowercase()).copied())
    }
}

/// Turn `identity` into an address. Literal addresses never hit the resolver.
pub async fn resolve_identity(
    resolver: Option<&dyn IdentityResolver>,
    identity: &str,
) -> Result<Address, ResolverError> {
    if let Ok(address) = Address::parse(identity) {
        return Ok(address);
    }
    let resolver = resolver.ok_or_else(|| ResolverError::NoResolver(identity.to_string()))?;
    resolver
        .resolve(identity)
        .await?
        .ok_or_else(|| ResolverError::Unresolved(identity.to_string()))
}
