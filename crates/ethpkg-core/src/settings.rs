use dirs::home_dir;
use std::path::PathBuf;

use ethpkg_schema::DEFAULT_EXPIRATION_DAYS;

/// Runtime configuration, read from the environment.
#[derive(Clone)]
pub struct Settings {
    /// Base directory for cached downloads (`~/.ethpkg`).
    pub home: PathBuf,
    /// Hex-encoded secp256k1 private key used by the in-process signer.
    pub signing_key: Option<String>,
    /// JSON-RPC endpoint of a remote signer.
    pub rpc_url: Option<String>,
    /// Account the remote signer signs with.
    pub rpc_account: Option<String>,
    /// Validity window for new signatures, in days.
    pub validity_days: i64,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("home", &self.home)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("rpc_url", &self.rpc_url)
            .field("rpc_account", &self.rpc_account)
            .field("validity_days", &self.validity_days)
            .finish()
    }
}

impl Settings {
    /// Load configuration from environment variables.
    ///
    /// - `ETHPKG_HOME`: base directory (default `~/.ethpkg`)
    /// - `ETHPKG_SIGNING_KEY`: hex private key
    /// - `ETHPKG_RPC_URL`: remote signer endpoint
    /// - `ETHPKG_RPC_ACCOUNT`: address the remote signer signs with
    /// - `ETHPKG_SIGNATURE_VALIDITY_DAYS`: default 180
    pub fn from_env() -> Self {
        let home = try_ethpkg_home().unwrap_or_else(|| PathBuf::from(".ethpkg"));
        let validity_days = std::env::var("ETHPKG_SIGNATURE_VALIDITY_DAYS")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_EXPIRATION_DAYS);

        Self {
            home,
            signing_key: non_empty_var("ETHPKG_SIGNING_KEY"),
            rpc_url: non_empty_var("ETHPKG_RPC_URL"),
            rpc_account: non_empty_var("ETHPKG_RPC_ACCOUNT"),
            validity_days,
        }
    }

    /// Settings rooted at `home` with no keys configured.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            signing_key: None,
            rpc_url: None,
            rpc_account: None,
            validity_days: DEFAULT_EXPIRATION_DAYS,
        }
    }

    /// Download cache: ~/.ethpkg/cache
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Validity window as a duration.
    pub fn validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.validity_days)
    }
}

/// Returns the base directory, or None if the user's home cannot be resolved.
pub fn try_ethpkg_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("ETHPKG_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".ethpkg"))
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_hang_off_home() {
        let settings = Settings::with_home("/tmp/ethpkg-test");
        assert_eq!(settings.cache_dir(), PathBuf::from("/tmp/ethpkg-test/cache"));
        assert_eq!(settings.validity(), chrono::Duration::days(180));
    }

    #[test]
    fn debug_redacts_key() {
        let mut settings = Settings::with_home("/tmp");
        settings.signing_key = Some("deadbeef".to_string());
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("<redacted>"));
    }
}
