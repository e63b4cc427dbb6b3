pub mod container;
pub mod digest;
pub mod listener;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod settings;
pub mod signer;
pub mod verify;

pub use container::{ArchiveFormat, Container, ContainerError, Entry, EntryFile, Package, WriteOptions};
pub use digest::{IntegrityError, calculate_digests, compare_digests};
pub use listener::{Event, Listener, NullListener, TracingListener};
pub use manager::{FetchedPackage, ManagerError, PackageManager};
pub use protocol::{
    SignOptions, SignOutcome, SignatureError, checksums, is_signed, sign_package, signature,
    signature_entries,
};
pub use registry::{RepositoryRegistry, SignerRegistry};
pub use repository::{ReleaseInfo, Repository, RepositoryError};
pub use resolver::{IdentityResolver, ResolverError, StaticResolver};
pub use settings::Settings;
pub use signer::{PrivateKeySigner, RpcSigner, Signer, SignerError};
pub use verify::{VerifyError, VerifyOptions, verify};

pub use ethpkg_schema as schema;

/// User Agent string for outgoing requests
pub const USER_AGENT: &str = concat!("ethpkg-core/", env!("CARGO_PKG_VERSION"));
