//! Keygen command

use ethpkg_core::{PrivateKeySigner, Signer};

/// Print a fresh private key and its address.
pub fn keygen() {
    let signer = PrivateKeySigner::random();
    println!("address:     {}", signer.address());
    println!("private key: {}", signer.to_hex());
    eprintln!("Keep the private key secret. Export it as ETHPKG_SIGNING_KEY to sign.");
}
