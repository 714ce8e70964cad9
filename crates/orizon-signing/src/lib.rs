//! Ed25519 certificate chain signing and trust verification (C7), plus
//! descriptor/package signing helpers and the pluggable advisory scanner
//! hook that sits on top of the signature store (C8 consumer).

mod cert;
mod descriptor;

pub use cert::{
    fingerprint, generate_keypair, issue_child, self_sign_root, verify_cert, Certificate, KeyId, SigningError,
    TrustStore,
};
pub use descriptor::{
    build_descriptor, sign_descriptor, sign_package, validate_package_security, verify_descriptor, verify_package,
    InMemoryScanner, NullScanner, PackageDescriptor, SignatureBundle, VulnerabilityScanner,
};
