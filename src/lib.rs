//! PKI Issuer - Config-driven Certificate Authority Library
//!
//! Builds a complete four-level certificate hierarchy from a single YAML
//! configuration file: private keys, certificate signing requests and X.509v3
//! certificates, all persisted as PEM files with owner-only permissions.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed, pathlen=1)
//!   └── Intermediate CA (signed by Root, pathlen=0)
//!       ├── Server certificate (signed by Intermediate, CA=false)
//!       └── Client certificate (signed by Intermediate, CA=false)
//! ```
//!
//! Each level is a *slot* in the configuration. A slot names where its key, CSR
//! and certificate live on disk, which parent certificate and key sign it, and
//! what goes into the certificate (subject, validity, SANs, usages).
//!
//! # Features
//!
//! - 🔐 **Two key algorithms**: ECDSA P-256 and RSA-4096, chosen per run
//! - 🔗 **Four-tier PKI**: Root, Intermediate, Server and Client in a fixed shape
//! - ♻️ **Idempotent reruns**: existing keys are reused, existing outputs are kept
//!   unless overwrite is requested
//! - ✅ **Up-front validation**: a bad configuration never touches the file system
//!
//! # Quick Start
//!
//! ```bash
//! cargo build --release
//! ./target/release/pki-issuer create hierarchy -y demos/ca.yml -k ecdsa
//! ./target/release/pki-issuer create bundle-chain -y demos/ca.yml -o /tmp/pki/chain.pem
//! ```
//!
//! # Module Overview
//!
//! - [`key_store`]: private key generation, PEM persistence, algorithm checks
//! - [`csr`]: certificate signing requests for chain-signed slots
//! - [`signer`]: certificate templates, self-signing and chain signing
//! - [`config`]: configuration schema and YAML loading
//! - [`validator`]: semantic checks run before any side effect
//! - [`file_store`]: the file-system capability every component writes through
//! - [`operations`]: disk-backed entry points used by the CLI
//! - [`error`]: the error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use pki_issuer::{CaConfig, CertSigner, DiskStore, KeyAlgorithm};
//!
//! fn setup_pki() -> pki_issuer::Result<()> {
//!     let config = CaConfig::from_file("/etc/pki/ca.yml")?;
//!     pki_issuer::validator::validate(&config)?;
//!
//!     let files = DiskStore::new();
//!     let issued = CertSigner::new(&files).sign_hierarchy(&config, KeyAlgorithm::EcdsaP256, false)?;
//!
//!     let verified = pki_issuer::signer::verify_chain(
//!         &issued.server,
//!         &issued.root,
//!         &[issued.intermediate.clone()],
//!     )?;
//!     assert!(verified);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All public APIs return [`Result<T>`] with a [`CertError`]. Compare failures by
//! [`CertError::kind`]:
//!
//! ```no_run
//! use pki_issuer::{operations, ErrorKind, KeyAlgorithm, SlotKind};
//!
//! match operations::sign_certificate(SlotKind::Server, KeyAlgorithm::EcdsaP256, "/etc/pki/ca.yml", false) {
//!     Err(e) if e.kind() == ErrorKind::AlreadyExists => eprintln!("{e}; use --force to overwrite"),
//!     Err(e) => eprintln!("signing failed: {e}"),
//!     Ok(cert) => println!("issued serial {:?}", cert.serial_number().to_bn()),
//! }
//! ```
//!
//! # Security Considerations
//!
//! - Every artifact is written with mode `0600` through a temp file and rename.
//! - Overwriting deletes the old file before the new one is written, so a crash
//!   in between leaves the slot empty rather than half-written.
//! - The root private key lives next to its certificate; move it offline once the
//!   intermediate has been signed.

pub mod config;
pub mod csr;
pub mod error;
pub mod file_store;
pub mod key_store;
pub mod operations;
pub mod signer;
pub mod validator;

pub use config::{CaConfig, CertificateAuthority, CertificateSlot, ExtKeyUsage, KeyUsage, SlotKind};
pub use csr::CsrIssuer;
pub use error::{CertError, ErrorKind, Result};
pub use file_store::{DiskStore, FileStore};
pub use key_store::{KeyAlgorithm, KeyStore, PrivateKey};
pub use signer::{CertSigner, IssuedHierarchy};
