//! Certificate Signing Request Module
//!
//! Builds, persists and reloads the CSRs that chain-signed slots (intermediate,
//! server and client) submit to their parent authority.
//!
//! # Issuance Flow
//! ```text
//! CSR exists? ──yes──► overwrite? ──no──► AlreadyExists
//!     │                    │
//!     no                  yes (delete old CSR)
//!     ▼                    ▼
//! key exists? ──yes──► load key, require requested algorithm
//!     │
//!     no ──► generate key
//!     ▼
//! subject (O, CN) + public key ──► sign with key (SHA-256) ──► PEM ──► write
//!     ▼
//! re-parse written bytes and return them
//! ```
//!
//! A CSR read back from disk is only trusted once its signature verifies against
//! the public key it carries.

use std::path::Path;

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::{X509NameBuilder, X509Req};
use tracing::{error, info, warn};

use crate::config::CertificateSlot;
use crate::error::{Artifact, CertError, Result};
use crate::file_store::FileStore;
use crate::key_store::{KeyAlgorithm, KeyStore};

const CSR_PEM_LABEL: &str = "CERTIFICATE REQUEST";
const X509_REQ_VERSION_1: i32 = 0;

/// Issues and loads certificate signing requests.
pub struct CsrIssuer<'a> {
    files: &'a dyn FileStore,
    keys: KeyStore<'a>,
}

impl<'a> CsrIssuer<'a> {
    pub fn new(files: &'a dyn FileStore) -> Self {
        Self {
            files,
            keys: KeyStore::new(files),
        }
    }

    /// Create a CSR for `slot`, creating its private key when absent.
    ///
    /// # Errors
    /// - [`CertError::AlreadyExists`] if the CSR file exists and `overwrite` is false
    /// - [`CertError::TypeMismatch`] if the existing key is not of `algorithm`
    /// - [`CertError::Crypto`] if building or signing the request fails
    /// - [`CertError::FileIo`] on any file-system failure
    pub fn issue(
        &self,
        slot: &CertificateSlot,
        algorithm: KeyAlgorithm,
        overwrite: bool,
    ) -> Result<X509Req> {
        let csr_path = slot.csr_path.as_path();
        info!(path = %csr_path.display(), kind = %slot.kind, "creating CSR");

        if self.files.exists(csr_path) {
            if !overwrite {
                error!(path = %csr_path.display(), "CSR already exists");
                return Err(CertError::AlreadyExists {
                    artifact: Artifact::Csr,
                    path: csr_path.to_path_buf(),
                });
            }
            warn!(path = %csr_path.display(), "CSR already exists, overwriting");
            self.files.delete(csr_path)?;
        }

        let key = self
            .keys
            .load_or_generate(&slot.key_path, algorithm, overwrite)?;
        let pkey = key.to_pkey()?;

        let mut name_builder =
            X509NameBuilder::new().map_err(CertError::crypto("failed to create name builder"))?;
        name_builder
            .append_entry_by_nid(Nid::ORGANIZATIONNAME, &slot.organization)
            .map_err(CertError::crypto("failed to set organization"))?;
        name_builder
            .append_entry_by_nid(Nid::COMMONNAME, &slot.common_name)
            .map_err(CertError::crypto("failed to set CN"))?;
        let subject = name_builder.build();

        let mut builder =
            X509Req::builder().map_err(CertError::crypto("failed to create CSR builder"))?;
        builder
            .set_version(X509_REQ_VERSION_1)
            .map_err(CertError::crypto("failed to set CSR version"))?;
        builder
            .set_subject_name(&subject)
            .map_err(CertError::crypto("failed to set subject"))?;
        builder
            .set_pubkey(&pkey)
            .map_err(CertError::crypto("failed to set public key"))?;
        builder
            .sign(&pkey, MessageDigest::sha256())
            .map_err(CertError::crypto("failed to sign CSR"))?;

        let pem = builder
            .build()
            .to_pem()
            .map_err(CertError::crypto("failed to encode CSR"))?;

        self.files.ensure_dir(csr_path)?;
        self.files.write(csr_path, &pem)?;
        info!(path = %csr_path.display(), "CSR created");

        parse_csr(csr_path, &pem)
    }

    /// Read a CSR from `path` and verify its self-signature.
    ///
    /// # Errors
    /// - [`CertError::FileIo`] if the file cannot be read
    /// - [`CertError::Decode`] if it is not a PEM `CERTIFICATE REQUEST`
    /// - [`CertError::SignatureInvalid`] if the signature does not verify
    pub fn load(&self, path: &Path) -> Result<X509Req> {
        let data = self.files.read(path)?;
        parse_csr(path, &data)
    }
}

/// Decode a PEM CSR and check it against its own public key.
pub fn parse_csr(path: &Path, data: &[u8]) -> Result<X509Req> {
    let block = pem::parse(data).map_err(|e| CertError::decode("read CSR", path, e))?;
    if block.tag() != CSR_PEM_LABEL {
        return Err(CertError::decode(
            "read CSR",
            path,
            format!("invalid PEM type: {}", block.tag()),
        ));
    }

    let req = X509Req::from_der(block.contents())
        .map_err(|e| CertError::decode("read CSR", path, e))?;
    let public_key = req
        .public_key()
        .map_err(|e| CertError::decode("read CSR", path, e))?;

    // An error from verify means the signature could not be checked at all
    match req.verify(&public_key) {
        Ok(true) => Ok(req),
        Ok(false) | Err(_) => {
            error!(path = %path.display(), "CSR signature verification failed");
            Err(CertError::SignatureInvalid {
                path: path.to_path_buf(),
            })
        }
    }
}
