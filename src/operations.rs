//! Boundary operations.
//!
//! Thin entry points over the components, operating on the local disk. These are
//! what the command-line front end calls; library users who need a different
//! [`FileStore`] can drive [`KeyStore`], [`CsrIssuer`] and [`CertSigner`] directly.

use std::path::Path;

use openssl::x509::{X509Req, X509};
use tracing::{error, info, warn};

use crate::config::{CaConfig, CertificateSlot, SlotKind};
use crate::csr::CsrIssuer;
use crate::error::{Artifact, CertError, Result};
use crate::file_store::{DiskStore, FileStore};
use crate::key_store::{KeyAlgorithm, KeyStore, PrivateKey};
use crate::signer::{CertSigner, IssuedHierarchy};
use crate::validator;

/// Read the configuration at `config_path` and run the validator over it.
pub fn load_and_validate(config_path: impl AsRef<Path>) -> Result<CaConfig> {
    let config_path = config_path.as_ref();
    info!(path = %config_path.display(), "loading configuration");
    let config = CaConfig::from_store(&DiskStore::new(), config_path)?;
    validator::validate(&config)?;
    Ok(config)
}

pub fn generate_private_key(
    path: impl AsRef<Path>,
    algorithm: KeyAlgorithm,
    overwrite: bool,
) -> Result<PrivateKey> {
    let files = DiskStore::new();
    KeyStore::new(&files).generate(path.as_ref(), algorithm, overwrite)
}

pub fn issue_csr(
    slot: &CertificateSlot,
    algorithm: KeyAlgorithm,
    overwrite: bool,
) -> Result<X509Req> {
    let files = DiskStore::new();
    CsrIssuer::new(&files).issue(slot, algorithm, overwrite)
}

/// Issue the CSR of one chain-signed slot named in the configuration file.
///
/// The root slot is self-signed and has no CSR, so asking for it is an
/// [`CertError::InvalidCertType`].
pub fn issue_csr_from_file(
    kind: SlotKind,
    algorithm: KeyAlgorithm,
    config_path: impl AsRef<Path>,
    overwrite: bool,
) -> Result<X509Req> {
    if kind == SlotKind::Root {
        return Err(CertError::InvalidCertType {
            found: kind.to_string(),
            expected: None,
        });
    }
    let config = load_and_validate(config_path)?;
    issue_csr(config.slot(kind), algorithm, overwrite)
}

/// Sign the certificate of one slot named in the configuration file.
pub fn sign_certificate(
    kind: SlotKind,
    algorithm: KeyAlgorithm,
    config_path: impl AsRef<Path>,
    overwrite: bool,
) -> Result<X509> {
    let config = load_and_validate(config_path)?;
    let files = DiskStore::new();
    CertSigner::new(&files).sign(config.slot(kind), algorithm, overwrite)
}

/// Sign all four slots of the configuration file, parents first.
pub fn sign_hierarchy_from_file(
    algorithm: KeyAlgorithm,
    config_path: impl AsRef<Path>,
    overwrite: bool,
) -> Result<IssuedHierarchy> {
    let config = load_and_validate(config_path)?;
    let files = DiskStore::new();
    CertSigner::new(&files).sign_hierarchy(&config, algorithm, overwrite)
}

/// Concatenate the intermediate and root certificates into a single PEM bundle.
///
/// The bytes are copied as written; a newline is inserted between the two
/// certificates only when the first does not already end with one.
pub fn bundle_chain(
    config_path: impl AsRef<Path>,
    out: impl AsRef<Path>,
    overwrite: bool,
) -> Result<()> {
    let out = out.as_ref();
    let config = load_and_validate(config_path)?;
    let files = DiskStore::new();

    if files.exists(out) {
        if !overwrite {
            error!(path = %out.display(), "bundle already exists");
            return Err(CertError::AlreadyExists {
                artifact: Artifact::Bundle,
                path: out.to_path_buf(),
            });
        }
        warn!(path = %out.display(), "bundle already exists, overwriting");
        files.delete(out)?;
    }

    let mut bundle = Vec::new();
    for kind in [SlotKind::Intermediate, SlotKind::Root] {
        let data = files.read(&config.slot(kind).cert_path)?;
        if !bundle.is_empty() && !bundle.ends_with(b"\n") {
            bundle.push(b'\n');
        }
        bundle.extend_from_slice(&data);
    }

    files.ensure_dir(out)?;
    files.write(out, &bundle)?;
    info!(path = %out.display(), "certificate chain bundled");
    Ok(())
}
