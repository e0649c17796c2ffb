//! Error taxonomy for the issuance pipeline.
//!
//! Every public operation returns [`Result<T>`], which wraps [`CertError`]. Callers
//! compare failures by [`ErrorKind`] rather than by message text:
//!
//! ```no_run
//! use pki_issuer::{ErrorKind, KeyAlgorithm};
//! use pki_issuer::operations::generate_private_key;
//!
//! match generate_private_key("/etc/pki/root.key", KeyAlgorithm::EcdsaP256, false) {
//!     Ok(_) => println!("key written"),
//!     Err(e) if e.kind() == ErrorKind::AlreadyExists => println!("use --force to overwrite"),
//!     Err(e) => println!("failed: {e}"),
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::SlotKind;
use crate::key_store::KeyAlgorithm;

/// Which on-disk artifact an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    PrivateKey,
    Csr,
    Certificate,
    Bundle,
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Artifact::PrivateKey => "private key",
            Artifact::Csr => "CSR",
            Artifact::Certificate => "certificate",
            Artifact::Bundle => "bundle",
        };
        f.write_str(name)
    }
}

/// Coarse classification of an I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFailure {
    NotFound,
    PermissionDenied,
    Other,
}

impl From<io::ErrorKind> for IoFailure {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => IoFailure::NotFound,
            io::ErrorKind::PermissionDenied => IoFailure::PermissionDenied,
            _ => IoFailure::Other,
        }
    }
}

impl std::fmt::Display for IoFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoFailure::NotFound => f.write_str(": file not found"),
            IoFailure::PermissionDenied => f.write_str(": permission denied"),
            IoFailure::Other => Ok(()),
        }
    }
}

/// Closed set of error kinds, used for comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    TypeMismatch,
    Decode,
    UnsupportedKeyType,
    SignatureInvalid,
    MissingField,
    InvalidPeriod,
    InvalidPath,
    InvalidIp,
    InvalidUri,
    InvalidCaFlag,
    InvalidCertType,
    FileIo,
    Crypto,
    Config,
}

/// Error type for all issuance operations.
#[derive(Debug, Error)]
pub enum CertError {
    /// Output artifact is present and overwrite was not requested
    #[error("{artifact} already exists at {}", .path.display())]
    AlreadyExists { artifact: Artifact, path: PathBuf },

    /// On-disk key algorithm differs from the requested one
    #[error("private key type: {found} is not same as the specified key type: {expected}")]
    TypeMismatch {
        found: KeyAlgorithm,
        expected: KeyAlgorithm,
    },

    /// Malformed PEM or DER structure
    #[error("{op}: failed to decode {}: {reason}", .path.display())]
    Decode {
        op: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// PEM label is not one of the supported private key labels
    #[error("unsupported private key type: {label}")]
    UnsupportedKeyType { label: String },

    /// CSR signature does not verify against its embedded public key
    #[error("CSR signature verification failed for {}", .path.display())]
    SignatureInvalid { path: PathBuf },

    #[error("{slot} certificate: missing required field: {field}")]
    MissingField { slot: SlotKind, field: &'static str },

    #[error("{slot} certificate: invalid validity period")]
    InvalidPeriod { slot: SlotKind },

    #[error("invalid path '{}': {reason}", .path.display())]
    InvalidPath {
        path: PathBuf,
        reason: &'static str,
    },

    #[error("{slot} certificate: invalid IP address: {value}")]
    InvalidIp { slot: SlotKind, value: String },

    #[error("{slot} certificate: invalid URI: {value}")]
    InvalidUri { slot: SlotKind, value: String },

    /// CA flag contradicts the slot's role in the hierarchy
    #[error("{slot} certificate: is_ca must be {expected}")]
    InvalidCaFlag { slot: SlotKind, expected: bool },

    /// Slot type outside the four-value enumeration, or in the wrong position
    #[error("invalid certificate type '{found}'{}", position_suffix(.expected))]
    InvalidCertType {
        found: String,
        expected: Option<SlotKind>,
    },

    #[error("{op}{failure}: {}: {source}", .path.display())]
    FileIo {
        op: &'static str,
        path: PathBuf,
        failure: IoFailure,
        #[source]
        source: io::Error,
    },

    #[error("{op}: {source}")]
    Crypto {
        op: &'static str,
        #[source]
        source: openssl::error::ErrorStack,
    },

    /// Configuration file could not be parsed
    #[error("failed to parse configuration {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn position_suffix(expected: &Option<SlotKind>) -> String {
    match expected {
        Some(kind) => format!(", expected '{kind}'"),
        None => String::new(),
    }
}

impl CertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            CertError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            CertError::Decode { .. } => ErrorKind::Decode,
            CertError::UnsupportedKeyType { .. } => ErrorKind::UnsupportedKeyType,
            CertError::SignatureInvalid { .. } => ErrorKind::SignatureInvalid,
            CertError::MissingField { .. } => ErrorKind::MissingField,
            CertError::InvalidPeriod { .. } => ErrorKind::InvalidPeriod,
            CertError::InvalidPath { .. } => ErrorKind::InvalidPath,
            CertError::InvalidIp { .. } => ErrorKind::InvalidIp,
            CertError::InvalidUri { .. } => ErrorKind::InvalidUri,
            CertError::InvalidCaFlag { .. } => ErrorKind::InvalidCaFlag,
            CertError::InvalidCertType { .. } => ErrorKind::InvalidCertType,
            CertError::FileIo { .. } => ErrorKind::FileIo,
            CertError::Crypto { .. } => ErrorKind::Crypto,
            CertError::Config { .. } => ErrorKind::Config,
        }
    }

    /// True when rerunning with overwrite enabled would get past this error.
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    pub(crate) fn file_io(op: &'static str, path: &Path, source: io::Error) -> Self {
        CertError::FileIo {
            op,
            path: path.to_path_buf(),
            failure: source.kind().into(),
            source,
        }
    }

    pub(crate) fn decode(op: &'static str, path: &Path, reason: impl ToString) -> Self {
        CertError::Decode {
            op,
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn crypto(op: &'static str) -> impl FnOnce(openssl::error::ErrorStack) -> Self {
        move |source| CertError::Crypto { op, source }
    }
}

/// Result alias for issuance operations.
pub type Result<T> = std::result::Result<T, CertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_names_both_algorithms() {
        let err = CertError::TypeMismatch {
            found: KeyAlgorithm::EcdsaP256,
            expected: KeyAlgorithm::Rsa4096,
        };
        assert_eq!(
            err.to_string(),
            "private key type: ECDSA is not same as the specified key type: RSA"
        );
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_file_io_distinguishes_not_found() {
        let source = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = CertError::file_io("read certificate", Path::new("/tmp/x.pem"), source);
        assert!(matches!(
            err,
            CertError::FileIo {
                failure: IoFailure::NotFound,
                ..
            }
        ));
        assert!(err.to_string().starts_with("read certificate: file not found"));
    }

    #[test]
    fn test_already_exists_is_distinguishable() {
        let err = CertError::AlreadyExists {
            artifact: Artifact::Certificate,
            path: PathBuf::from("/tmp/cert.pem"),
        };
        assert!(err.is_already_exists());
        let other = CertError::InvalidPeriod {
            slot: SlotKind::Root,
        };
        assert!(!other.is_already_exists());
    }
}
