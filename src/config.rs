//! Declarative CA configuration.
//!
//! A configuration describes exactly four certificate slots under a top-level `ca`
//! key. The shape is fixed: root is self-signed, intermediate is signed by root,
//! server and client are signed by intermediate.
//!
//! ```yaml
//! ca:
//!   root:
//!     type: root
//!     cert: /etc/pki/root/root_cert.pem
//!     private_key: /etc/pki/root/root_key.pem
//!     csr: /etc/pki/root/root_csr.pem
//!     is_ca: true
//!     organization: example
//!     common_name: Example Root CA
//!     validity_years: 10
//!     validity_month: 0
//!     validity_day: 0
//!   intermediate: { ... parent_cert/parent_key point at root ... }
//!   server: { ... dns_names: [localhost], ip_addresses: [127.0.0.1] ... }
//!   client: { ... }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::error;

use crate::error::{CertError, Result};
use crate::file_store::{DiskStore, FileStore};

/// Role of a slot within the four-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKind {
    Root,
    Intermediate,
    Server,
    Client,
}

impl SlotKind {
    /// All kinds in signing order (parents before children)
    pub const ALL: [SlotKind; 4] = [
        SlotKind::Root,
        SlotKind::Intermediate,
        SlotKind::Server,
        SlotKind::Client,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SlotKind::Root => "root",
            SlotKind::Intermediate => "intermediate",
            SlotKind::Server => "server",
            SlotKind::Client => "client",
        }
    }

    pub fn is_ca(self) -> bool {
        matches!(self, SlotKind::Root | SlotKind::Intermediate)
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotKind {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "root" => Ok(SlotKind::Root),
            "intermediate" => Ok(SlotKind::Intermediate),
            "server" => Ok(SlotKind::Server),
            "client" => Ok(SlotKind::Client),
            other => Err(CertError::InvalidCertType {
                found: other.to_string(),
                expected: None,
            }),
        }
    }
}

/// X.509 key usage bits that may be requested for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

/// Extended key usage purposes that may be requested for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtKeyUsage {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
}

/// One issuance target: where its artifacts live and what goes into its certificate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateSlot {
    /// Raw `type` value; checked against the slot position by the validator
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "cert", default)]
    pub cert_path: PathBuf,
    #[serde(rename = "private_key", default)]
    pub key_path: PathBuf,
    #[serde(rename = "csr", default)]
    pub csr_path: PathBuf,
    #[serde(rename = "parent_cert", default)]
    pub parent_cert_path: PathBuf,
    #[serde(rename = "parent_key", default)]
    pub parent_key_path: PathBuf,

    #[serde(default)]
    pub is_ca: bool,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub common_name: String,

    #[serde(default)]
    pub validity_years: i32,
    #[serde(default)]
    pub validity_month: i32,
    #[serde(default)]
    pub validity_day: i32,

    /// Explicit key usages; kind defaults apply when omitted
    #[serde(default)]
    pub key_usage: Option<Vec<KeyUsage>>,
    #[serde(default)]
    pub ext_key_usage: Option<Vec<ExtKeyUsage>>,

    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub uris: Vec<String>,
}

impl CertificateSlot {
    /// Parsed slot kind, or [`CertError::InvalidCertType`] for an unknown `type`
    pub fn slot_kind(&self) -> Result<SlotKind> {
        self.kind.parse()
    }

    /// Key usages to put in the certificate
    pub fn effective_key_usage(&self, kind: SlotKind) -> Vec<KeyUsage> {
        if let Some(usages) = &self.key_usage {
            return usages.clone();
        }
        match kind {
            SlotKind::Root | SlotKind::Intermediate => vec![
                KeyUsage::DigitalSignature,
                KeyUsage::KeyCertSign,
                KeyUsage::CrlSign,
            ],
            SlotKind::Server | SlotKind::Client => {
                vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]
            }
        }
    }

    /// Extended key usages to put in the certificate
    pub fn effective_ext_key_usage(&self, kind: SlotKind) -> Vec<ExtKeyUsage> {
        if let Some(usages) = &self.ext_key_usage {
            return usages.clone();
        }
        match kind {
            SlotKind::Root | SlotKind::Intermediate => Vec::new(),
            SlotKind::Server => vec![ExtKeyUsage::ServerAuth],
            SlotKind::Client => vec![ExtKeyUsage::ClientAuth],
        }
    }
}

/// The fixed four-slot hierarchy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateAuthority {
    #[serde(default)]
    pub root: CertificateSlot,
    #[serde(default)]
    pub intermediate: CertificateSlot,
    #[serde(default)]
    pub server: CertificateSlot,
    #[serde(default)]
    pub client: CertificateSlot,
}

impl CertificateAuthority {
    pub fn slot(&self, kind: SlotKind) -> &CertificateSlot {
        match kind {
            SlotKind::Root => &self.root,
            SlotKind::Intermediate => &self.intermediate,
            SlotKind::Server => &self.server,
            SlotKind::Client => &self.client,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaConfig {
    pub ca: CertificateAuthority,
}

impl CaConfig {
    /// Load configuration from a YAML file on the local disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_store(&DiskStore::new(), path.as_ref())
    }

    /// Load configuration through a [`FileStore`]
    pub fn from_store(files: &dyn FileStore, path: &Path) -> Result<Self> {
        let data = files.read(path).inspect_err(|e| {
            error!(path = %path.display(), "failed to read configuration: {e}");
        })?;
        Self::from_yaml(path, &data)
    }

    fn from_yaml(path: &Path, data: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(data).map_err(|source| {
            error!(path = %path.display(), "failed to parse configuration: {source}");
            CertError::Config {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn slot(&self, kind: SlotKind) -> &CertificateSlot {
        self.ca.slot(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE: &str = r#"
ca:
  root:
    type: root
    cert: /pki/root/root_cert.pem
    private_key: /pki/root/root_key.pem
    csr: /pki/root/root_csr.pem
    is_ca: true
    organization: default_ca
    common_name: default_ca
    validity_years: 10
    validity_month: 0
    validity_day: 0
  intermediate:
    type: intermediate
    cert: /pki/intermediate/intermediate_cert.pem
    private_key: /pki/intermediate/intermediate_key.pem
    csr: /pki/intermediate/intermediate_csr.pem
    parent_cert: /pki/root/root_cert.pem
    parent_key: /pki/root/root_key.pem
    is_ca: true
    organization: default_ca
    common_name: default_ca
    validity_years: 10
  server:
    type: server
    cert: /pki/server/server_cert.pem
    private_key: /pki/server/server_key.pem
    csr: /pki/server/server_csr.pem
    parent_cert: /pki/intermediate/intermediate_cert.pem
    parent_key: /pki/intermediate/intermediate_key.pem
    is_ca: false
    organization: default_ca
    common_name: localhost
    validity_years: 1
    dns_names: [localhost]
    ip_addresses: ["127.0.0.1"]
    ext_key_usage: [server_auth, client_auth]
  client:
    type: client
    cert: /pki/client/client_cert.pem
    private_key: /pki/client/client_key.pem
    csr: /pki/client/client_csr.pem
    parent_cert: /pki/intermediate/intermediate_cert.pem
    parent_key: /pki/intermediate/intermediate_key.pem
    organization: default_ca
    common_name: client
    validity_month: 6
"#;

    #[test]
    fn test_parse_sample_config() {
        let cfg = CaConfig::from_yaml(Path::new("sample.yml"), SAMPLE.as_bytes()).unwrap();

        assert_eq!(cfg.ca.root.kind, "root");
        assert!(cfg.ca.root.is_ca);
        assert_eq!(cfg.ca.root.validity_years, 10);
        assert!(cfg.ca.root.parent_cert_path.as_os_str().is_empty());

        assert_eq!(
            cfg.ca.intermediate.parent_cert_path,
            PathBuf::from("/pki/root/root_cert.pem")
        );
        assert_eq!(cfg.ca.server.dns_names, vec!["localhost".to_string()]);
        assert_eq!(cfg.ca.server.ip_addresses, vec!["127.0.0.1".to_string()]);
        assert!(!cfg.ca.client.is_ca);
        assert_eq!(cfg.ca.client.validity_month, 6);
        assert_eq!(cfg.slot(SlotKind::Client).common_name, "client");
    }

    #[test]
    fn test_usage_defaults_and_overrides() {
        let cfg = CaConfig::from_yaml(Path::new("sample.yml"), SAMPLE.as_bytes()).unwrap();

        assert!(cfg
            .ca
            .root
            .effective_key_usage(SlotKind::Root)
            .contains(&KeyUsage::KeyCertSign));
        assert_eq!(
            cfg.ca.server.effective_ext_key_usage(SlotKind::Server),
            vec![ExtKeyUsage::ServerAuth, ExtKeyUsage::ClientAuth]
        );
        assert_eq!(
            cfg.ca.client.effective_ext_key_usage(SlotKind::Client),
            vec![ExtKeyUsage::ClientAuth]
        );
    }

    #[test]
    fn test_load_from_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ca.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let cfg = CaConfig::from_store(&DiskStore::new(), &path).unwrap();
        assert_eq!(cfg.ca.server.common_name, "localhost");

        let err = CaConfig::from_file(tmp.path().join("absent.yml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = CaConfig::from_yaml(Path::new("bad.yml"), b"ca: [unclosed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_slot_kind_parse() {
        assert_eq!("server".parse::<SlotKind>().unwrap(), SlotKind::Server);
        let err = "leaf".parse::<SlotKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCertType);
    }
}
