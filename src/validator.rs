//! Configuration validation.
//!
//! Runs before any key, CSR or certificate operation so that a bad configuration
//! never causes a file-system side effect. Slots are checked in hierarchy order
//! (root, intermediate, server, client) and the first violation is returned.
//!
//! # Rules
//! - The slot `type` matches its position in the hierarchy
//! - Root and intermediate are CAs; server and client are not
//! - Intermediate names a parent certificate
//! - Chain-signed slots name a parent certificate, parent key and CSR path
//! - Server carries at least one DNS name or IP address
//! - Every slot has a common name, organization, key path and certificate path
//! - Validity components are non-negative
//! - Paths are absolute and free of `<>:"|?*`
//! - IP addresses parse as IPv4 or IPv6 literals
//! - URIs contain at least one `.`
//!
//! The URI rule is a weak heuristic, not URI grammar validation.

use std::net::IpAddr;
use std::path::Path;

use tracing::{debug, error};

use crate::config::{CaConfig, CertificateSlot, SlotKind};
use crate::error::{CertError, Result};

const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Validate the whole hierarchy, returning the first violation found.
pub fn validate(config: &CaConfig) -> Result<()> {
    for kind in SlotKind::ALL {
        validate_slot(kind, config.slot(kind)).inspect_err(|e| {
            error!(slot = %kind, "configuration rejected: {e}");
        })?;
    }
    debug!("configuration validated");
    Ok(())
}

/// Validate one slot against the role it plays in the hierarchy.
pub fn validate_slot(position: SlotKind, slot: &CertificateSlot) -> Result<()> {
    if slot.kind != position.as_str() {
        return Err(CertError::InvalidCertType {
            found: slot.kind.clone(),
            expected: Some(position),
        });
    }

    let expected_ca = position.is_ca();
    if slot.is_ca != expected_ca {
        return Err(CertError::InvalidCaFlag {
            slot: position,
            expected: expected_ca,
        });
    }

    match position {
        SlotKind::Intermediate if is_empty(&slot.parent_cert_path) => {
            return Err(CertError::MissingField {
                slot: position,
                field: "parent_cert",
            });
        }
        SlotKind::Server => {
            let has_dns = slot.dns_names.iter().any(|n| !n.trim().is_empty());
            let has_ip = slot.ip_addresses.iter().any(|ip| !ip.trim().is_empty());
            if !has_dns && !has_ip {
                return Err(CertError::MissingField {
                    slot: position,
                    field: "dns_names or ip_addresses",
                });
            }
        }
        _ => {}
    }

    if position != SlotKind::Root {
        let chain_fields = [
            (&slot.parent_cert_path, "parent_cert"),
            (&slot.parent_key_path, "parent_key"),
            (&slot.csr_path, "csr"),
        ];
        if let Some((_, field)) = chain_fields.into_iter().find(|(path, _)| is_empty(path)) {
            return Err(CertError::MissingField {
                slot: position,
                field,
            });
        }
    }

    validate_common_fields(position, slot)
}

fn validate_common_fields(slot_kind: SlotKind, slot: &CertificateSlot) -> Result<()> {
    let missing = |field| CertError::MissingField {
        slot: slot_kind,
        field,
    };

    if slot.common_name.is_empty() {
        return Err(missing("common_name"));
    }
    if slot.organization.is_empty() {
        return Err(missing("organization"));
    }
    if slot.validity_years < 0 || slot.validity_month < 0 || slot.validity_day < 0 {
        return Err(CertError::InvalidPeriod { slot: slot_kind });
    }
    if is_empty(&slot.key_path) {
        return Err(missing("private_key"));
    }
    if is_empty(&slot.cert_path) {
        return Err(missing("cert"));
    }

    validate_file_path(&slot.key_path)?;
    validate_file_path(&slot.cert_path)?;
    for optional in [&slot.csr_path, &slot.parent_cert_path, &slot.parent_key_path] {
        if !is_empty(optional) {
            validate_file_path(optional)?;
        }
    }

    for ip in &slot.ip_addresses {
        if ip.trim().parse::<IpAddr>().is_err() {
            return Err(CertError::InvalidIp {
                slot: slot_kind,
                value: ip.clone(),
            });
        }
    }

    for uri in &slot.uris {
        if !uri.contains('.') {
            return Err(CertError::InvalidUri {
                slot: slot_kind,
                value: uri.clone(),
            });
        }
    }

    Ok(())
}

/// Paths must be non-empty, absolute and free of characters rejected by common filesystems.
pub fn validate_file_path(path: &Path) -> Result<()> {
    let invalid = |reason| CertError::InvalidPath {
        path: path.to_path_buf(),
        reason,
    };

    if is_empty(path) {
        return Err(invalid("path is empty"));
    }
    if path.to_string_lossy().contains(INVALID_PATH_CHARS) {
        return Err(invalid("path contains invalid characters"));
    }
    if !path.is_absolute() {
        return Err(invalid("path must be absolute"));
    }
    Ok(())
}

fn is_empty(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CertificateAuthority;
    use crate::error::ErrorKind;
    use std::path::PathBuf;

    fn slot(kind: SlotKind) -> CertificateSlot {
        let dir = format!("/pki/{kind}");
        let parent = match kind {
            SlotKind::Root => None,
            SlotKind::Intermediate => Some("root"),
            SlotKind::Server | SlotKind::Client => Some("intermediate"),
        };
        CertificateSlot {
            kind: kind.as_str().to_string(),
            cert_path: PathBuf::from(format!("{dir}/{kind}_cert.pem")),
            key_path: PathBuf::from(format!("{dir}/{kind}_key.pem")),
            csr_path: PathBuf::from(format!("{dir}/{kind}_csr.pem")),
            parent_cert_path: parent
                .map(|p| PathBuf::from(format!("/pki/{p}/{p}_cert.pem")))
                .unwrap_or_default(),
            parent_key_path: parent
                .map(|p| PathBuf::from(format!("/pki/{p}/{p}_key.pem")))
                .unwrap_or_default(),
            is_ca: kind.is_ca(),
            organization: "default_ca".to_string(),
            common_name: format!("{kind}.example.com"),
            validity_years: 10,
            dns_names: if kind == SlotKind::Server {
                vec!["localhost".to_string()]
            } else {
                Vec::new()
            },
            ip_addresses: if kind == SlotKind::Server {
                vec!["127.0.0.1".to_string()]
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }

    fn config() -> CaConfig {
        CaConfig {
            ca: CertificateAuthority {
                root: slot(SlotKind::Root),
                intermediate: slot(SlotKind::Intermediate),
                server: slot(SlotKind::Server),
                client: slot(SlotKind::Client),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&config()).is_ok());
    }

    #[test]
    fn test_server_marked_as_ca_is_rejected() {
        let mut cfg = config();
        cfg.ca.server.is_ca = true;
        let err = validate(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCaFlag);
        assert!(err.to_string().starts_with("server certificate"));
    }

    #[test]
    fn test_root_must_be_ca() {
        let mut cfg = config();
        cfg.ca.root.is_ca = false;
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidCaFlag);
    }

    #[test]
    fn test_empty_common_name_is_missing_field() {
        let mut cfg = config();
        cfg.ca.client.common_name.clear();
        let err = validate(&cfg).unwrap_err();
        assert!(matches!(
            err,
            CertError::MissingField {
                slot: SlotKind::Client,
                field: "common_name"
            }
        ));
    }

    #[test]
    fn test_kind_must_match_position() {
        let mut cfg = config();
        cfg.ca.intermediate.kind = "server".to_string();
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidCertType);

        let mut cfg = config();
        cfg.ca.root.kind = "leaf".to_string();
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidCertType);
    }

    #[test]
    fn test_intermediate_requires_parent_cert() {
        let mut cfg = config();
        cfg.ca.intermediate.parent_cert_path = PathBuf::new();
        let err = validate(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
    }

    #[test]
    fn test_server_requires_san() {
        let mut cfg = config();
        cfg.ca.server.dns_names = vec![String::new()];
        cfg.ca.server.ip_addresses.clear();
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::MissingField);

        let mut cfg = config();
        cfg.ca.server.dns_names.clear();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_chain_signed_slots_require_parent_key_and_csr() {
        let mut cfg = config();
        cfg.ca.client.parent_key_path = PathBuf::new();
        let err = validate(&cfg).unwrap_err();
        assert!(matches!(
            err,
            CertError::MissingField {
                slot: SlotKind::Client,
                field: "parent_key"
            }
        ));

        let mut cfg = config();
        cfg.ca.server.csr_path = PathBuf::new();
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::MissingField);

        // Root is self-signed and needs neither
        let mut cfg = config();
        cfg.ca.root.csr_path = PathBuf::new();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_negative_validity_is_rejected() {
        let mut cfg = config();
        cfg.ca.root.validity_day = -1;
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidPeriod);
    }

    #[test]
    fn test_relative_and_bad_paths_are_rejected() {
        let mut cfg = config();
        cfg.ca.server.cert_path = PathBuf::from("./server_cert.pem");
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidPath);

        let mut cfg = config();
        cfg.ca.client.key_path = PathBuf::from("/pki/client/key?.pem");
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidPath);

        let mut cfg = config();
        cfg.ca.client.key_path = PathBuf::new();
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::MissingField);
    }

    #[test]
    fn test_ip_and_uri_checks() {
        let mut cfg = config();
        cfg.ca.server.ip_addresses.push("300.1.1.1".to_string());
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidIp);

        let mut cfg = config();
        cfg.ca.server.ip_addresses.push("::1".to_string());
        cfg.ca.server.uris.push("spiffe.example".to_string());
        assert!(validate(&cfg).is_ok());

        let mut cfg = config();
        cfg.ca.client.uris.push("localhost".to_string());
        assert_eq!(validate(&cfg).unwrap_err().kind(), ErrorKind::InvalidUri);
    }

    #[test]
    fn test_first_violation_wins() {
        let mut cfg = config();
        cfg.ca.root.common_name.clear();
        cfg.ca.server.is_ca = true;
        let err = validate(&cfg).unwrap_err();
        assert!(matches!(
            err,
            CertError::MissingField {
                slot: SlotKind::Root,
                ..
            }
        ));
    }
}
