//! Certificate Signing Module
//!
//! Produces the X.509v3 certificates of the four-level hierarchy. Each call to
//! [`CertSigner::sign`] walks one slot through a fixed sequence of states:
//!
//! ```text
//! 1. existence check   cert present? overwrite ? delete : AlreadyExists
//! 2. template          serial, validity window, subject, usages, CA flag, SANs
//! 3. signing mode
//!    ├── root          key (load or generate) signs its own template
//!    └── chain-signed  CSR (load or issue) + parent cert + parent key
//! 4. persistence       PEM encode, create directory, write
//! 5. parse-back        re-read the written bytes and return them
//! ```
//!
//! # PKI Hierarchy
//! ```text
//! Root CA (self-signed, pathlen=1)
//!   └── Intermediate CA (signed by Root, pathlen=0)
//!       ├── Server certificate (signed by Intermediate, CA=false)
//!       └── Client certificate (signed by Intermediate, CA=false)
//! ```
//!
//! # Certificate Properties
//! - **Version**: X.509v3
//! - **Serial Number**: Random 128-bit number
//! - **Signature Algorithm**: SHA-256 with the signer's key (ECDSA or RSA)
//! - **Validity**: `now` to `now + years + months + days`, calendar arithmetic
//! - **Basic Constraints**: critical, CA flag from the slot
//! - **Key Usage / Extended Key Usage**: from the slot, or kind defaults
//! - **Subject Key Identifier**: always; **Authority Key Identifier**: chain-signed only
//! - **Subject Alternative Name**: DNS names, IP addresses and URIs of the slot
//!
//! Nothing is rolled back on failure. A key generated in step 3 stays on disk even
//! if signing fails afterwards.

use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, PKeyRef, Private};
use openssl::stack::Stack;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage as KeyUsageExt,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Name, X509NameBuilder, X509NameRef, X509Ref, X509StoreContext, X509};
use tracing::{error, info, warn};

use crate::config::{CaConfig, CertificateSlot, ExtKeyUsage, KeyUsage, SlotKind};
use crate::csr::CsrIssuer;
use crate::error::{Artifact, CertError, Result};
use crate::file_store::FileStore;
use crate::key_store::{assert_public_key_type, KeyAlgorithm, KeyStore};
use crate::validator;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const SERIAL_BITS: i32 = 128;
const ROOT_CA_PATH_LENGTH: u32 = 1;
const INTERMEDIATE_CA_PATH_LENGTH: u32 = 0; // Can only sign end-entity certs, not other CAs
const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// Subject alternative names that survived parsing.
///
/// Entries that fail to parse are dropped with a warning instead of failing the
/// signing operation. The validator rejects the same entries up front, so a
/// drop only happens when a slot is signed without validation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SanEntries {
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
}

impl SanEntries {
    pub fn from_slot(slot: &CertificateSlot) -> Self {
        let dns_names = slot
            .dns_names
            .iter()
            .filter(|name| {
                let keep = !name.trim().is_empty();
                if !keep {
                    warn!("dropping empty DNS name from subject alternative names");
                }
                keep
            })
            .cloned()
            .collect();

        let ip_addresses = slot
            .ip_addresses
            .iter()
            .filter_map(|ip| match ip.trim().parse::<IpAddr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!(value = %ip, "dropping unparsable IP address from subject alternative names");
                    None
                }
            })
            .collect();

        let uris = slot
            .uris
            .iter()
            .filter_map(|uri| {
                let parsed = parse_uri(uri);
                if parsed.is_none() {
                    warn!(value = %uri, "dropping unparsable URI from subject alternative names");
                }
                parsed
            })
            .collect();

        Self {
            dns_names,
            ip_addresses,
            uris,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dns_names.is_empty() && self.ip_addresses.is_empty() && self.uris.is_empty()
    }
}

/// Absolute URIs (`scheme://...`) are kept as written; anything else is treated as a
/// bare host and rendered as the network-path reference `//host`.
fn parse_uri(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return None;
    }

    if let Some((scheme, rest)) = raw.split_once("://") {
        let valid_scheme = scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        return (valid_scheme && !rest.is_empty()).then(|| raw.to_string());
    }

    let valid_host = raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | ':' | '[' | ']'));
    valid_host.then(|| format!("//{raw}"))
}

/// Compute `notAfter` from `not_before` and the slot's validity components.
///
/// Years and months are added to the year and month fields keeping the original
/// day number. A day past the end of the target month rolls over into the next
/// month (Jan 31 + 1 month = Mar 2 or 3), then `days` are added.
pub fn validity_end(
    not_before: DateTime<Utc>,
    kind: SlotKind,
    years: i32,
    months: i32,
    days: i32,
) -> Result<DateTime<Utc>> {
    let invalid = || CertError::InvalidPeriod { slot: kind };
    if years < 0 || months < 0 || days < 0 {
        return Err(invalid());
    }

    let month_index = i64::from(not_before.month0()) + i64::from(months);
    let year = i64::from(not_before.year()) + i64::from(years) + month_index / 12;
    let year = i32::try_from(year).map_err(|_| invalid())?;
    let month = u32::try_from(month_index % 12).map_err(|_| invalid())? + 1;

    // Days past the first of the target month, including the overflow
    let offset = u64::from(not_before.day() - 1) + u64::from(days.unsigned_abs());

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_days(Days::new(offset)))
        .map(|date| date.and_time(not_before.time()).and_utc())
        .ok_or_else(invalid)
}

/// Everything that goes into a certificate except its public key and issuer.
struct CertificateTemplate {
    kind: SlotKind,
    serial: BigNum,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject: X509Name,
    is_ca: bool,
    key_usage: Vec<KeyUsage>,
    ext_key_usage: Vec<ExtKeyUsage>,
    san: SanEntries,
}

impl CertificateTemplate {
    fn from_slot(kind: SlotKind, slot: &CertificateSlot) -> Result<Self> {
        // Generate random 128-bit (16-byte) serial number
        let mut serial = BigNum::new().map_err(CertError::crypto("failed to allocate serial"))?;
        serial
            .rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)
            .map_err(CertError::crypto("failed to generate serial"))?;

        let not_before = Utc::now();
        let not_after = validity_end(
            not_before,
            kind,
            slot.validity_years,
            slot.validity_month,
            slot.validity_day,
        )?;

        let mut name_builder =
            X509NameBuilder::new().map_err(CertError::crypto("failed to create name builder"))?;
        name_builder
            .append_entry_by_nid(Nid::ORGANIZATIONNAME, &slot.organization)
            .map_err(CertError::crypto("failed to set organization"))?;
        name_builder
            .append_entry_by_nid(Nid::COMMONNAME, &slot.common_name)
            .map_err(CertError::crypto("failed to set CN"))?;

        Ok(Self {
            kind,
            serial,
            not_before,
            not_after,
            subject: name_builder.build(),
            is_ca: slot.is_ca,
            key_usage: slot.effective_key_usage(kind),
            ext_key_usage: slot.effective_ext_key_usage(kind),
            san: SanEntries::from_slot(slot),
        })
    }

    /// Sign the template for `subject_key`.
    ///
    /// `issuer` is `None` for a self-signed certificate, in which case the
    /// template subject is also the issuer name.
    fn sign<T: HasPublic>(
        &self,
        subject_key: &PKeyRef<T>,
        issuer: Option<&X509Ref>,
        signing_key: &PKeyRef<Private>,
    ) -> Result<X509> {
        let mut builder =
            X509::builder().map_err(CertError::crypto("failed to create X509 builder"))?;

        builder
            .set_version(X509_VERSION_3)
            .map_err(CertError::crypto("failed to set version"))?;

        let asn1_serial = self
            .serial
            .to_asn1_integer()
            .map_err(CertError::crypto("failed to encode serial"))?;
        builder
            .set_serial_number(&asn1_serial)
            .map_err(CertError::crypto("failed to set serial"))?;

        builder
            .set_subject_name(&self.subject)
            .map_err(CertError::crypto("failed to set subject"))?;
        let issuer_name: &X509NameRef = match issuer {
            Some(parent) => parent.subject_name(),
            None => &self.subject,
        };
        builder
            .set_issuer_name(issuer_name)
            .map_err(CertError::crypto("failed to set issuer"))?;

        let not_before = Asn1Time::from_unix(self.not_before.timestamp())
            .map_err(CertError::crypto("failed to create not_before"))?;
        builder
            .set_not_before(&not_before)
            .map_err(CertError::crypto("failed to set not_before"))?;
        let not_after = Asn1Time::from_unix(self.not_after.timestamp())
            .map_err(CertError::crypto("failed to create not_after"))?;
        builder
            .set_not_after(&not_after)
            .map_err(CertError::crypto("failed to set not_after"))?;

        builder
            .set_pubkey(subject_key)
            .map_err(CertError::crypto("failed to set public key"))?;

        let mut bc = BasicConstraints::new();
        bc.critical();
        if self.is_ca {
            bc.ca();
            match self.kind {
                SlotKind::Root => {
                    bc.pathlen(ROOT_CA_PATH_LENGTH);
                }
                SlotKind::Intermediate => {
                    bc.pathlen(INTERMEDIATE_CA_PATH_LENGTH);
                }
                SlotKind::Server | SlotKind::Client => {}
            }
        }
        let bc = bc
            .build()
            .map_err(CertError::crypto("failed to build BasicConstraints"))?;
        builder
            .append_extension(bc)
            .map_err(CertError::crypto("failed to add BasicConstraints"))?;

        if !self.key_usage.is_empty() {
            let mut ku = KeyUsageExt::new();
            ku.critical();
            for usage in &self.key_usage {
                match usage {
                    KeyUsage::DigitalSignature => ku.digital_signature(),
                    KeyUsage::NonRepudiation => ku.non_repudiation(),
                    KeyUsage::KeyEncipherment => ku.key_encipherment(),
                    KeyUsage::DataEncipherment => ku.data_encipherment(),
                    KeyUsage::KeyAgreement => ku.key_agreement(),
                    KeyUsage::KeyCertSign => ku.key_cert_sign(),
                    KeyUsage::CrlSign => ku.crl_sign(),
                    KeyUsage::EncipherOnly => ku.encipher_only(),
                    KeyUsage::DecipherOnly => ku.decipher_only(),
                };
            }
            let ku = ku
                .build()
                .map_err(CertError::crypto("failed to build KeyUsage"))?;
            builder
                .append_extension(ku)
                .map_err(CertError::crypto("failed to add KeyUsage"))?;
        }

        if !self.ext_key_usage.is_empty() {
            let mut eku = ExtendedKeyUsage::new();
            for usage in &self.ext_key_usage {
                match usage {
                    ExtKeyUsage::ServerAuth => eku.server_auth(),
                    ExtKeyUsage::ClientAuth => eku.client_auth(),
                    ExtKeyUsage::CodeSigning => eku.code_signing(),
                    ExtKeyUsage::EmailProtection => eku.email_protection(),
                    ExtKeyUsage::TimeStamping => eku.time_stamping(),
                };
            }
            let eku = eku
                .build()
                .map_err(CertError::crypto("failed to build ExtendedKeyUsage"))?;
            builder
                .append_extension(eku)
                .map_err(CertError::crypto("failed to add ExtendedKeyUsage"))?;
        }

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(issuer, None))
            .map_err(CertError::crypto("failed to build SubjectKeyIdentifier"))?;
        builder
            .append_extension(ski)
            .map_err(CertError::crypto("failed to add SubjectKeyIdentifier"))?;

        if issuer.is_some() {
            let aki = AuthorityKeyIdentifier::new()
                .keyid(false)
                .build(&builder.x509v3_context(issuer, None))
                .map_err(CertError::crypto("failed to build AuthorityKeyIdentifier"))?;
            builder
                .append_extension(aki)
                .map_err(CertError::crypto("failed to add AuthorityKeyIdentifier"))?;
        }

        if !self.san.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for dns in &self.san.dns_names {
                san.dns(dns);
            }
            for ip in &self.san.ip_addresses {
                san.ip(&ip.to_string());
            }
            for uri in &self.san.uris {
                san.uri(uri);
            }
            let san = san
                .build(&builder.x509v3_context(issuer, None))
                .map_err(CertError::crypto("failed to build SubjectAlternativeName"))?;
            builder
                .append_extension(san)
                .map_err(CertError::crypto("failed to add SubjectAlternativeName"))?;
        }

        builder
            .sign(signing_key, MessageDigest::sha256())
            .map_err(CertError::crypto("failed to sign certificate"))?;

        Ok(builder.build())
    }
}

/// The four certificates of a hierarchy pass, one named field per level.
#[derive(Debug, Clone)]
pub struct IssuedHierarchy {
    pub root: X509,
    pub intermediate: X509,
    pub server: X509,
    pub client: X509,
}

impl IssuedHierarchy {
    pub fn get(&self, kind: SlotKind) -> &X509 {
        match kind {
            SlotKind::Root => &self.root,
            SlotKind::Intermediate => &self.intermediate,
            SlotKind::Server => &self.server,
            SlotKind::Client => &self.client,
        }
    }
}

/// Drives certificate issuance for configuration slots.
pub struct CertSigner<'a> {
    files: &'a dyn FileStore,
    keys: KeyStore<'a>,
    csrs: CsrIssuer<'a>,
}

impl<'a> CertSigner<'a> {
    pub fn new(files: &'a dyn FileStore) -> Self {
        Self {
            files,
            keys: KeyStore::new(files),
            csrs: CsrIssuer::new(files),
        }
    }

    /// Issue the certificate described by `slot`.
    ///
    /// Root slots are self-signed with the slot key. All other slots are signed by
    /// the parent certificate and key named in the slot, over the public key of the
    /// slot's CSR.
    ///
    /// # Errors
    /// - [`CertError::InvalidCertType`] if the slot type is unknown
    /// - [`CertError::AlreadyExists`] if the certificate exists and `overwrite` is false
    /// - [`CertError::InvalidPeriod`] if the validity window cannot be computed
    /// - [`CertError::TypeMismatch`] if an existing slot key or CSR key is not of `algorithm`
    /// - [`CertError::SignatureInvalid`] if an existing CSR does not verify
    /// - [`CertError::FileIo`] / [`CertError::Decode`] if parent material is unreadable
    pub fn sign(
        &self,
        slot: &CertificateSlot,
        algorithm: KeyAlgorithm,
        overwrite: bool,
    ) -> Result<X509> {
        let kind = slot.slot_kind()?;
        let cert_path = slot.cert_path.as_path();
        info!(kind = %kind, path = %cert_path.display(), %algorithm, "signing certificate");

        if self.files.exists(cert_path) {
            if !overwrite {
                error!(path = %cert_path.display(), "certificate already exists");
                return Err(CertError::AlreadyExists {
                    artifact: Artifact::Certificate,
                    path: cert_path.to_path_buf(),
                });
            }
            warn!(path = %cert_path.display(), "certificate already exists, overwriting");
            self.files.delete(cert_path)?;
        }

        let template = CertificateTemplate::from_slot(kind, slot)?;

        let certificate = if kind == SlotKind::Root {
            let key = self
                .keys
                .load_or_generate(&slot.key_path, algorithm, overwrite)?;
            let pkey = key.to_pkey()?;
            template.sign(&pkey, None, &pkey)?
        } else {
            let csr = if self.files.exists(&slot.csr_path) {
                self.csrs.load(&slot.csr_path)?
            } else {
                warn!(path = %slot.csr_path.display(), "CSR does not exist");
                self.csrs.issue(slot, algorithm, overwrite)?
            };
            let subject_key = csr
                .public_key()
                .map_err(CertError::crypto("failed to read CSR public key"))?;
            assert_public_key_type(&subject_key, algorithm)?;

            let parent_cert = load_certificate(self.files, &slot.parent_cert_path)?;
            let parent_key = self.keys.load(&slot.parent_key_path)?.to_pkey()?;

            template.sign(&subject_key, Some(&*parent_cert), &parent_key)?
        };

        let pem = certificate
            .to_pem()
            .map_err(CertError::crypto("failed to encode certificate"))?;
        self.files.ensure_dir(cert_path)?;
        self.files.write(cert_path, &pem)?;

        let written = parse_certificate(cert_path, &pem)?;
        info!(
            "{} certificate for CN={} (Org={}), valid from {} to {}",
            kind,
            slot.common_name,
            slot.organization,
            template.not_before.format("%Y-%m-%d"),
            template.not_after.format("%Y-%m-%d"),
        );
        Ok(written)
    }

    /// Validate `config`, then sign root, intermediate, server and client in that order.
    ///
    /// Stops at the first failure. Files written for earlier slots stay on disk.
    pub fn sign_hierarchy(
        &self,
        config: &CaConfig,
        algorithm: KeyAlgorithm,
        overwrite: bool,
    ) -> Result<IssuedHierarchy> {
        validator::validate(config)?;

        let root = self.sign(config.slot(SlotKind::Root), algorithm, overwrite)?;
        let intermediate = self.sign(config.slot(SlotKind::Intermediate), algorithm, overwrite)?;
        let server = self.sign(config.slot(SlotKind::Server), algorithm, overwrite)?;
        let client = self.sign(config.slot(SlotKind::Client), algorithm, overwrite)?;

        info!("certificate hierarchy signed");
        Ok(IssuedHierarchy {
            root,
            intermediate,
            server,
            client,
        })
    }
}

/// Read a PEM certificate from `path`.
pub fn load_certificate(files: &dyn FileStore, path: &Path) -> Result<X509> {
    let data = files.read(path)?;
    parse_certificate(path, &data)
}

/// Decode a single PEM `CERTIFICATE` block.
pub fn parse_certificate(path: &Path, data: &[u8]) -> Result<X509> {
    let block =
        pem::parse(data).map_err(|e| CertError::decode("read certificate", path, e))?;
    if block.tag() != CERTIFICATE_PEM_LABEL {
        return Err(CertError::decode(
            "read certificate",
            path,
            format!("invalid PEM type: {}", block.tag()),
        ));
    }
    X509::from_der(block.contents()).map_err(|e| CertError::decode("read certificate", path, e))
}

/// Verify `leaf` up to the trusted `root`, through any `intermediates`.
///
/// Returns `Ok(false)` when OpenSSL rejects the chain.
pub fn verify_chain(leaf: &X509Ref, root: &X509, intermediates: &[X509]) -> Result<bool> {
    let mut store =
        X509StoreBuilder::new().map_err(CertError::crypto("failed to create trust store"))?;
    store
        .add_cert(root.clone())
        .map_err(CertError::crypto("failed to add trust anchor"))?;
    let store = store.build();

    let mut chain = Stack::new().map_err(CertError::crypto("failed to create chain"))?;
    for cert in intermediates {
        chain
            .push(cert.clone())
            .map_err(CertError::crypto("failed to extend chain"))?;
    }

    let mut ctx =
        X509StoreContext::new().map_err(CertError::crypto("failed to create store context"))?;
    ctx.init(&store, leaf, &chain, |c| {
        let verified = c.verify_cert()?;
        if !verified {
            warn!(reason = c.error().error_string(), "chain verification failed");
        }
        Ok(verified)
    })
    .map_err(CertError::crypto("failed to verify chain"))
}
