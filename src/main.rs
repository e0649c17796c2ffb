//! PKI Issuer - command-line front end
//!
//! ```bash
//! pki-issuer create private-key -o /tmp/pki/standalone.pem -k rsa
//! pki-issuer create csr -y ca.yml -t server -k ecdsa
//! pki-issuer create cert -y ca.yml -t root -k ecdsa --force
//! pki-issuer create hierarchy -y ca.yml -k ecdsa
//! pki-issuer create bundle-chain -y ca.yml -o /tmp/pki/chain.pem
//! pki-issuer validate -y ca.yml --verify
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pki_issuer::signer::{load_certificate, verify_chain};
use pki_issuer::{operations, CertError, DiskStore, KeyAlgorithm, SlotKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pki-issuer")]
#[command(about = "Create private keys, CSRs and certificates for a four-tier CA")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a private key, CSR, certificate or bundle
    Create {
        #[command(subcommand)]
        target: CreateTarget,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the CA configuration YAML
        #[arg(short, long)]
        yaml: PathBuf,
        /// Also verify the certificates on disk against their parents
        #[arg(long)]
        verify: bool,
    },
}

#[derive(Subcommand)]
enum CreateTarget {
    /// Create a standalone private key
    PrivateKey {
        /// Output path of the private key
        #[arg(short, long)]
        out: PathBuf,
        /// Key type: ecdsa or rsa
        #[arg(short, long, default_value = "ecdsa")]
        key: KeyAlgorithm,
        /// Overwrite the private key if it already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Create the CSR of an intermediate, server or client slot
    Csr {
        /// Path to the CA configuration YAML
        #[arg(short, long)]
        yaml: PathBuf,
        /// Certificate type: intermediate, server or client
        #[arg(short = 't', long = "type")]
        kind: SlotKind,
        /// Key type: ecdsa or rsa
        #[arg(short, long, default_value = "ecdsa")]
        key: KeyAlgorithm,
        /// Overwrite the CSR if it already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Sign the certificate of one slot
    Cert {
        /// Path to the CA configuration YAML
        #[arg(short, long)]
        yaml: PathBuf,
        /// Certificate type: root, intermediate, server or client
        #[arg(short = 't', long = "type")]
        kind: SlotKind,
        /// Key type: ecdsa or rsa
        #[arg(short, long, default_value = "ecdsa")]
        key: KeyAlgorithm,
        /// Overwrite the certificate if it already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Sign root, intermediate, server and client in order
    Hierarchy {
        /// Path to the CA configuration YAML
        #[arg(short, long)]
        yaml: PathBuf,
        /// Key type: ecdsa or rsa
        #[arg(short, long, default_value = "ecdsa")]
        key: KeyAlgorithm,
        /// Overwrite existing certificates and CSRs
        #[arg(short, long)]
        force: bool,
    },

    /// Bundle the intermediate and root certificates into one PEM file
    BundleChain {
        /// Path to the CA configuration YAML
        #[arg(short, long)]
        yaml: PathBuf,
        /// Output path for the PEM bundle
        #[arg(short, long)]
        out: PathBuf,
        /// Overwrite the bundle if it already exists
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        if e
            .downcast_ref::<CertError>()
            .is_some_and(CertError::is_already_exists)
        {
            error!("use --force (-f) to overwrite");
        }
        return Err(e);
    }
    Ok(())
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Create { target } => create(target),
        Commands::Validate { yaml, verify } => validate(&yaml, verify),
    }
}

fn create(target: CreateTarget) -> Result<()> {
    match target {
        CreateTarget::PrivateKey { out, key, force } => {
            operations::generate_private_key(&out, key, force)
                .context("Failed to create private key")?;
            info!(path = %out.display(), "create private key success");
        }
        CreateTarget::Csr {
            yaml,
            kind,
            key,
            force,
        } => {
            operations::issue_csr_from_file(kind, key, &yaml, force)
                .with_context(|| format!("Failed to create {kind} CSR"))?;
            info!("create {kind} CSR success");
        }
        CreateTarget::Cert {
            yaml,
            kind,
            key,
            force,
        } => {
            let cert = operations::sign_certificate(kind, key, &yaml, force)
                .with_context(|| format!("Failed to create {kind} certificate"))?;
            let serial = cert
                .serial_number()
                .to_bn()
                .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
                .context("Failed to read certificate serial")?;
            info!(serial = %serial, "create {kind} certificate success");
        }
        CreateTarget::Hierarchy { yaml, key, force } => {
            operations::sign_hierarchy_from_file(key, &yaml, force)
                .context("Failed to create certificate hierarchy")?;
            info!("create hierarchy success");
        }
        CreateTarget::BundleChain { yaml, out, force } => {
            operations::bundle_chain(&yaml, &out, force).context("Failed to bundle chain")?;
            info!(path = %out.display(), "bundle-chain success");
        }
    }
    Ok(())
}

fn validate(yaml: &Path, verify: bool) -> Result<()> {
    let config = operations::load_and_validate(yaml).context("Configuration is invalid")?;
    info!(path = %yaml.display(), "configuration is valid");

    if !verify {
        return Ok(());
    }

    let files = DiskStore::new();
    let load = |kind: SlotKind| {
        let path = &config.slot(kind).cert_path;
        load_certificate(&files, path)
            .with_context(|| format!("Failed to load {kind} certificate"))
    };
    let root = load(SlotKind::Root)?;
    let intermediate = load(SlotKind::Intermediate)?;

    let mut failed = Vec::new();
    if !verify_chain(&root, &root, &[])? {
        failed.push(SlotKind::Root);
    }
    if !verify_chain(&intermediate, &root, &[])? {
        failed.push(SlotKind::Intermediate);
    }
    for kind in [SlotKind::Server, SlotKind::Client] {
        let leaf = load(kind)?;
        if !verify_chain(&leaf, &root, &[intermediate.clone()])? {
            failed.push(kind);
        }
    }

    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|k| k.as_str()).collect();
        bail!("Chain verification failed for: {}", names.join(", "));
    }
    info!("all certificates verify against their parents");
    Ok(())
}
