use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use volley_core::ClientIdentity;

/// Reads a PEM certificate chain and its private key for client auth.
pub fn load_identity(cert: &Path, key: &Path) -> anyhow::Result<ClientIdentity> {
    let mut certs_pem = BufReader::new(
        File::open(cert).with_context(|| format!("Failed to open {}", cert.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut certs_pem)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read certificates from {}", cert.display()))?;
    if certs.is_empty() {
        bail!("No certificates found in {}", cert.display());
    }

    let mut key_pem = BufReader::new(
        File::open(key).with_context(|| format!("Failed to open {}", key.display()))?,
    );
    let key_der = rustls_pemfile::private_key(&mut key_pem)
        .with_context(|| format!("Failed to read private key from {}", key.display()))?
        .with_context(|| format!("No private key found in {}", key.display()))?;

    Ok(ClientIdentity {
        certs,
        key: Arc::new(key_der),
    })
}
