//! Client TLS material for mutually-authenticated upstreams.
//!
//! [`load_client_config`] turns a target's certificate, key and CA paths
//! into a [`rustls::ClientConfig`] that presents the client certificate
//! and trusts only the configured CA bundle. Plain-http targets get
//! `Ok(None)`. Failures are returned, never panicked, so the upstream
//! registry can park them on the owning upstream.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::config::model::{Protocol, Target};
use crate::error::TlsError;

/// Build the client TLS configuration for `target`, or `None` for http.
pub fn load_client_config(target: &Target) -> Result<Option<ClientConfig>, TlsError> {
    if target.scheme() != Some(Protocol::Https) {
        return Ok(None);
    }

    let cert_path = PathBuf::from(&target.cert_file);
    let key_path = PathBuf::from(&target.key_file);
    let ca_path = PathBuf::from(&target.ca_cert);

    // Checked one by one so the error names the file that is missing.
    if !is_present(&cert_path) {
        return Err(TlsError::MissingCertFile(cert_path));
    }
    if !is_present(&key_path) {
        return Err(TlsError::MissingKeyFile(key_path));
    }
    if !is_present(&ca_path) {
        return Err(TlsError::MissingCaFile(ca_path));
    }

    let certs = load_certs(&cert_path)?;
    let key = load_key(&key_path)?;
    let roots = load_roots(&ca_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)?;

    Ok(Some(config))
}

fn is_present(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.exists()
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(|source| TlsError::InvalidCa {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(roots)
}
