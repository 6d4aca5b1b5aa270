//! # TLS Client Configuration
//!
//! Builds the `rustls` client configuration used by the transport.
//!
//! ## Trust Policies
//! - **Default**: validate the server against the system trust store
//! - **Custom CA**: additionally trust the roots in a PEM file
//! - **Pinned**: accept only a certificate with a given SHA-256 fingerprint
//! - **Insecure**: accept any certificate (development only)

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, RootCertStore, ServerName};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{constants, ProtocolError, Result};

/// TLS client configuration
#[derive(Debug, Clone)]
pub struct TlsClientConfig {
    server_name: String,
    insecure: bool,
    /// Optional PEM file with extra trusted roots
    ca_cert_path: Option<String>,
    /// Optional certificate hash to pin (SHA-256 fingerprint)
    pinned_cert_hash: Option<Vec<u8>>,
}

impl TlsClientConfig {
    /// Create a configuration that validates `server_name` against the system roots
    pub fn new<S: Into<String>>(server_name: S) -> Self {
        Self {
            server_name: server_name.into(),
            insecure: false,
            ca_cert_path: None,
            pinned_cert_hash: None,
        }
    }

    /// Trust the root certificates in a PEM file in addition to the system roots
    pub fn with_ca_cert<S: Into<String>>(mut self, path: S) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Allow insecure connections (skip certificate verification)
    ///
    /// # WARNING: Security Risk
    /// Only for development and testing, or together with
    /// [`with_pinned_cert_hash`](Self::with_pinned_cert_hash).
    pub fn insecure(mut self) -> Self {
        warn!("INSECURE MODE ENABLED: Certificate verification is disabled. This should only be used for development/testing.");
        self.insecure = true;
        self
    }

    /// Pin a certificate by its SHA-256 hash/fingerprint
    ///
    /// Only a server presenting exactly this end-entity certificate is accepted.
    pub fn with_pinned_cert_hash(mut self, hash: Vec<u8>) -> Self {
        if hash.len() != 32 {
            warn!(
                "Certificate hash has unexpected length: {} (expected 32 bytes for SHA-256)",
                hash.len()
            );
        }
        self.pinned_cert_hash = Some(hash);
        self
    }

    /// Calculate SHA-256 hash for a certificate to use with pinning
    pub fn calculate_cert_hash(cert: &Certificate) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&cert.0);
        hasher.finalize().to_vec()
    }

    /// Get the server name as a rustls::ServerName
    pub fn server_name(&self) -> Result<ServerName> {
        ServerName::try_from(self.server_name.as_str())
            .map_err(|_| ProtocolError::TlsError(constants::ERR_INVALID_SERVER_NAME.into()))
    }

    /// Load the TLS client configuration
    pub fn load_client_config(&self) -> Result<ClientConfig> {
        let builder = ClientConfig::builder().with_safe_defaults();

        // Pinning replaces chain validation entirely
        if let Some(hash) = &self.pinned_cert_hash {
            debug!("Using pinned certificate verifier");
            let verifier = Arc::new(PinnedCertVerifier {
                fingerprint: hash.clone(),
            });
            return Ok(builder
                .with_custom_certificate_verifier(verifier)
                .with_no_client_auth());
        }

        if self.insecure {
            return Ok(builder
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth());
        }

        let mut root_store = RootCertStore::empty();
        let native_certs = rustls_native_certs::load_native_certs()
            .map_err(|e| ProtocolError::TlsError(format!("Failed to load native certs: {e}")))?;

        let mut skipped = 0usize;
        for cert in native_certs {
            if root_store.add(&Certificate(cert.0)).is_err() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            debug!(skipped, "Ignored unparsable system root certificates");
        }

        if let Some(path) = &self.ca_cert_path {
            let file = File::open(path)
                .map_err(|e| ProtocolError::TlsError(format!("Failed to open CA file: {e}")))?;
            let mut reader = BufReader::new(file);
            let certs = rustls_pemfile::certs(&mut reader)
                .map_err(|_| ProtocolError::TlsError("Failed to parse CA certificate".into()))?;

            if certs.is_empty() {
                return Err(ProtocolError::TlsError(format!(
                    "No certificates found in {path}"
                )));
            }

            for cert in certs {
                root_store.add(&Certificate(cert)).map_err(|e| {
                    ProtocolError::TlsError(format!("Failed to add CA cert to root store: {e}"))
                })?;
            }
        }

        Ok(builder
            .with_root_certificates(root_store)
            .with_no_client_auth())
    }
}

/// Accepts only the end-entity certificate with a matching SHA-256 fingerprint
struct PinnedCertVerifier {
    fingerprint: Vec<u8>,
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let hash = TlsClientConfig::calculate_cert_hash(end_entity);

        if hash == self.fingerprint {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(
                constants::ERR_PINNED_CERT_MISMATCH.into(),
            ))
        }
    }
}

/// Accepts any server certificate
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}
