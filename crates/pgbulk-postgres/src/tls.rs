//! PostgreSQL TLS support
//!
//! Builds the native-tls connector handed to tokio-postgres from the
//! `sslmode`, `sslrootcert`, `sslcert` and `sslkey` settings.

use crate::config::{ConnectionConfig, SslMode};
use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use pgbulk_core::BulkError;
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use tracing::debug;

/// Error types for TLS setup
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    #[error("failed to load client certificate from {path}: {source}")]
    ClientCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to load client key from {path}: {source}")]
    ClientKeyLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid client identity (cert + key): {0}")]
    InvalidClientIdentity(String),

    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),
}

impl From<TlsError> for BulkError {
    fn from(error: TlsError) -> Self {
        BulkError::Connection(error.to_string())
    }
}

/// Build the TLS connector for `config`, or `None` when TLS is disabled.
pub(crate) fn build_connector(
    config: &ConnectionConfig,
) -> std::result::Result<Option<MakeTlsConnector>, TlsError> {
    if config.ssl_mode == SslMode::Disable {
        return Ok(None);
    }

    debug!(ssl_mode = %config.ssl_mode, "building PostgreSQL TLS connector");
    let mut builder = NativeTlsConnector::builder();
    configure_verification(&mut builder, config);

    if let Some(path) = &config.ssl_root_cert {
        apply_ca_cert(&mut builder, path)?;
    }
    if let (Some(cert), Some(key)) = (&config.ssl_cert, &config.ssl_key) {
        apply_client_cert(&mut builder, cert, key)?;
    }

    let connector = builder
        .build()
        .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;
    Ok(Some(MakeTlsConnector::new(connector)))
}

fn configure_verification(builder: &mut TlsConnectorBuilder, config: &ConnectionConfig) {
    match config.ssl_mode {
        SslMode::Disable => {}
        SslMode::Prefer | SslMode::Require => {
            // Encryption only unless a CA was supplied
            if config.ssl_root_cert.is_none() {
                builder.danger_accept_invalid_certs(true);
            }
            builder.danger_accept_invalid_hostnames(true);
        }
        SslMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        SslMode::VerifyFull => {}
    }
}

fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &str) -> Result<(), TlsError> {
    debug!(path, "loading CA certificate");
    let pem = fs::read(path).map_err(|source| TlsError::CaCertLoadFailed {
        path: path.to_string(),
        source,
    })?;
    let cert = Certificate::from_pem(&pem).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;
    builder.add_root_certificate(cert);
    Ok(())
}

fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &str,
    key_path: &str,
) -> Result<(), TlsError> {
    debug!(cert_path, key_path, "loading client certificate and key");
    let cert_pem = fs::read(cert_path).map_err(|source| TlsError::ClientCertLoadFailed {
        path: cert_path.to_string(),
        source,
    })?;
    let key_pem = fs::read(key_path).map_err(|source| TlsError::ClientKeyLoadFailed {
        path: key_path.to_string(),
        source,
    })?;

    // PEM certificate plus PKCS#8 PEM key
    let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| TlsError::InvalidClientIdentity(e.to_string()))?;
    builder.identity(identity);
    Ok(())
}
