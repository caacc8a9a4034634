use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};
use x509_parser::prelude::*;

use super::types::{days_until, CertificateCheck, CertificateInfo};
use super::CertificateProbe;
use crate::config::TlsConfig;
use crate::error::{Result, VigilError};

const TLS_PORT: u16 = 443;

/// Reads the peer certificate presented on port 443.
///
/// The handshake verifies the chain and hostname, so an expired, self-signed
/// or mismatched certificate comes back as [`CertificateCheck::Invalid`].
/// Connect (including name resolution) and handshake are each bounded by the
/// configured timeout.
#[derive(Debug, Clone)]
pub struct TlsProbe {
    timeout: Duration,
}

impl Default for TlsProbe {
    fn default() -> Self {
        Self::new(&TlsConfig::default())
    }
}

impl TlsProbe {
    pub fn new(config: &TlsConfig) -> Self {
        Self {
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl CertificateProbe for TlsProbe {
    #[instrument(skip(self))]
    async fn inspect(&self, domain: &str) -> CertificateCheck {
        let addr = format!("{}:{}", domain, TLS_PORT);
        match fetch_certificate(domain, &addr, self.timeout).await {
            Ok(info) => {
                debug!(days_left = info.days_left, issuer = %info.issuer, "Certificate inspected");
                CertificateCheck::Valid(info)
            }
            Err(e) => CertificateCheck::Invalid {
                error: e.to_string(),
            },
        }
    }
}

/// Connects to `addr`, completes a verified handshake for `domain` and
/// returns the leaf certificate's details.
async fn fetch_certificate(domain: &str, addr: &str, limit: Duration) -> Result<CertificateInfo> {
    let connector = TlsConnector::new().map_err(|e| VigilError::Certificate(e.to_string()))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| VigilError::Timeout(format!("connection to {} timed out", addr)))?
        .map_err(|e| VigilError::Certificate(format!("connection to {} failed: {}", addr, e)))?;

    let tls = timeout(limit, connector.connect(domain, stream))
        .await
        .map_err(|_| VigilError::Timeout(format!("TLS handshake with {} timed out", domain)))?
        .map_err(|e| VigilError::Certificate(format!("TLS handshake failed: {}", e)))?;

    let cert = tls
        .get_ref()
        .peer_certificate()
        .map_err(|e| VigilError::Certificate(e.to_string()))?
        .ok_or_else(|| VigilError::Certificate("server presented no certificate".to_string()))?;
    let der = cert
        .to_der()
        .map_err(|e| VigilError::Certificate(e.to_string()))?;

    certificate_info_from_der(&der, Utc::now())
}

/// Extracts issuer and `notAfter` from a DER certificate.
pub fn certificate_info_from_der(der: &[u8], now: DateTime<Utc>) -> Result<CertificateInfo> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| VigilError::Certificate(format!("unparseable certificate: {}", e)))?;

    let not_after = cert.validity().not_after.timestamp();
    let expires_at = DateTime::<Utc>::from_timestamp(not_after, 0)
        .ok_or_else(|| VigilError::Certificate(format!("notAfter out of range: {}", not_after)))?;

    Ok(CertificateInfo {
        issuer: issuer_name(cert.issuer()),
        expires_at: expires_at.date_naive(),
        days_left: days_until(expires_at, now),
    })
}

/// Issuer attribute values joined in certificate order, e.g.
/// `US, Let's Encrypt, R3`.
fn issuer_name(name: &X509Name<'_>) -> String {
    let parts: Vec<&str> = name
        .iter_attributes()
        .filter_map(|attr| attr.as_str().ok())
        .collect();
    if parts.is_empty() {
        name.to_string()
    } else {
        parts.join(", ")
    }
}
