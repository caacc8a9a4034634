//! Probe drivers.
//!
//! Each probe checks one aspect of a domain's health:
//! - HTTP/HTTPS reachability, with retries and an external-client fallback
//! - TLS certificate validity and expiry
//! - Registration expiry from WHOIS
//!
//! Probes never return errors. Failures are folded into their result types
//! so a broken host can't take down a sweep.

mod fetch;
mod http;
mod process;
mod tls;
mod types;
mod whois;

use async_trait::async_trait;

use crate::model::Scheme;

pub use fetch::{CommandFetcher, Fetcher, ReqwestFetcher};
pub use http::HttpProbe;
pub use process::{run as run_command, CommandOutput};
pub use tls::{certificate_info_from_der, TlsProbe};
pub use types::{
    days_until, CertificateCheck, CertificateInfo, ExpiryCheck, ExpiryInfo, ProbeOutcome,
    ReachabilityReport,
};
pub use whois::{parse_expiry, CommandWhois, SocketWhois, WhoisProbe, WhoisSource};

/// Checks whether a domain answers over the given schemes.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn check(&self, domain: &str, schemes: &[Scheme]) -> ReachabilityReport;
}

/// Inspects the certificate served on port 443.
#[async_trait]
pub trait CertificateProbe: Send + Sync {
    async fn inspect(&self, domain: &str) -> CertificateCheck;
}

/// Looks up when the domain's registration runs out.
#[async_trait]
pub trait ExpiryProbe: Send + Sync {
    async fn lookup(&self, domain: &str) -> ExpiryCheck;
}
