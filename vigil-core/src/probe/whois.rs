//! Registration-expiry lookup.
//!
//! Raw WHOIS text comes from a [`WhoisSource`]; the expiry date is then
//! extracted by scanning for a fixed, ordered list of labels and trying a
//! fixed, ordered list of date formats against each hit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::process;
use super::types::{days_until, ExpiryCheck, ExpiryInfo};
use super::ExpiryProbe;
use crate::config::{WhoisBackend, WhoisConfig};
use crate::error::{Result, VigilError};

/// Labels registries use for the expiry field, in priority order.
pub const EXPIRY_LABELS: &[&str] = &[
    "Expiry Date",
    "Expiration Date",
    "Registry Expiry Date",
    "paid-till",
];

/// Accepted date layouts, tried in order for every label hit.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
    "%d-%b-%Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
];

static LABEL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    EXPIRY_LABELS
        .iter()
        .map(|label| {
            Regex::new(&format!(r"(?i){}:[ \t]*(.+)", regex::escape(label)))
                .expect("Invalid expiry label regex")
        })
        .collect()
});

static REFER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*refer:[ \t]*(\S+)").expect("Invalid refer regex"));

static REGISTRAR_SERVER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*Registrar WHOIS Server:[ \t]*(\S+)").expect("Invalid referral regex")
});

/// Something that returns the raw WHOIS text for a domain.
#[async_trait]
pub trait WhoisSource: Send + Sync {
    async fn query(&self, domain: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Runs the system `whois` client.
#[derive(Debug, Clone)]
pub struct CommandWhois {
    program: String,
    timeout: Duration,
}

impl CommandWhois {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl WhoisSource for CommandWhois {
    async fn query(&self, domain: &str) -> Result<String> {
        let output = process::run(&self.program, &[domain], self.timeout).await?;

        if !output.success() {
            return Err(VigilError::Whois(format!(
                "{} failed: {}",
                self.program,
                output.failure_reason()
            )));
        }
        if output.truncated {
            return Err(VigilError::Whois(format!("{} output too large", self.program)));
        }
        if output.stdout.trim().is_empty() {
            return Err(VigilError::Whois(format!("{} returned no data", self.program)));
        }
        Ok(output.stdout)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

const WHOIS_PORT: u16 = 43;
const IANA_SERVER: &str = "whois.iana.org";
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;
const MAX_REFERRAL_DEPTH: usize = 3;

/// Speaks the WHOIS protocol directly: IANA for the registry server, then the
/// registry, then any registrar referral.
#[derive(Debug, Clone)]
pub struct SocketWhois {
    timeout: Duration,
}

impl SocketWhois {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn query_server(&self, server: &str, query: &str) -> Result<String> {
        let addr = format!("{}:{}", server, WHOIS_PORT);

        let mut stream = timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| VigilError::Timeout(format!("connection to {} timed out", server)))?
            .map_err(|e| VigilError::Whois(format!("failed to connect to {}: {}", server, e)))?;

        timeout(self.timeout, stream.write_all(format!("{}\r\n", query).as_bytes()))
            .await
            .map_err(|_| VigilError::Timeout(format!("write to {} timed out", server)))?
            .map_err(|e| VigilError::Whois(format!("failed to send query to {}: {}", server, e)))?;

        let mut response = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match timeout(self.timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buf[..n]);
                    if response.len() > MAX_RESPONSE_SIZE {
                        return Err(VigilError::Whois(format!("response from {} too large", server)));
                    }
                }
                Ok(Err(e)) => {
                    return Err(VigilError::Whois(format!("read from {} failed: {}", server, e)))
                }
                // Some servers keep the socket open; keep what arrived.
                Err(_) if !response.is_empty() => break,
                Err(_) => return Err(VigilError::Timeout(format!("read from {} timed out", server))),
            }
        }

        Ok(match String::from_utf8(response) {
            Ok(text) => text,
            // Latin-1 fallback
            Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
        })
    }
}

#[async_trait]
impl WhoisSource for SocketWhois {
    async fn query(&self, domain: &str) -> Result<String> {
        let iana = self.query_server(IANA_SERVER, domain).await?;
        let mut server = extract_referral(&REFER_PATTERN, &iana).ok_or_else(|| {
            VigilError::Whois(format!("IANA has no WHOIS server for {}", domain))
        })?;

        let mut visited = HashSet::new();
        let mut combined = String::new();

        for depth in 0..MAX_REFERRAL_DEPTH {
            if !visited.insert(server.clone()) {
                warn!(server = %server, "Circular WHOIS referral");
                break;
            }
            debug!(server = %server, depth, "Querying WHOIS server");

            let response = match self.query_server(&server, domain).await {
                Ok(response) => response,
                // A failing registrar server still leaves the registry answer.
                Err(e) if !combined.is_empty() => {
                    warn!(server = %server, error = %e, "Registrar referral failed");
                    break;
                }
                Err(e) => return Err(e),
            };
            combined.push_str(&response);
            combined.push('\n');

            match extract_referral(&REGISTRAR_SERVER_PATTERN, &response) {
                Some(next) if next != server => server = next,
                _ => break,
            }
        }

        Ok(combined)
    }

    fn name(&self) -> &str {
        "socket"
    }
}

fn extract_referral(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_start_matches("whois://").to_lowercase())
        .filter(|server| server.contains('.'))
}

/// Registration-expiry probe on top of a [`WhoisSource`].
pub struct WhoisProbe {
    source: Arc<dyn WhoisSource>,
    timeout: Duration,
}

impl WhoisProbe {
    pub fn new(source: Arc<dyn WhoisSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn from_config(config: &WhoisConfig) -> Self {
        let source: Arc<dyn WhoisSource> = match config.backend {
            WhoisBackend::Command => Arc::new(CommandWhois::new(config.command.clone(), config.timeout)),
            WhoisBackend::Socket => Arc::new(SocketWhois::new(config.timeout)),
        };
        Self::new(source, config.timeout)
    }
}

#[async_trait]
impl ExpiryProbe for WhoisProbe {
    #[instrument(skip(self))]
    async fn lookup(&self, domain: &str) -> ExpiryCheck {
        let raw = match timeout(self.timeout, self.source.query(domain)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return ExpiryCheck::Invalid { error: e.to_string() },
            Err(_) => {
                return ExpiryCheck::Invalid {
                    error: format!("{} lookup timed out after {:?}", self.source.name(), self.timeout),
                }
            }
        };

        match parse_expiry(&raw) {
            Ok(expires) => ExpiryCheck::Valid(ExpiryInfo {
                expires_at: expires.date_naive(),
                days_left: days_until(expires, Utc::now()),
            }),
            Err(e) => ExpiryCheck::Invalid { error: e.to_string() },
        }
    }
}

/// Finds the registration expiry in raw WHOIS text.
///
/// Labels are tried in [`EXPIRY_LABELS`] order; for each hit every format in
/// [`DATE_FORMATS`] is tried. The first label+format pair that parses wins.
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
    let mut unparsed: Option<String> = None;

    for pattern in LABEL_PATTERNS.iter() {
        for caps in pattern.captures_iter(raw) {
            let Some(value) = caps.get(1).map(|m| m.as_str().trim()) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            if let Some(parsed) = parse_date(value) {
                return Ok(parsed);
            }
            unparsed.get_or_insert_with(|| value.to_string());
        }
    }

    Err(VigilError::Whois(match unparsed {
        Some(value) => format!("unrecognized expiry date format: {:?}", value),
        None => "no expiry date field in WHOIS response".to_string(),
    }))
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = value
        .trim_end_matches(" (UTC)")
        .trim_end_matches(" UTC")
        .trim();

    for fmt in DATE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(cleaned, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(cleaned, fmt) {
            return Some(dt.and_utc());
        }
        if let Ok(d) = NaiveDate::parse_from_str(cleaned, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticWhois;

    fn ymd(dt: DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d").to_string()
    }

    #[test]
    fn test_registry_expiry_date() {
        let raw = "Domain Name: EXAMPLE.COM\nRegistry Expiry Date: 2030-01-01T00:00:00Z\n";
        assert_eq!(ymd(parse_expiry(raw).unwrap()), "2030-01-01");
    }

    #[test]
    fn test_paid_till() {
        let raw = "domain: EXAMPLE.RU\npaid-till: 2026-03-01T21:00:00Z\n";
        assert_eq!(ymd(parse_expiry(raw).unwrap()), "2026-03-01");
    }

    #[test]
    fn test_day_month_name_format() {
        let raw = "Expiry Date: 14-Aug-2027\n";
        assert_eq!(ymd(parse_expiry(raw).unwrap()), "2027-08-14");
    }

    #[test]
    fn test_dotted_format_and_utc_suffix() {
        assert_eq!(ymd(parse_expiry("Expiration Date: 01.02.2028").unwrap()), "2028-02-01");
        assert_eq!(
            ymd(parse_expiry("Expiration Date: 2028-05-06 10:00:00 UTC").unwrap()),
            "2028-05-06"
        );
    }

    #[test]
    fn test_offset_format() {
        let raw = "Registrar Registration Expiration Date: 2029-07-01T04:00:00+00:00\n";
        assert_eq!(ymd(parse_expiry(raw).unwrap()), "2029-07-01");
    }

    #[test]
    fn test_label_order_is_significant() {
        // "Expiry Date" outranks "paid-till" even when it appears later.
        let raw = "paid-till: 2026-01-01\nExpiry Date: 2031-12-31\n";
        assert_eq!(ymd(parse_expiry(raw).unwrap()), "2031-12-31");
    }

    #[test]
    fn test_unparseable_hit_falls_through_to_next_label() {
        let raw = "Expiry Date: soon\nRegistry Expiry Date: 2030-01-01T00:00:00Z\n";
        assert_eq!(ymd(parse_expiry(raw).unwrap()), "2030-01-01");
    }

    #[test]
    fn test_missing_label() {
        let err = parse_expiry("Domain Name: EXAMPLE.COM\nCreation Date: 1995-08-14\n").unwrap_err();
        assert!(err.to_string().contains("no expiry date"));
    }

    #[test]
    fn test_unrecognized_format() {
        let err = parse_expiry("Expiry Date: next tuesday\n").unwrap_err();
        assert!(err.to_string().contains("next tuesday"));
    }

    #[test]
    fn test_extract_referral() {
        let iana = "domain:       COM\nrefer:        whois.verisign-grs.com\n";
        assert_eq!(
            extract_referral(&REFER_PATTERN, iana),
            Some("whois.verisign-grs.com".to_string())
        );
        let registry = "   Registrar WHOIS Server: whois.markmonitor.com\r\n";
        assert_eq!(
            extract_referral(&REGISTRAR_SERVER_PATTERN, registry),
            Some("whois.markmonitor.com".to_string())
        );
        assert_eq!(extract_referral(&REFER_PATTERN, "refer: \n"), None);
    }

    #[tokio::test]
    async fn test_probe_valid() {
        let probe = WhoisProbe::new(
            Arc::new(StaticWhois::ok("Registry Expiry Date: 2030-01-01T00:00:00Z")),
            Duration::from_secs(1),
        );
        match probe.lookup("example.com").await {
            ExpiryCheck::Valid(info) => {
                assert_eq!(info.expires_at, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
                assert!(info.days_left > 0);
            }
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_source_error_is_invalid() {
        let probe = WhoisProbe::new(
            Arc::new(StaticWhois::err("whois: command not found")),
            Duration::from_secs(1),
        );
        match probe.lookup("example.com").await {
            ExpiryCheck::Invalid { error } => assert!(error.contains("command not found")),
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_no_label_is_invalid() {
        let probe = WhoisProbe::new(
            Arc::new(StaticWhois::ok("No match for \"EXAMPLE.INVALID\".")),
            Duration::from_secs(1),
        );
        assert!(!probe.lookup("example.invalid").await.is_valid());
    }

    #[cfg(unix)]
    fn fake_whois(dir: &tempfile::TempDir, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("whois");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_invalid_even_with_expiry_in_output() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_whois(
            &dir,
            "echo 'Registry Expiry Date: 2030-01-01T00:00:00Z'\nexit 2",
        );
        let probe = WhoisProbe::new(
            Arc::new(CommandWhois::new(program, Duration::from_secs(5))),
            Duration::from_secs(5),
        );

        match probe.lookup("example.com").await {
            ExpiryCheck::Invalid { error } => assert!(error.contains("status 2"), "{}", error),
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_output_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_whois(&dir, "echo 'Registry Expiry Date: 2030-01-01T00:00:00Z'");
        let probe = WhoisProbe::new(
            Arc::new(CommandWhois::new(program, Duration::from_secs(5))),
            Duration::from_secs(5),
        );

        assert!(probe.lookup("example.com").await.is_valid());
    }

    #[tokio::test]
    async fn test_missing_whois_binary_is_invalid() {
        let probe = WhoisProbe::new(
            Arc::new(CommandWhois::new("vigil-no-such-whois", Duration::from_secs(1))),
            Duration::from_secs(1),
        );
        assert!(!probe.lookup("example.com").await.is_valid());
    }
}
