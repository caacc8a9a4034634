use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Scheme;

/// Result of probing one URL scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Ok { code: u16 },
    Fail { error: String },
}

impl ProbeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Ok { .. })
    }
}

/// Reachability per requested scheme. Unrequested schemes stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<ProbeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<ProbeOutcome>,
}

impl ReachabilityReport {
    pub fn get(&self, scheme: Scheme) -> Option<&ProbeOutcome> {
        match scheme {
            Scheme::Http => self.http.as_ref(),
            Scheme::Https => self.https.as_ref(),
        }
    }

    pub fn set(&mut self, scheme: Scheme, outcome: ProbeOutcome) {
        match scheme {
            Scheme::Http => self.http = Some(outcome),
            Scheme::Https => self.https = Some(outcome),
        }
    }
}

/// Peer certificate details for a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub issuer: String,
    pub expires_at: NaiveDate,
    pub days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CertificateCheck {
    Valid(CertificateInfo),
    Invalid { error: String },
}

impl CertificateCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, CertificateCheck::Valid(_))
    }
}

/// Registration expiry extracted from a WHOIS response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryInfo {
    pub expires_at: NaiveDate,
    pub days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ExpiryCheck {
    Valid(ExpiryInfo),
    Invalid { error: String },
}

impl ExpiryCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, ExpiryCheck::Valid(_))
    }
}

/// Whole days from `now` until `expires_at`, rounded toward negative infinity.
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().div_euclid(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_outcome_serialization() {
        let ok = serde_json::to_value(ProbeOutcome::Ok { code: 200 }).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok", "code": 200}));

        let fail = serde_json::to_value(ProbeOutcome::Fail { error: "boom".into() }).unwrap();
        assert_eq!(fail, serde_json::json!({"status": "fail", "error": "boom"}));
    }

    #[test]
    fn test_days_until_floors() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 11, 11, 0, 0).unwrap();
        assert_eq!(days_until(later, now), 9);

        let past = Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap();
        assert_eq!(days_until(past, now), -1);
    }

    #[test]
    fn test_report_get_set() {
        let mut report = ReachabilityReport::default();
        report.set(Scheme::Https, ProbeOutcome::Ok { code: 301 });
        assert!(report.get(Scheme::Http).is_none());
        assert!(report.get(Scheme::Https).unwrap().is_ok());
    }
}
