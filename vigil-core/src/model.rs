use std::fmt;

use serde::{Deserialize, Serialize};

/// A monitored domain and its per-domain overrides.
///
/// Every `track_*` and `*_warn_days` field is an override: `None` defers to
/// the owner's [`UserSettings`](crate::settings::UserSettings), `Some(false)`
/// explicitly disables the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_http: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_https: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_ssl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_whois: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_warn_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whois_warn_days: Option<i64>,
}

impl DomainRecord {
    /// A record with no overrides.
    pub fn new(id: i64, name: impl Into<String>, owner_id: i64) -> Self {
        Self {
            id,
            name: name.into(),
            owner_id,
            track_http: None,
            track_https: None,
            track_ssl: None,
            track_whois: None,
            ssl_warn_days: None,
            whois_warn_days: None,
        }
    }
}

/// URL scheme probed by the reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn url_for(&self, domain: &str) -> String {
        format!("{}://{}", self.as_str(), domain)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a detected problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemKind {
    Http,
    Https,
    Ssl,
    Whois,
    /// The evaluation itself failed before producing a verdict.
    Evaluation,
}

impl ProblemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemKind::Http => "http",
            ProblemKind::Https => "https",
            ProblemKind::Ssl => "ssl",
            ProblemKind::Whois => "whois",
            ProblemKind::Evaluation => "evaluation",
        }
    }
}

impl From<Scheme> for ProblemKind {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Http => ProblemKind::Http,
            Scheme::Https => ProblemKind::Https,
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issue found for one domain during one sweep. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub domain: String,
    pub kind: ProblemKind,
    pub message: String,
}

impl Problem {
    pub fn new(domain: impl Into<String>, kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.domain, self.message)
    }
}
