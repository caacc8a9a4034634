//! Per-user defaults and their merge with per-domain overrides.

use serde::{Deserialize, Serialize};

use crate::model::{DomainRecord, Scheme};

pub const DEFAULT_SSL_WARN_DAYS: i64 = 15;
pub const DEFAULT_WHOIS_WARN_DAYS: i64 = 30;

/// Default monitoring policy for every domain an owner registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub owner_id: i64,
    pub track_http: bool,
    pub track_https: bool,
    pub track_ssl: bool,
    pub track_whois: bool,
    pub ssl_warn_days: i64,
    pub whois_warn_days: i64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self::new(0)
    }
}

impl UserSettings {
    pub fn new(owner_id: i64) -> Self {
        Self {
            owner_id,
            track_http: true,
            track_https: true,
            track_ssl: true,
            track_whois: true,
            ssl_warn_days: DEFAULT_SSL_WARN_DAYS,
            whois_warn_days: DEFAULT_WHOIS_WARN_DAYS,
        }
    }
}

/// Fully resolved policy for one domain. Has no unset fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub track_http: bool,
    pub track_https: bool,
    pub track_ssl: bool,
    pub track_whois: bool,
    pub ssl_warn_days: i64,
    pub whois_warn_days: i64,
}

/// Returns the override when it is set, the default otherwise.
pub fn layer<T: Copy>(override_value: Option<T>, default: T) -> T {
    override_value.unwrap_or(default)
}

impl EffectivePolicy {
    pub fn resolve(domain: &DomainRecord, settings: &UserSettings) -> Self {
        Self {
            track_http: layer(domain.track_http, settings.track_http),
            track_https: layer(domain.track_https, settings.track_https),
            track_ssl: layer(domain.track_ssl, settings.track_ssl),
            track_whois: layer(domain.track_whois, settings.track_whois),
            ssl_warn_days: layer(domain.ssl_warn_days, settings.ssl_warn_days),
            whois_warn_days: layer(domain.whois_warn_days, settings.whois_warn_days),
        }
    }

    /// Schemes the reachability probe should cover, http before https.
    pub fn schemes(&self) -> Vec<Scheme> {
        let mut schemes = Vec::with_capacity(2);
        if self.track_http {
            schemes.push(Scheme::Http);
        }
        if self.track_https {
            schemes.push(Scheme::Https);
        }
        schemes
    }
}
