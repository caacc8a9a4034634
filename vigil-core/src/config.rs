//! Engine configuration.
//!
//! Every section has working defaults; callers override individual fields
//! (the CLI does so from flags and `VIGIL_*` environment variables).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VigilError};

/// Browser user agent sent by the in-process and fallback HTTP fetchers.
/// Many hosts reject library-default fingerprints.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub tls: TlsConfig,
    pub whois: WhoisConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval.is_zero() {
            return Err(VigilError::Config("sweep interval must be non-zero".into()));
        }
        if self.scheduler.concurrency == 0 {
            return Err(VigilError::Config("concurrency must be at least 1".into()));
        }
        if self.scheduler.sweep_timeout.is_zero() {
            return Err(VigilError::Config("sweep timeout must be non-zero".into()));
        }
        if self.http.attempts == 0 {
            return Err(VigilError::Config("HTTP attempts must be at least 1".into()));
        }
        for (name, timeout) in [
            ("HTTP", self.http.timeout),
            ("TLS", self.tls.timeout),
            ("WHOIS", self.whois.timeout),
        ] {
            if timeout.is_zero() {
                return Err(VigilError::Config(format!("{} timeout must be non-zero", name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    /// Maximum number of domains evaluated at the same time.
    pub concurrency: usize,
    /// A sweep still running after this long is abandoned.
    #[serde(with = "duration_secs")]
    pub sweep_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            concurrency: 10,
            sweep_timeout: Duration::from_secs(240),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// In-process attempts before the fallback fetcher is consulted.
    pub attempts: usize,
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    pub user_agent: String,
    /// External HTTP client used as a last resort. `None` disables the fallback.
    pub fallback_command: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 3,
            retry_delay: Duration::from_secs(1),
            user_agent: BROWSER_USER_AGENT.to_string(),
            fallback_command: Some("curl".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhoisBackend {
    /// Run the system `whois` binary.
    #[default]
    Command,
    /// Speak the WHOIS protocol on port 43 directly.
    Socket,
}

impl std::str::FromStr for WhoisBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" | "cmd" => Ok(WhoisBackend::Command),
            "socket" | "tcp" => Ok(WhoisBackend::Socket),
            _ => Err(format!("Unknown WHOIS backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoisConfig {
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub backend: WhoisBackend,
    pub command: String,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            backend: WhoisBackend::Command,
            command: "whois".to_string(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
