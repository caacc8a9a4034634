use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Certificate check failed: {0}")]
    Certificate(String),

    #[error("WHOIS lookup failed: {0}")]
    Whois(String),

    #[error("External command failed: {0}")]
    Command(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: usize, last_error: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VigilError>;
