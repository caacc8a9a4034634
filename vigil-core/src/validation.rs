//! Domain name normalization for user-supplied input.

use crate::error::{Result, VigilError};

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalize and validate a domain name
///
/// Accepts things people paste, like `https://www.Example.com:8443/path`,
/// and reduces them to the bare lowercase host (`example.com`):
/// - strips the scheme, path, query and port
/// - strips a leading `www.`
/// - requires at least two labels of letters, digits and inner hyphens
pub fn normalize_domain(input: &str) -> Result<String> {
    let lowered = input.trim().to_lowercase();

    let host = lowered
        .strip_prefix("http://")
        .or_else(|| lowered.strip_prefix("https://"))
        .unwrap_or(&lowered);
    let host = host
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(host);
    let host = host.split(':').next().unwrap_or(host);
    let host = host.strip_prefix("www.").unwrap_or(host);

    let invalid = || VigilError::InvalidDomain(input.trim().to_string());

    if host.is_empty() || !host.contains('.') || host.len() > MAX_DOMAIN_LEN {
        return Err(invalid());
    }

    for label in host.split('.') {
        if label.is_empty()
            || label.len() > MAX_LABEL_LEN
            || label.starts_with('-')
            || label.ends_with('-')
            || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(invalid());
        }
    }

    Ok(host.to_string())
}
