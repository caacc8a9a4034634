use std::time::Duration;

use async_trait::async_trait;

use super::process;
use crate::config::HttpConfig;
use crate::error::{Result, VigilError};

const MAX_REDIRECTS: usize = 10;

/// One way of obtaining the final HTTP status code for a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<u16>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// In-process fetcher backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<u16> {
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }

    fn name(&self) -> &str {
        "reqwest"
    }
}

/// Shells out to a curl-compatible client.
///
/// The body is discarded and only the status line of the last hop is kept.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    timeout: Duration,
    user_agent: String,
}

impl CommandFetcher {
    pub fn new(program: impl Into<String>, config: &HttpConfig) -> Self {
        Self {
            program: program.into(),
            timeout: config.timeout,
            user_agent: config.user_agent.clone(),
        }
    }
}

#[async_trait]
impl Fetcher for CommandFetcher {
    async fn fetch(&self, url: &str) -> Result<u16> {
        let max_time = self.timeout.as_secs().max(1).to_string();
        let max_redirs = MAX_REDIRECTS.to_string();
        let args = [
            "-sS",
            "-L",
            "--max-redirs",
            max_redirs.as_str(),
            "-o",
            "/dev/null",
            "-w",
            "%{http_code}",
            "-A",
            self.user_agent.as_str(),
            "--max-time",
            max_time.as_str(),
            url,
        ];

        // curl enforces --max-time itself; the extra second covers process startup.
        let output = process::run(&self.program, &args, self.timeout + Duration::from_secs(1)).await?;
        if !output.success() {
            return Err(VigilError::Command(format!(
                "{}: {}",
                self.program,
                output.failure_reason()
            )));
        }

        parse_status_code(&output.stdout)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

fn parse_status_code(stdout: &str) -> Result<u16> {
    match stdout.trim().parse::<u16>() {
        Ok(code) if code > 0 => Ok(code),
        _ => Err(VigilError::Command(format!(
            "no HTTP status in output: {:?}",
            stdout.trim()
        ))),
    }
}
