use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, instrument, warn};

use super::fetch::{CommandFetcher, Fetcher, ReqwestFetcher};
use super::types::{ProbeOutcome, ReachabilityReport};
use super::ReachabilityProbe;
use crate::config::HttpConfig;
use crate::error::Result;
use crate::model::Scheme;
use crate::retry::{RetryExecutor, RetryPolicy};

/// Two-tier HTTP reachability check.
///
/// The primary fetcher gets several attempts under the retry policy. Only
/// when all of them fail is the fallback fetcher asked, once. A URL is
/// reachable if either tier returns any status code.
pub struct HttpProbe {
    primary: Arc<dyn Fetcher>,
    fallback: Option<Arc<dyn Fetcher>>,
    retry: RetryExecutor,
}

impl HttpProbe {
    pub fn new(
        primary: Arc<dyn Fetcher>,
        fallback: Option<Arc<dyn Fetcher>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            retry: RetryExecutor::new(policy),
        }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let primary: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new(config)?);
        let fallback = config
            .fallback_command
            .as_ref()
            .map(|program| Arc::new(CommandFetcher::new(program.clone(), config)) as Arc<dyn Fetcher>);
        let policy = RetryPolicy::fixed(config.attempts, config.retry_delay);
        Ok(Self::new(primary, fallback, policy))
    }

    #[instrument(skip(self))]
    pub async fn check_url(&self, url: &str) -> ProbeOutcome {
        let primary_error = match self.retry.execute(|| self.primary.fetch(url)).await {
            Ok(code) => return ProbeOutcome::Ok { code },
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return ProbeOutcome::Fail {
                error: primary_error.to_string(),
            };
        };

        debug!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_error,
            "In-process fetch failed, trying fallback"
        );

        match fallback.fetch(url).await {
            Ok(code) => {
                debug!(code, "Fallback fetch succeeded");
                ProbeOutcome::Ok { code }
            }
            Err(fallback_error) => {
                warn!(error = %primary_error, fallback_error = %fallback_error, "URL unreachable");
                ProbeOutcome::Fail {
                    error: format!(
                        "{}; fallback ({}): {}",
                        primary_error,
                        fallback.name(),
                        fallback_error
                    ),
                }
            }
        }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn check(&self, domain: &str, schemes: &[Scheme]) -> ReachabilityReport {
        let outcomes = join_all(
            schemes
                .iter()
                .map(|scheme| async move { (*scheme, self.check_url(&scheme.url_for(domain)).await) }),
        )
        .await;

        let mut report = ReachabilityReport::default();
        for (scheme, outcome) in outcomes {
            report.set(scheme, outcome);
        }
        report
    }
}
