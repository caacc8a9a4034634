//! Per-domain evaluation: decide which probes to run, run them, and reduce
//! their results to a list of problems.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::{DomainRecord, Problem, ProblemKind, Scheme};
use crate::probe::{
    CertificateCheck, CertificateProbe, ExpiryCheck, ExpiryProbe, HttpProbe, ProbeOutcome,
    ReachabilityProbe, ReachabilityReport, TlsProbe, WhoisProbe,
};
use crate::settings::{EffectivePolicy, UserSettings};

/// Raw probe results for one domain. Probes that were not run stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainReport {
    pub domain: String,
    pub policy: EffectivePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachability: Option<ReachabilityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<ExpiryCheck>,
}

impl DomainReport {
    /// Applies the policy thresholds. Order: http, https, ssl, whois.
    pub fn problems(&self) -> Vec<Problem> {
        let mut problems = Vec::new();

        if let Some(reachability) = &self.reachability {
            for scheme in [Scheme::Http, Scheme::Https] {
                if let Some(ProbeOutcome::Fail { error }) = reachability.get(scheme) {
                    problems.push(Problem::new(
                        &self.domain,
                        scheme.into(),
                        format!("{} unreachable: {}", scheme.as_str().to_uppercase(), error),
                    ));
                }
            }
        }

        match &self.certificate {
            Some(CertificateCheck::Invalid { error }) => problems.push(Problem::new(
                &self.domain,
                ProblemKind::Ssl,
                format!("SSL certificate invalid: {}", error),
            )),
            Some(CertificateCheck::Valid(info)) if info.days_left < self.policy.ssl_warn_days => {
                problems.push(Problem::new(
                    &self.domain,
                    ProblemKind::Ssl,
                    format!(
                        "SSL certificate {} ({}, issued by {})",
                        describe_days_left(info.days_left),
                        info.expires_at,
                        info.issuer
                    ),
                ))
            }
            _ => {}
        }

        match &self.expiry {
            Some(ExpiryCheck::Invalid { error }) => problems.push(Problem::new(
                &self.domain,
                ProblemKind::Whois,
                format!("Domain expiry unknown: {}", error),
            )),
            Some(ExpiryCheck::Valid(info)) if info.days_left < self.policy.whois_warn_days => {
                problems.push(Problem::new(
                    &self.domain,
                    ProblemKind::Whois,
                    format!(
                        "Domain registration {} ({})",
                        describe_days_left(info.days_left),
                        info.expires_at
                    ),
                ))
            }
            _ => {}
        }

        problems
    }
}

fn describe_days_left(days: i64) -> String {
    match days {
        d if d < 0 => format!("expired {} days ago", -d),
        0 => "expires today".to_string(),
        1 => "expires in 1 day".to_string(),
        d => format!("expires in {} days", d),
    }
}

/// Outcome of evaluating one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Evaluation {
    Completed { problems: Vec<Problem> },
    Failed { error: String },
}

impl Evaluation {
    /// Problems to report. A failed evaluation becomes one synthetic
    /// [`ProblemKind::Evaluation`] problem.
    pub fn into_problems(self, domain: &str) -> Vec<Problem> {
        match self {
            Evaluation::Completed { problems } => problems,
            Evaluation::Failed { error } => vec![Problem::new(
                domain,
                ProblemKind::Evaluation,
                format!("Error while checking {}: {}", domain, error),
            )],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Evaluation::Failed { .. })
    }
}

pub struct DomainEvaluator {
    reachability: Arc<dyn ReachabilityProbe>,
    certificate: Arc<dyn CertificateProbe>,
    expiry: Arc<dyn ExpiryProbe>,
}

impl DomainEvaluator {
    pub fn new(
        reachability: Arc<dyn ReachabilityProbe>,
        certificate: Arc<dyn CertificateProbe>,
        expiry: Arc<dyn ExpiryProbe>,
    ) -> Self {
        Self {
            reachability,
            certificate,
            expiry,
        }
    }

    /// Builds the production probes.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpProbe::from_config(&config.http)?),
            Arc::new(TlsProbe::new(&config.tls)),
            Arc::new(WhoisProbe::from_config(&config.whois)),
        ))
    }

    /// Runs the enabled probes concurrently and returns their raw results.
    #[instrument(skip_all, fields(domain = %domain.name))]
    pub async fn inspect(&self, domain: &DomainRecord, settings: &UserSettings) -> DomainReport {
        let policy = EffectivePolicy::resolve(domain, settings);
        let name = domain.name.as_str();
        let schemes = policy.schemes();

        debug!(?policy, "Evaluating domain");

        let reachability = async {
            if schemes.is_empty() {
                None
            } else {
                Some(self.reachability.check(name, &schemes).await)
            }
        };
        let certificate = async {
            if policy.track_ssl {
                Some(self.certificate.inspect(name).await)
            } else {
                None
            }
        };
        let expiry = async {
            if policy.track_whois {
                Some(self.expiry.lookup(name).await)
            } else {
                None
            }
        };

        let (reachability, certificate, expiry) = tokio::join!(reachability, certificate, expiry);

        DomainReport {
            domain: domain.name.clone(),
            policy,
            reachability,
            certificate,
            expiry,
        }
    }

    pub async fn evaluate(&self, domain: &DomainRecord, settings: &UserSettings) -> Vec<Problem> {
        self.inspect(domain, settings).await.problems()
    }

    /// Like [`evaluate`](Self::evaluate), but a panic anywhere in the probes
    /// comes back as [`Evaluation::Failed`] instead of unwinding further.
    pub async fn evaluate_guarded(
        &self,
        domain: &DomainRecord,
        settings: &UserSettings,
    ) -> Evaluation {
        match AssertUnwindSafe(self.evaluate(domain, settings))
            .catch_unwind()
            .await
        {
            Ok(problems) => Evaluation::Completed { problems },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(domain = %domain.name, error = %message, "Domain evaluation panicked");
                Evaluation::Failed { error: message }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "evaluation panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{CertificateInfo, ExpiryInfo};
    use crate::testing::{MockProbes, ProbeScript};
    use chrono::NaiveDate;

    fn all_off() -> UserSettings {
        UserSettings {
            owner_id: 1,
            track_http: false,
            track_https: false,
            track_ssl: false,
            track_whois: false,
            ..UserSettings::default()
        }
    }

    fn cert(days_left: i64) -> CertificateCheck {
        CertificateCheck::Valid(CertificateInfo {
            issuer: "Test CA".into(),
            expires_at: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            days_left,
        })
    }

    fn expiry(days_left: i64) -> ExpiryCheck {
        ExpiryCheck::Valid(ExpiryInfo {
            expires_at: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            days_left,
        })
    }

    #[tokio::test]
    async fn test_all_tracks_off_makes_no_calls() {
        let probes = MockProbes::new(ProbeScript::healthy());
        let evaluator = probes.evaluator();
        let domain = DomainRecord::new(1, "example.com", 1);

        let problems = evaluator.evaluate(&domain, &all_off()).await;
        assert!(problems.is_empty());
        assert_eq!(probes.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_domain_override_disables_ssl() {
        let probes = MockProbes::new(ProbeScript {
            certificate: cert(1),
            ..ProbeScript::healthy()
        });
        let evaluator = probes.evaluator();
        let mut domain = DomainRecord::new(1, "example.com", 1);
        domain.track_ssl = Some(false);

        let problems = evaluator.evaluate(&domain, &UserSettings::new(1)).await;
        assert!(problems.is_empty());
        assert_eq!(probes.certificate_calls(), 0);
        assert_eq!(probes.expiry_calls(), 1);
    }

    #[tokio::test]
    async fn test_ssl_threshold() {
        let settings = UserSettings::new(1);
        let domain = DomainRecord::new(1, "example.com", 1);

        let expiring = MockProbes::new(ProbeScript {
            certificate: cert(10),
            ..ProbeScript::healthy()
        });
        let problems = expiring.evaluator().evaluate(&domain, &settings).await;
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, ProblemKind::Ssl);
        assert!(problems[0].message.contains("expires in 10 days"));

        let fine = MockProbes::new(ProbeScript {
            certificate: cert(20),
            ..ProbeScript::healthy()
        });
        assert!(fine.evaluator().evaluate(&domain, &settings).await.is_empty());
    }

    #[tokio::test]
    async fn test_days_left_equal_to_threshold_is_not_a_problem() {
        let settings = UserSettings::new(1);
        let domain = DomainRecord::new(1, "example.com", 1);

        let at_threshold = MockProbes::new(ProbeScript {
            certificate: cert(settings.ssl_warn_days),
            expiry: expiry(settings.whois_warn_days),
            ..ProbeScript::healthy()
        });
        assert!(at_threshold.evaluator().evaluate(&domain, &settings).await.is_empty());

        let one_below = MockProbes::new(ProbeScript {
            certificate: cert(settings.ssl_warn_days - 1),
            expiry: expiry(settings.whois_warn_days - 1),
            ..ProbeScript::healthy()
        });
        let kinds: Vec<ProblemKind> = one_below
            .evaluator()
            .evaluate(&domain, &settings)
            .await
            .iter()
            .map(|p| p.kind)
            .collect();
        assert_eq!(kinds, vec![ProblemKind::Ssl, ProblemKind::Whois]);
    }

    #[tokio::test]
    async fn test_whois_threshold_uses_override() {
        let mut domain = DomainRecord::new(1, "example.com", 1);
        domain.whois_warn_days = Some(90);
        let probes = MockProbes::new(ProbeScript {
            expiry: expiry(60),
            ..ProbeScript::healthy()
        });

        let problems = probes.evaluator().evaluate(&domain, &UserSettings::new(1)).await;
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, ProblemKind::Whois);
    }

    #[tokio::test]
    async fn test_invalid_results_are_problems_in_order() {
        let probes = MockProbes::new(ProbeScript {
            http: ProbeOutcome::Fail {
                error: "connection refused".into(),
            },
            https: ProbeOutcome::Ok { code: 200 },
            certificate: CertificateCheck::Invalid {
                error: "certificate has expired".into(),
            },
            expiry: ExpiryCheck::Invalid {
                error: "no expiry date field".into(),
            },
            ..ProbeScript::healthy()
        });
        let domain = DomainRecord::new(1, "example.com", 1);

        let problems = probes.evaluator().evaluate(&domain, &UserSettings::new(1)).await;
        let kinds: Vec<ProblemKind> = problems.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![ProblemKind::Http, ProblemKind::Ssl, ProblemKind::Whois]);
        assert!(problems[0].message.contains("connection refused"));
        assert_eq!(probes.reachability_calls(), 1);
    }

    #[tokio::test]
    async fn test_both_schemes_share_one_reachability_call() {
        let probes = MockProbes::new(ProbeScript::healthy());
        let domain = DomainRecord::new(1, "example.com", 1);

        let report = probes.evaluator().inspect(&domain, &UserSettings::new(1)).await;
        assert_eq!(probes.reachability_calls(), 1);
        let reachability = report.reachability.unwrap();
        assert!(reachability.http.is_some() && reachability.https.is_some());
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_evaluation() {
        let probes = MockProbes::new(ProbeScript {
            panic_on: Some("broken.example".into()),
            ..ProbeScript::healthy()
        });
        let domain = DomainRecord::new(1, "broken.example", 1);

        let evaluation = probes
            .evaluator()
            .evaluate_guarded(&domain, &UserSettings::new(1))
            .await;
        assert!(evaluation.is_failed());

        let problems = evaluation.into_problems("broken.example");
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, ProblemKind::Evaluation);
        assert!(problems[0].message.contains("broken.example"));
    }

    #[test]
    fn test_describe_days_left() {
        assert_eq!(describe_days_left(-3), "expired 3 days ago");
        assert_eq!(describe_days_left(0), "expires today");
        assert_eq!(describe_days_left(1), "expires in 1 day");
        assert_eq!(describe_days_left(12), "expires in 12 days");
    }
}
