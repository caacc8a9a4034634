//! Scripted stand-ins for probes, fetchers and WHOIS sources.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Result, VigilError};
use crate::evaluator::DomainEvaluator;
use crate::model::{Problem, Scheme};
use crate::notify::Notifier;
use crate::probe::{
    CertificateCheck, CertificateInfo, CertificateProbe, ExpiryCheck, ExpiryInfo, ExpiryProbe,
    Fetcher, ProbeOutcome, ReachabilityProbe, ReachabilityReport, WhoisSource,
};

/// Fetcher that replays canned results.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<u16>>>,
    repeat: Option<std::result::Result<u16, String>>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    /// Same result on every call. `Err` messages become timeouts.
    pub fn always(result: std::result::Result<u16, &str>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(result.map_err(str::to_string)),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Results in order, then an error once the script runs out.
    pub fn sequence(results: Vec<Result<u16>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<u16> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(Ok(code)) => Ok(*code),
            Some(Err(msg)) => Err(VigilError::Timeout(msg.clone())),
            None => Err(VigilError::Other("script exhausted".into())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// WHOIS source returning fixed text or a fixed error.
pub struct StaticWhois(std::result::Result<String, String>);

impl StaticWhois {
    pub fn ok(text: &str) -> Self {
        Self(Ok(text.to_string()))
    }

    pub fn err(message: &str) -> Self {
        Self(Err(message.to_string()))
    }
}

#[async_trait]
impl WhoisSource for StaticWhois {
    async fn query(&self, _domain: &str) -> Result<String> {
        self.0.clone().map_err(VigilError::Whois)
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// What the mock probes report.
#[derive(Debug, Clone)]
pub struct ProbeScript {
    pub http: ProbeOutcome,
    pub https: ProbeOutcome,
    pub certificate: CertificateCheck,
    pub expiry: ExpiryCheck,
    /// Domains whose HTTP and HTTPS checks fail.
    pub failing: HashSet<String>,
    /// Reachability panics for this domain.
    pub panic_on: Option<String>,
    /// Added latency for every reachability check.
    pub delay: Duration,
}

impl ProbeScript {
    pub fn healthy() -> Self {
        Self {
            http: ProbeOutcome::Ok { code: 200 },
            https: ProbeOutcome::Ok { code: 200 },
            certificate: CertificateCheck::Valid(CertificateInfo {
                issuer: "Test CA".into(),
                expires_at: NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date"),
                days_left: 365,
            }),
            expiry: ExpiryCheck::Valid(ExpiryInfo {
                expires_at: NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date"),
                days_left: 365,
            }),
            failing: HashSet::new(),
            panic_on: None,
            delay: Duration::ZERO,
        }
    }
}

/// One object implementing all three probe traits, counting calls.
pub struct MockProbes {
    script: ProbeScript,
    reachability_calls: AtomicUsize,
    certificate_calls: AtomicUsize,
    expiry_calls: AtomicUsize,
}

impl MockProbes {
    pub fn new(script: ProbeScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            reachability_calls: AtomicUsize::new(0),
            certificate_calls: AtomicUsize::new(0),
            expiry_calls: AtomicUsize::new(0),
        })
    }

    pub fn reachability_calls(&self) -> usize {
        self.reachability_calls.load(Ordering::SeqCst)
    }

    pub fn certificate_calls(&self) -> usize {
        self.certificate_calls.load(Ordering::SeqCst)
    }

    pub fn expiry_calls(&self) -> usize {
        self.expiry_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.reachability_calls() + self.certificate_calls() + self.expiry_calls()
    }

    /// An evaluator wired to these probes for all three checks.
    pub fn evaluator(self: &Arc<Self>) -> DomainEvaluator {
        DomainEvaluator::new(self.clone(), self.clone(), self.clone())
    }
}

#[async_trait]
impl ReachabilityProbe for MockProbes {
    async fn check(&self, domain: &str, schemes: &[Scheme]) -> ReachabilityReport {
        self.reachability_calls.fetch_add(1, Ordering::SeqCst);
        if !self.script.delay.is_zero() {
            tokio::time::sleep(self.script.delay).await;
        }
        if self.script.panic_on.as_deref() == Some(domain) {
            panic!("probe exploded for {}", domain);
        }

        let failing = self.script.failing.contains(domain);
        let mut report = ReachabilityReport::default();
        for scheme in schemes {
            let outcome = if failing {
                ProbeOutcome::Fail {
                    error: "connection refused".into(),
                }
            } else {
                match scheme {
                    Scheme::Http => self.script.http.clone(),
                    Scheme::Https => self.script.https.clone(),
                }
            };
            report.set(*scheme, outcome);
        }
        report
    }
}

#[async_trait]
impl CertificateProbe for MockProbes {
    async fn inspect(&self, _domain: &str) -> CertificateCheck {
        self.certificate_calls.fetch_add(1, Ordering::SeqCst);
        self.script.certificate.clone()
    }
}

#[async_trait]
impl ExpiryProbe for MockProbes {
    async fn lookup(&self, _domain: &str) -> ExpiryCheck {
        self.expiry_calls.fetch_add(1, Ordering::SeqCst);
        self.script.expiry.clone()
    }
}

/// Notifier that records every call.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(i64, String, Vec<Problem>)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(i64, String, Vec<Problem>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, owner_id: i64, domain: &str, problems: &[Problem]) {
        self.calls
            .lock()
            .unwrap()
            .push((owner_id, domain.to_string(), problems.to_vec()));
    }
}
