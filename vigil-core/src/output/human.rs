use colored::Colorize;

use super::OutputFormatter;
use crate::colors::CatppuccinExt;
use crate::evaluator::DomainReport;
use crate::model::{Problem, Scheme};
use crate::probe::{CertificateCheck, ExpiryCheck, ProbeOutcome};
use crate::scheduler::SweepSummary;

fn format_duration_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    if total_secs == 0 {
        format!("{}ms", ms)
    } else if total_secs < 60 {
        format!("{}.{}s", total_secs, (ms % 1000) / 100)
    } else if total_secs < 3600 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h {}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}

pub struct HumanFormatter {
    use_colors: bool,
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    fn label(&self, text: &str) -> String {
        if self.use_colors {
            text.sky().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn value(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_white().to_string()
        } else {
            text.to_string()
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.use_colors {
            text.subtext0().to_string()
        } else {
            text.to_string()
        }
    }

    fn success(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_green().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn warning(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_yellow().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn header(&self, text: &str) -> String {
        if self.use_colors {
            format!("\n{}\n{}", text.lavender().bold(), "─".repeat(text.len()).subtext0())
        } else {
            format!("\n{}\n{}", text, "-".repeat(text.len()))
        }
    }

    /// Red under the alert threshold, yellow under twice the threshold.
    fn days_left(&self, date: &str, days_left: i64, threshold: i64) -> String {
        let text = format!("{} ({} days)", date, days_left);
        if days_left < threshold {
            self.error(&text)
        } else if days_left < threshold.saturating_mul(2) {
            self.warning(&text)
        } else {
            self.value(&text)
        }
    }

    fn outcome(&self, outcome: &ProbeOutcome) -> String {
        match outcome {
            ProbeOutcome::Ok { code } => self.success(&code.to_string()),
            ProbeOutcome::Fail { error } => format!("{} {}", self.error("FAIL"), self.value(error)),
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_problems(&self, domain: &str, problems: &[Problem]) -> String {
        let mut output = Vec::new();

        output.push(self.header(&format!("Check: {}", domain)));

        if problems.is_empty() {
            output.push(format!("  {} No problems found", self.success("✓")));
            return output.join("\n");
        }

        for problem in problems {
            output.push(format!(
                "  {} [{}] {}",
                self.error("✗"),
                self.label(&problem.kind.to_string()),
                self.value(&problem.message)
            ));
        }

        output.join("\n")
    }

    fn format_report(&self, report: &DomainReport) -> String {
        let mut output = Vec::new();
        let not_checked = self.muted("not checked");

        output.push(self.header(&format!("Probe: {}", report.domain)));

        for scheme in [Scheme::Http, Scheme::Https] {
            let line = match report.reachability.as_ref().and_then(|r| r.get(scheme)) {
                Some(outcome) => self.outcome(outcome),
                None => not_checked.clone(),
            };
            output.push(format!(
                "  {}: {}",
                self.label(&scheme.as_str().to_uppercase()),
                line
            ));
        }

        output.push(format!("\n  {}:", self.label("SSL Certificate")));
        match &report.certificate {
            Some(CertificateCheck::Valid(info)) => {
                output.push(format!(
                    "    {}: {}",
                    self.label("Issuer"),
                    self.value(&info.issuer)
                ));
                output.push(format!(
                    "    {}: {}",
                    self.label("Expires"),
                    self.days_left(
                        &info.expires_at.format("%Y-%m-%d").to_string(),
                        info.days_left,
                        report.policy.ssl_warn_days
                    )
                ));
            }
            Some(CertificateCheck::Invalid { error }) => {
                output.push(format!("    {}: {}", self.label("Status"), self.error(error)));
            }
            None => output.push(format!("    {}", not_checked)),
        }

        output.push(format!("\n  {}:", self.label("Registration")));
        match &report.expiry {
            Some(ExpiryCheck::Valid(info)) => {
                output.push(format!(
                    "    {}: {}",
                    self.label("Expires"),
                    self.days_left(
                        &info.expires_at.format("%Y-%m-%d").to_string(),
                        info.days_left,
                        report.policy.whois_warn_days
                    )
                ));
            }
            Some(ExpiryCheck::Invalid { error }) => {
                output.push(format!("    {}: {}", self.label("Status"), self.error(error)));
            }
            None => output.push(format!("    {}", not_checked)),
        }

        output.join("\n")
    }

    fn format_summary(&self, summary: &SweepSummary) -> String {
        let mut output = Vec::new();

        output.push(self.header(&format!(
            "Sweep: {}",
            summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )));

        output.push(format!(
            "  {}: {}/{}",
            self.label("Evaluated"),
            summary.evaluated,
            summary.domains
        ));

        let failed = summary.failed.to_string();
        output.push(format!(
            "  {}: {}",
            self.label("Failed"),
            if summary.failed > 0 {
                self.error(&failed)
            } else {
                self.success(&failed)
            }
        ));

        if summary.skipped > 0 {
            output.push(format!(
                "  {}: {}",
                self.label("Skipped"),
                self.warning(&summary.skipped.to_string())
            ));
        }

        let notified = summary.notified.to_string();
        output.push(format!(
            "  {}: {}",
            self.label("With problems"),
            if summary.notified > 0 {
                self.warning(&notified)
            } else {
                self.success(&notified)
            }
        ));

        if summary.timed_out {
            output.push(format!(
                "  {}: {}",
                self.label("Status"),
                self.warning("Timed out")
            ));
        }

        output.push(format!(
            "  {}: {}",
            self.label("Duration"),
            self.value(&format_duration_ms(summary.duration_ms))
        ));

        output.join("\n")
    }
}
