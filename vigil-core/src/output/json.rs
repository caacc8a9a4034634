use serde::Serialize;

use super::OutputFormatter;
use crate::evaluator::DomainReport;
use crate::model::Problem;
use crate::scheduler::SweepSummary;

pub struct JsonFormatter {
    pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ProblemList<'a> {
    domain: &'a str,
    healthy: bool,
    problems: &'a [Problem],
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_problems(&self, domain: &str, problems: &[Problem]) -> String {
        self.to_json(&ProblemList {
            domain,
            healthy: problems.is_empty(),
            problems,
        })
    }

    fn format_report(&self, report: &DomainReport) -> String {
        self.to_json(report)
    }

    fn format_summary(&self, summary: &SweepSummary) -> String {
        self.to_json(summary)
    }
}
