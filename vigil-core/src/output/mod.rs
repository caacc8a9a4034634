mod human;
mod json;

pub use human::HumanFormatter;
pub use json::JsonFormatter;

use serde::{Deserialize, Serialize};

use crate::evaluator::DomainReport;
use crate::model::Problem;
use crate::scheduler::SweepSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" | "pretty" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

pub trait OutputFormatter {
    /// Problems found for one domain. An empty slice means healthy.
    fn format_problems(&self, domain: &str, problems: &[Problem]) -> String;
    /// Raw probe results, including the checks that passed.
    fn format_report(&self, report: &DomainReport) -> String;
    fn format_summary(&self, summary: &SweepSummary) -> String;
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter + Send> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter::new()),
        OutputFormat::Json => Box::new(JsonFormatter::new()),
    }
}
