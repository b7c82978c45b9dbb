use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, simulation: &surge_core::Simulation);
    fn progress(&self) -> Option<surge_core::ProgressFn>;
    fn print_report(&self, report: &surge_core::RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}

/// Percentiles shown in summaries.
pub(crate) const REPORTED_PERCENTILES: [(&str, f64); 4] =
    [("p50", 50.0), ("p75", 75.0), ("p95", 95.0), ("p99", 99.0)];
