use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use super::{OutputFormatter, REPORTED_PERCENTILES};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _simulation: &surge_core::Simulation) {}

    fn progress(&self) -> Option<surge_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_report(&self, report: &surge_core::RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub requests_per_sec: f64,
    pub users_active: u64,
    pub users_started: u64,
    pub users_scheduled: u64,
    pub injection_step: Option<usize>,
    pub injection_steps: usize,
}

fn build_progress_line(u: &surge_core::ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        requests_total: u.live.requests,
        failed_requests_total: u.live.ko,
        requests_per_sec: u.rps_now,
        users_active: u.live.users.active,
        users_started: u.live.users.started,
        users_scheduled: u.live.users.scheduled,
        injection_step: u.injection_step,
        injection_steps: u.injection_steps,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub simulation: String,
    pub elapsed_secs: f64,
    pub stop_reason: String,
    pub passed: bool,
    pub global: JsonRequestSummary,
    pub requests: Vec<JsonRequestSummary>,
    pub users: JsonUsers,
    pub violations: Vec<JsonViolation>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRequestSummary {
    pub name: String,
    pub count: u64,
    pub ok: u64,
    pub ko: u64,
    pub ok_percent: Option<f64>,
    pub requests_per_sec: f64,
    pub latency_ms: JsonLatency,
    pub errors: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatency {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    #[serde(flatten)]
    pub percentiles: BTreeMap<&'static str, Option<f64>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonUsers {
    pub scheduled: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub dropped: u64,
    pub feeder_exhausted: u64,
    pub peak_active: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonViolation {
    pub scope: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub threshold: f64,
}

fn request_summary(s: &surge_core::RequestStats) -> JsonRequestSummary {
    let percentiles = REPORTED_PERCENTILES
        .iter()
        .map(|(label, p)| (*label, s.percentile_ms(*p)))
        .collect();

    JsonRequestSummary {
        name: s.name.to_string(),
        count: s.count,
        ok: s.ok,
        ko: s.ko,
        ok_percent: s.ok_percent(),
        requests_per_sec: s.requests_per_sec(),
        latency_ms: JsonLatency {
            min: s.min_ms(),
            max: s.max_ms(),
            mean: s.mean_ms(),
            stdev: s.stdev_ms(),
            percentiles,
        },
        errors: s
            .errors()
            .iter()
            .map(|(msg, n)| (msg.to_string(), *n))
            .collect(),
    }
}

fn build_summary_line(report: &surge_core::RunReport) -> JsonSummaryLine {
    let u = &report.users;
    JsonSummaryLine {
        kind: "summary",
        simulation: report.simulation.to_string(),
        elapsed_secs: report.elapsed.as_secs_f64(),
        stop_reason: report.stop_reason.to_string(),
        passed: report.passed(),
        global: request_summary(&report.stats.global),
        requests: report.stats.requests.iter().map(request_summary).collect(),
        users: JsonUsers {
            scheduled: u.scheduled,
            started: u.started,
            completed: u.completed,
            failed: u.failed,
            cancelled: u.cancelled,
            dropped: u.dropped,
            feeder_exhausted: u.feeder_exhausted,
            peak_active: u.peak_active,
        },
        violations: report
            .verdict
            .violations()
            .iter()
            .map(|v| JsonViolation {
                scope: v.scope.to_string(),
                expression: v.expression.to_string(),
                observed: v.observed,
                threshold: v.threshold,
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
