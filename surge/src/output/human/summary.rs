use std::fmt::Write as _;

use surge_core::{RequestStats, RunReport, Verdict};

use super::{format_duration, format_ms, format_percent, format_rate};
use crate::output::REPORTED_PERCENTILES;

const NAME_WIDTH: usize = 24;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    writeln!(
        out,
        "summary: {} ({}, {})",
        report.simulation,
        format_duration(report.elapsed),
        report.stop_reason
    )
    .ok();

    let mut header = format!(
        "  {:<NAME_WIDTH$} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "request", "count", "ok", "ko", "ko%", "rps"
    );
    for col in ["min", "mean", "stdev"] {
        write!(header, " {col:>8}").ok();
    }
    for (label, _) in REPORTED_PERCENTILES {
        write!(header, " {label:>8}").ok();
    }
    write!(header, " {:>8}", "max").ok();
    writeln!(out, "{header}").ok();

    for stats in &report.stats.requests {
        render_row(&mut out, stats);
    }
    render_row(&mut out, &report.stats.global);
    out.push_str("  (latency in ms)\n");

    render_errors(&mut out, report);

    let u = &report.users;
    writeln!(
        out,
        "users: scheduled={} started={} completed={} failed={} cancelled={} dropped={} feeder_exhausted={} peak_active={}",
        u.scheduled,
        u.started,
        u.completed,
        u.failed,
        u.cancelled,
        u.dropped,
        u.feeder_exhausted,
        u.peak_active
    )
    .ok();

    render_verdict(&mut out, &report.verdict);
    out
}

fn render_row(out: &mut String, s: &RequestStats) {
    let mut name = s.name.to_string();
    if name.chars().count() > NAME_WIDTH {
        name = name.chars().take(NAME_WIDTH - 1).collect::<String>() + "~";
    }

    let mut row = format!(
        "  {:<NAME_WIDTH$} {:>8} {:>8} {:>8} {:>8} {:>8}",
        name,
        s.count,
        s.ok,
        s.ko,
        format_percent(s.ko_percent()),
        format_rate(s.requests_per_sec()),
    );
    for v in [s.min_ms(), s.mean_ms(), s.stdev_ms()] {
        write!(row, " {:>8}", format_ms(v)).ok();
    }
    for (_, p) in REPORTED_PERCENTILES {
        write!(row, " {:>8}", format_ms(s.percentile_ms(p))).ok();
    }
    write!(row, " {:>8}", format_ms(s.max_ms())).ok();
    writeln!(out, "{row}").ok();
}

fn render_errors(out: &mut String, report: &RunReport) {
    let with_errors: Vec<&RequestStats> = report
        .stats
        .requests
        .iter()
        .filter(|s| !s.errors().is_empty())
        .collect();
    if with_errors.is_empty() {
        return;
    }

    out.push_str("errors:\n");
    for s in with_errors {
        for (message, count) in s.errors() {
            let pct = *count as f64 * 100.0 / (s.ko.max(1)) as f64;
            writeln!(out, "  {}: {message} x{count} ({pct:.1}%)", s.name).ok();
        }
    }
}

fn render_verdict(out: &mut String, verdict: &Verdict) {
    match verdict {
        Verdict::Pass => out.push_str("assertions: PASS\n"),
        Verdict::Fail(violations) => {
            writeln!(out, "assertions: FAIL ({} violated)", violations.len()).ok();
            for v in violations {
                writeln!(out, "  {v}").ok();
            }
        }
    }
}
