use std::io::Write as _;
use std::sync::Arc;

mod summary;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, simulation: &surge_core::Simulation) {
        println!("simulation: {}", simulation.name());
        if let Some(base) = simulation.base_url() {
            println!("base url: {base}");
        }
        let profile = simulation.injection();
        println!(
            "users: {} over {} ({} injection steps), chain: {} steps",
            profile.total_users(),
            format_duration(profile.total_duration()),
            profile.steps().len(),
            simulation.chain().len()
        );
        println!();
    }

    fn progress(&self) -> Option<surge_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let users = u.live.users;
            let step = match u.injection_step {
                Some(i) => format!("{}/{}", i + 1, u.injection_steps),
                None => "done".to_string(),
            };
            let line = format!(
                "[{}] users active={} done={}/{} requests={} ko={} rps={} injection={step}",
                format_duration(u.elapsed),
                users.active,
                users.completed + users.failed + users.cancelled + users.dropped,
                users.scheduled,
                u.live.requests,
                u.live.ko,
                format_rate(u.rps_now),
            );
            // Progress goes to stderr so stdout stays the report.
            let _ = writeln!(std::io::stderr().lock(), "{line}");
        }))
    }

    fn print_report(&self, report: &surge_core::RunReport) -> anyhow::Result<()> {
        let rendered = summary::render(report);
        let mut out = std::io::stdout().lock();
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

pub(crate) fn format_duration(d: std::time::Duration) -> String {
    let ms = d.as_millis();
    if ms >= 1_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{ms}ms")
    }
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_ms(v: Option<f64>) -> String {
    match v {
        Some(v) if v >= 100.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.1}"),
        None => "-".to_string(),
    }
}

pub(crate) fn format_percent(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.1}%"),
        None => "-".to_string(),
    }
}
