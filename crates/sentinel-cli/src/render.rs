use std::fmt::Write as _;

use sentinel_dashboard::{DashboardHeader, MetricSample, MetricsSnapshot, RefreshStats};

pub const PRODUCT_NAME: &str = "SentinelStack";

pub fn landing() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{PRODUCT_NAME}");
    let _ = writeln!(out, "Infrastructure monitoring for your services.");
    let _ = writeln!(out);
    let _ = writeln!(out, "Run `sentinel login` to sign in.");
    out
}

pub fn login_prompt(reason: Option<&str>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Sign in to {PRODUCT_NAME}");
    if let Some(reason) = reason {
        let _ = writeln!(out, "error: {reason}");
    }
    let _ = writeln!(out, "usage: sentinel login --username <USERNAME> --password <PASSWORD>");
    out
}

pub fn header(header: &DashboardHeader) -> String {
    format!(
        "[{}] {}    {PRODUCT_NAME} dashboard\n",
        header.avatar_initial, header.display_name
    )
}

pub fn snapshot(snapshot: &MetricsSnapshot, stats: &RefreshStats) -> String {
    let mut out = String::new();
    if snapshot.is_empty() {
        let _ = writeln!(out, "no metrics yet");
    } else {
        let resources = snapshot.resources;
        let _ = writeln!(
            out,
            "cpu {}%  memory {}%  pods {}  nodes {}",
            resources.cpu, resources.memory, resources.pods, resources.nodes
        );
        series(&mut out, "requests/min", &snapshot.request_rate, |s| s.requests);
        series(&mut out, "errors", &snapshot.error_rate, |s| s.errors);
        series(&mut out, "latency ms", &snapshot.latency, |s| s.latency);
    }
    if let Some(error) = stats.last_error.as_deref() {
        let _ = writeln!(out, "last refresh failed: {error}");
    }
    out
}

fn series(out: &mut String, title: &str, samples: &[MetricSample], value: fn(&MetricSample) -> u32) {
    let latest = samples.last();
    let _ = writeln!(
        out,
        "{title:<14} latest {:>4} at {}",
        latest.map_or(0, value),
        latest.map_or("--", |sample| sample.time.as_str())
    );
    let values = samples
        .iter()
        .map(|sample| value(sample).to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(out, "{:<14} {values}", "");
}
