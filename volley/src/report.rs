//! Human and machine readable renderings of a run.

use std::fmt::Write as _;
use std::time::Duration;

use volley_core::result::REPORTED_PERCENTILES;
use volley_core::{Progress, RunResult, RunSpec};

pub fn intro(spec: &RunSpec) -> String {
    let bound = match (spec.requests, spec.duration) {
        (Some(n), _) => format!("{n} request(s)"),
        (None, Some(d)) => format!("for {}", humantime::format_duration(d)),
        (None, None) => "until interrupted".to_owned(),
    };
    let mut line = format!(
        "Volleying {} {bound} using {} connection(s)",
        spec.request.url, spec.workers
    );
    if let Some(rate) = spec.rate {
        let _ = write!(line, " at {rate} req/s");
    }
    line
}

/// One-line status, overwritten in place on a terminal.
pub fn progress_line(progress: &Progress, spec: &RunSpec) -> String {
    let counts = &progress.counts;
    let secs = progress.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        counts.requests as f64 / secs
    } else {
        0.0
    };
    let done = match (spec.requests, spec.duration) {
        (Some(total), _) => Some(counts.requests as f64 / total as f64),
        (None, Some(d)) => Some(secs / d.as_secs_f64()),
        (None, None) => None,
    };
    let mut line = String::new();
    if let Some(done) = done {
        let _ = write!(line, "{:>5.1}% ", (done * 100.0).min(100.0));
    }
    let _ = write!(
        line,
        "{:>8} reqs {:>10.2} reqs/s {:>8} errors [{}]",
        counts.requests,
        rate,
        counts.errors,
        format_elapsed(progress.elapsed),
    );
    line
}

pub fn plain_text(result: &RunResult, latencies: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<14}{:>12}{:>12}{:>12}", "Statistics", "Avg", "Stdev", "Max");
    let _ = writeln!(
        out,
        "  {:<12}{:>12.2}{:>12.2}{:>12.2}",
        "Reqs/sec", result.rps.mean, result.rps.stdev, result.rps.max
    );
    let _ = writeln!(
        out,
        "  {:<12}{:>12}{:>12}{:>12}",
        "Latency",
        format_micros(result.latency.mean),
        format_micros(result.latency.stdev),
        format_micros(result.latency.max as f64),
    );
    if latencies {
        let _ = writeln!(out, "  Latency Distribution");
        for p in REPORTED_PERCENTILES {
            let micros = result.latency.percentile(p).unwrap_or_default();
            let _ = writeln!(out, "    {:>4}%  {:>10}", p, format_micros(micros as f64));
        }
    }
    let status = &result.status;
    let _ = writeln!(out, "  HTTP codes:");
    let _ = writeln!(
        out,
        "    1xx - {}, 2xx - {}, 3xx - {}, 4xx - {}, 5xx - {}",
        status.informational,
        status.success,
        status.redirect,
        status.client_error,
        status.server_error,
    );
    let _ = writeln!(out, "    others - {}", status.others);
    if result.errors > 0 {
        let _ = writeln!(out, "  Errors:");
        for (message, count) in &result.error_messages {
            let _ = writeln!(out, "    {message:>30} - {count}");
        }
    }
    let _ = writeln!(out, "  Throughput: {:>12}", format_throughput(result.bytes_per_sec));
    out
}

pub fn json(result: &RunResult) -> serde_json::Result<String> {
    serde_json::to_string(result)
}

fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

pub fn format_micros(us: f64) -> String {
    if us < 1_000.0 {
        format!("{us:.2}us")
    } else if us < 1_000_000.0 {
        format!("{:.2}ms", us / 1_000.0)
    } else {
        format!("{:.2}s", us / 1_000_000.0)
    }
}

pub fn format_throughput(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2}{}", UNITS[unit])
}
