use crate::metrics::ReportSnapshot;

use super::runner::TaskResult;

/// Final summary of one task run, one line per entry.
#[must_use]
pub fn summary_lines(name: &str, snapshot: &ReportSnapshot) -> Vec<String> {
    let counters = &snapshot.counters;
    let latency = &snapshot.latency;
    let completed = counters.completed();
    let secs = snapshot.elapsed.as_secs_f64();
    let success_rate = if completed == 0 {
        0.0
    } else {
        counters.succeeded as f64 * 100.0 / completed as f64
    };
    let qps = if secs > 0.0 {
        completed as f64 / secs
    } else {
        0.0
    };
    let (p50, p90, p99) = latency.percentiles_ms();

    let mut lines = vec![
        format!("Task: {}", name),
        format!("Duration: {:.2}s", secs),
        format!("Total Requests: {}", counters.sent),
        format!("Successful: {} ({:.2}%)", counters.succeeded, success_rate),
        format!("Failed: {}", counters.failed_total()),
    ];
    for (label, count) in counters.failed.breakdown() {
        lines.push(format!("  {}: {}", label, count));
    }
    if snapshot.in_flight > 0 {
        lines.push(format!("Unfinished: {}", snapshot.in_flight));
    }
    lines.push(format!("Avg Latency: {:.2}ms", latency.mean_ms()));
    lines.push(format!(
        "Min/Max Latency: {:.2}ms / {:.2}ms",
        latency.min_ms(),
        latency.max_ms()
    ));
    lines.push(format!(
        "P50/P90/P99 Latency: {:.2}ms / {:.2}ms / {:.2}ms",
        p50, p90, p99
    ));
    lines.push(format!("Avg QPS: {:.2}", qps));
    lines.push(format!("Downloaded: {}", format_bytes(counters.bytes_received)));
    lines
}

/// Prints every finished task's summary to stdout, failed tasks as one line.
pub fn print_results(results: &[TaskResult]) {
    for (name, result) in results {
        println!();
        match result {
            Ok(snapshot) => {
                for line in summary_lines(name, snapshot) {
                    println!("{}", line);
                }
            }
            Err(err) => println!("Task: {} failed: {}", name, err),
        }
    }
}

pub(super) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = "KiB";
    for next in UNITS.iter().skip(1) {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.2} {}", value, unit)
}
