use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    cursor, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::metrics::ReportAccumulator;
use crate::shutdown::{ShutdownReceiver, wait_for_shutdown};

const PANEL_REFRESH: Duration = Duration::from_millis(500);
const LOG_REFRESH: Duration = Duration::from_secs(5);

/// Live totals of one running task.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct PanelRow {
    pub(super) name: String,
    pub(super) sent: u64,
    pub(super) succeeded: u64,
    pub(super) failed: u64,
    pub(super) in_flight: u64,
    pub(super) qps: f64,
    pub(super) mean_ms: f64,
    pub(super) breakdown: Vec<(&'static str, u64)>,
}

/// Redraws a panel on stderr every 500ms while tasks run. Without a
/// terminal the same numbers are logged every few seconds instead.
pub(super) fn spawn_live_display(
    panels: Vec<(String, Arc<ReportAccumulator>)>,
    no_color: bool,
    mut stop_rx: ShutdownReceiver,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if panels.is_empty() {
            return;
        }
        let terminal = std::io::stderr().is_terminal();
        let mut ticker = tokio::time::interval(if terminal {
            PANEL_REFRESH
        } else {
            LOG_REFRESH
        });
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut drawn: u16 = 0;

        loop {
            tokio::select! {
                () = wait_for_shutdown(&mut stop_rx) => break,
                _ = ticker.tick() => {
                    let rows = collect_rows(&panels);
                    if !terminal {
                        log_rows(&rows);
                        continue;
                    }
                    match draw_panel(&rows, drawn, no_color) {
                        Ok(lines) => drawn = lines,
                        Err(_) => return,
                    }
                }
            }
        }

        if terminal {
            drop(draw_panel(&collect_rows(&panels), drawn, no_color));
        }
    })
}

fn collect_rows(panels: &[(String, Arc<ReportAccumulator>)]) -> Vec<PanelRow> {
    panels
        .iter()
        .map(|(name, accumulator)| {
            let snapshot = accumulator.snapshot(false);
            let completed = snapshot.counters.completed();
            let secs = snapshot.elapsed.as_secs_f64();
            PanelRow {
                name: name.clone(),
                sent: snapshot.counters.sent,
                succeeded: snapshot.counters.succeeded,
                failed: snapshot.counters.failed_total(),
                in_flight: snapshot.in_flight,
                qps: if secs > 0.0 {
                    completed as f64 / secs
                } else {
                    0.0
                },
                mean_ms: snapshot.latency.mean_ms(),
                breakdown: snapshot.counters.failed.breakdown(),
            }
        })
        .collect()
}

fn log_rows(rows: &[PanelRow]) {
    for row in rows {
        info!(
            "Task '{}': sent {}, ok {}, failed {}, in flight {}, {:.1} qps, avg {:.2}ms",
            row.name, row.sent, row.succeeded, row.failed, row.in_flight, row.qps, row.mean_ms
        );
    }
}

/// Text and colour of each panel line, one entry per segment.
pub(super) fn panel_lines(rows: &[PanelRow]) -> Vec<Vec<(String, Option<Color>)>> {
    let mut lines = Vec::with_capacity(rows.len().saturating_mul(2));
    for row in rows {
        let failed_color = (row.failed > 0).then_some(Color::Red);
        lines.push(vec![
            (format!("{:<20}", row.name), Some(Color::Cyan)),
            (
                format!(" sent {:>9}  ok {:>9}", row.sent, row.succeeded),
                None,
            ),
            (format!("  failed {:>7}", row.failed), failed_color),
            (
                format!(
                    "  in-flight {:>5}  {:>9.1} qps  avg {:>8.2}ms",
                    row.in_flight, row.qps, row.mean_ms
                ),
                Some(Color::Yellow),
            ),
        ]);
        if !row.breakdown.is_empty() {
            let detail = row
                .breakdown
                .iter()
                .map(|(label, count)| format!("{} {}", label, count))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(vec![(format!("{:<20} {}", "", detail), Some(Color::Red))]);
        }
    }
    lines
}

fn draw_panel(rows: &[PanelRow], previous: u16, no_color: bool) -> Result<u16, std::io::Error> {
    let lines = panel_lines(rows);
    let mut out = std::io::stderr();
    if previous > 0 {
        queue!(out, cursor::MoveUp(previous))?;
    }
    queue!(out, cursor::MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
    for segments in &lines {
        for (text, color) in segments {
            match color {
                Some(color) if !no_color => {
                    queue!(out, SetForegroundColor(*color), Print(text), ResetColor)?;
                }
                Some(_) | None => queue!(out, Print(text))?,
            }
        }
        queue!(out, Print("\n"))?;
    }
    out.flush()?;
    Ok(u16::try_from(lines.len()).unwrap_or(u16::MAX))
}
