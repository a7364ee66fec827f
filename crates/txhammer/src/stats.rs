use std::time::Duration;

use serde::Serialize;

use crate::{config::TxKind, tracker::TransactionTiming};

/// Finalization statistics over confirmed transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingStats {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p99_ms: u64,
}

impl TimingStats {
    /// Returns `None` when none of the timings were confirmed.
    pub fn from_timings<'a>(
        timings: impl IntoIterator<Item = &'a TransactionTiming>,
    ) -> Option<Self> {
        let mut times: Vec<u64> = timings.into_iter().filter_map(|t| t.finalization_ms).collect();
        if times.is_empty() {
            return None;
        }
        times.sort_unstable();

        let count = times.len();
        let sum: u64 = times.iter().sum();
        Some(Self {
            count,
            avg_ms: sum as f64 / count as f64,
            min_ms: times[0],
            max_ms: times[count - 1],
            p50_ms: percentile(&times, 50.0),
            p99_ms: percentile(&times, 99.0),
        })
    }
}

/// `sorted` must be non-empty and ascending.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Snapshot of one worker at completion.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerResult {
    pub worker_id: usize,
    pub transaction_count: u64,
    pub errors: Vec<String>,
    pub timings: Vec<TransactionTiming>,
    pub finalization: Option<TimingStats>,
}

impl WorkerResult {
    pub fn new(
        worker_id: usize,
        transaction_count: u64,
        errors: Vec<String>,
        timings: Vec<TransactionTiming>,
    ) -> Self {
        let finalization = TimingStats::from_timings(&timings);
        Self { worker_id, transaction_count, errors, timings, finalization }
    }

    pub fn confirmed(&self) -> usize {
        self.timings.iter().filter(|t| t.is_confirmed()).count()
    }
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub kind: TxKind,
    pub workers: usize,
    pub total_sent: u64,
    pub total_errors: u64,
    pub confirmed: u64,
    pub unconfirmed: u64,
    pub finalization: Option<TimingStats>,
    /// Length of the send phase, which excludes the confirmation drain
    pub send_secs: f64,
    /// Wall time of the whole run, drain included
    pub elapsed_secs: f64,
    pub results: Vec<WorkerResult>,
}

impl RunSummary {
    pub fn aggregate(
        kind: TxKind,
        results: Vec<WorkerResult>,
        send_phase: Duration,
        elapsed: Duration,
    ) -> Self {
        let total_sent = results.iter().map(|r| r.transaction_count).sum();
        let total_errors = results.iter().map(|r| r.errors.len() as u64).sum();
        let tracked: u64 = results.iter().map(|r| r.timings.len() as u64).sum();
        let confirmed: u64 = results.iter().map(|r| r.confirmed() as u64).sum();
        let finalization = TimingStats::from_timings(results.iter().flat_map(|r| &r.timings));

        Self {
            kind,
            workers: results.len(),
            total_sent,
            total_errors,
            confirmed,
            unconfirmed: tracked - confirmed,
            finalization,
            send_secs: send_phase.as_secs_f64(),
            elapsed_secs: elapsed.as_secs_f64(),
            results,
        }
    }

    /// Send rate over the send phase.
    pub fn tps(&self) -> f64 {
        if self.send_secs <= 0.0 { 0.0 } else { self.total_sent as f64 / self.send_secs }
    }
}

pub fn print_final_report(summary: &RunSummary) {
    println!();
    println!(
        "Done! Sent {} {} transactions across {} workers.",
        summary.total_sent, summary.kind, summary.workers
    );
    println!("  Send phase: {:.1}s ({:.2} tx/s)", summary.send_secs, summary.tps());
    println!("  Elapsed: {:.1}s (including confirmation drain)", summary.elapsed_secs);
    if summary.total_errors > 0 {
        println!("  Total errors: {}", summary.total_errors);
    }

    let Some(stats) = &summary.finalization else {
        println!("  No transactions confirmed, no timing statistics available.");
        return;
    };

    println!();
    println!("Transaction timing statistics:");
    println!(
        "  Confirmed: {}/{} transactions",
        summary.confirmed,
        summary.confirmed + summary.unconfirmed
    );
    if summary.unconfirmed > 0 {
        println!("  Unconfirmed: {} transactions", summary.unconfirmed);
    }
    println!("  Average finalization time: {:.0}ms", stats.avg_ms);
    println!("  Min finalization time: {}ms", stats.min_ms);
    println!("  Max finalization time: {}ms", stats.max_ms);
    println!("  p50 / p99: {}ms / {}ms", stats.p50_ms, stats.p99_ms);
}
