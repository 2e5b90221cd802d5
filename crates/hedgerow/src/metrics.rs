// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Aggregate metrics sink: a bounded rolling-window sample buffer plus
//! counters, reported back as hedge rate, win rate, cost overhead, and
//! latency percentiles. This is process-wide and independent of any single
//! strategy instance; [`crate::strategy`] strategies learn per-request, this
//! sink summarizes across every request that passes through it.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use tick::Clock;

use crate::executor::OutcomeMetadata;

const DEFAULT_WINDOW_SIZE: usize = 10_000;

/// Nearest-rank percentile over a pre-sorted slice.
///
/// Index = `max(0, ceil(n*p/100) - 1)`. Returns `0` for an empty slice.
pub(crate) fn percentile_nearest_rank(sorted: &[u64], p: u8) -> u64 {
    let Some(&last) = sorted.last() else {
        return 0;
    };
    let n = sorted.len() as f64;
    let rank = (n * f64::from(p) / 100.0).ceil();
    #[expect(clippy::cast_possible_truncation, reason = "rank is always >= 1.0 and <= n here")]
    let index = if rank <= 1.0 { 0 } else { (rank as usize).saturating_sub(1) };
    sorted.get(index).copied().unwrap_or(last)
}

/// Nearest-rank `p`-th percentile of `values` (`p` in `0..=100`).
///
/// Sorts a copy of `values`; returns `0` for an empty slice.
#[must_use]
pub fn percentile(values: &[u64], p: u8) -> u64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    percentile_nearest_rank(&sorted, p)
}

/// Nearest-rank percentiles of `values` at every point in `ps`, sorting
/// `values` only once.
#[must_use]
pub fn percentiles(values: &[u64], ps: &[u8]) -> Vec<u64> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    ps.iter().map(|&p| percentile_nearest_rank(&sorted, p)).collect()
}

#[derive(Debug)]
struct State {
    samples: VecDeque<u64>,
    window_size: usize,
    total: u64,
    hedged: u64,
    hedge_wins: u64,
    sum_cost: f64,
    opened_at: Instant,
}

impl State {
    fn reset(&mut self, now: Instant) {
        self.samples.clear();
        self.total = 0;
        self.hedged = 0;
        self.hedge_wins = 0;
        self.sum_cost = 0.0;
        self.opened_at = now;
    }
}

/// A point-in-time snapshot produced by [`MetricsSink::get_stats`].
///
/// Every ratio here is guarded against division by zero: whenever the
/// denominator is `0`, the field reports `0.0` rather than `NaN` or
/// panicking.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub struct MetricsStats {
    /// Total requests recorded since the sink was created or last reset.
    pub total: u64,
    /// Number of latency samples currently held in the rolling window.
    pub sample_count: usize,
    /// `hedged / total`.
    pub hedge_rate: f64,
    /// `hedge_wins / hedged`.
    pub hedge_win_rate: f64,
    /// `hedge_wins / total`.
    pub hedge_effectiveness: f64,
    /// 50th percentile latency (ms) over the current window.
    pub p50: u64,
    /// 90th percentile latency (ms) over the current window.
    pub p90: u64,
    /// 95th percentile latency (ms) over the current window.
    pub p95: u64,
    /// 99th percentile latency (ms) over the current window.
    pub p99: u64,
    /// 99.9th percentile latency (ms) over the current window.
    pub p999: u64,
    /// Minimum latency (ms) over the current window.
    pub min: u64,
    /// Maximum latency (ms) over the current window.
    pub max: u64,
    /// Mean latency (ms) over the current window.
    pub mean: f64,
    /// Median latency (ms, nearest-rank P50) over the current window.
    pub median: f64,
    /// Cumulative `1 + backups` cost across every recorded request.
    pub total_cost: f64,
    /// `total_cost / total`.
    pub avg_cost: f64,
    /// `round((total_cost - total) / total * 100, 2)`.
    pub cost_overhead_pct: f64,
    /// Wall-clock time (ms) since the sink was created or last reset.
    pub uptime_ms: u64,
    /// `total * 1000 / uptime_ms`.
    pub throughput: f64,
}

/// Bounded rolling-window sample buffer plus counters, process-wide.
///
/// Single writer at a time via an internal `Mutex`, mirroring the
/// serialisation [`crate::strategy::StrategyRegistry`] uses for strategy
/// state. Reads (`get_stats`) take a point-in-time snapshot.
#[derive(Debug)]
pub struct MetricsSink {
    clock: Clock,
    state: Mutex<State>,
}

impl MetricsSink {
    /// Create a sink with the default window size (10,000 samples).
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self::with_window_size(clock, DEFAULT_WINDOW_SIZE)
    }

    /// Create a sink with an explicit rolling-window sample capacity.
    #[must_use]
    pub fn with_window_size(clock: &Clock, window_size: usize) -> Self {
        Self {
            clock: clock.clone(),
            state: Mutex::new(State {
                samples: VecDeque::with_capacity(window_size.min(DEFAULT_WINDOW_SIZE)),
                window_size,
                total: 0,
                hedged: 0,
                hedge_wins: 0,
                sum_cost: 0.0,
                opened_at: clock.instant(),
            }),
        }
    }

    /// Record the outcome of one hedged request.
    pub fn record(&self, outcome: &OutcomeMetadata) {
        let mut state = self.state.lock().expect(crate::POISONED_LOCK);
        if state.samples.len() >= state.window_size {
            state.samples.pop_front();
        }
        state.samples.push_back(outcome.total_latency_ms);
        state.total += 1;
        if outcome.hedged {
            state.hedged += 1;
        }
        if outcome.hedge_won {
            state.hedge_wins += 1;
        }
        state.sum_cost += outcome.cost;
    }

    /// A snapshot of every aggregate statistic this sink tracks.
    ///
    /// Returns `None` until at least one request has been recorded (or
    /// right after a [`MetricsSink::reset`]), rather than a snapshot of
    /// all-zero counters.
    #[must_use]
    pub fn get_stats(&self) -> Option<MetricsStats> {
        let now = self.clock.instant();
        let state = self.state.lock().expect(crate::POISONED_LOCK);

        if state.total == 0 {
            return None;
        }

        let mut sorted: Vec<u64> = state.samples.iter().copied().collect();
        sorted.sort_unstable();
        let p50 = percentile_nearest_rank(&sorted, 50);
        let p90 = percentile_nearest_rank(&sorted, 90);
        let p95 = percentile_nearest_rank(&sorted, 95);
        let p99 = percentile_nearest_rank(&sorted, 99);
        let p999 = percentile_999(&sorted);

        let sample_count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let mean = ratio(sum as f64, sample_count as f64);
        let median = p50 as f64;
        let min = sorted.first().copied().unwrap_or(0);
        let max = sorted.last().copied().unwrap_or(0);

        let uptime_ms = u64::try_from(now.saturating_duration_since(state.opened_at).as_millis()).unwrap_or(u64::MAX);
        let total_f = state.total as f64;

        Some(MetricsStats {
            total: state.total,
            sample_count,
            hedge_rate: ratio(state.hedged as f64, total_f),
            hedge_win_rate: ratio(state.hedge_wins as f64, state.hedged as f64),
            hedge_effectiveness: ratio(state.hedge_wins as f64, total_f),
            p50,
            p90,
            p95,
            p99,
            p999,
            min,
            max,
            mean,
            median,
            total_cost: state.sum_cost,
            avg_cost: ratio(state.sum_cost, total_f),
            cost_overhead_pct: round2(ratio(state.sum_cost - total_f, total_f) * 100.0),
            uptime_ms,
            throughput: ratio(total_f * 1000.0, uptime_ms as f64),
        })
    }

    /// Clear every sample and counter, restarting the uptime clock.
    pub fn reset(&self) {
        let now = self.clock.instant();
        let mut state = self.state.lock().expect(crate::POISONED_LOCK);
        state.reset(now);
    }
}

fn percentile_999(sorted: &[u64]) -> u64 {
    // Nearest-rank P99.9 needs a fractional percentile the u8-based helper
    // above cannot express; compute it directly here.
    let Some(&last) = sorted.last() else {
        return 0;
    };
    let n = sorted.len() as f64;
    let rank = (n * 99.9 / 100.0).ceil();
    #[expect(clippy::cast_possible_truncation, reason = "rank is always >= 1.0 and <= n here")]
    let index = if rank <= 1.0 { 0 } else { (rank as usize).saturating_sub(1) };
    sorted.get(index).copied().unwrap_or(last)
}

/// `a / b`, guarded to return `0.0` rather than `NaN`/`inf` when `b == 0`.
fn ratio(a: f64, b: f64) -> f64 {
    if b == 0.0 { 0.0 } else { a / b }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
