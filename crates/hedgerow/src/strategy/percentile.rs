// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{Strategy, StrategyConfig, StrategyOutcome};

pub(super) const DEFAULT_PERCENTILE: u8 = 95;
const DEFAULT_WINDOW_SIZE: usize = 1000;
const DEFAULT_MIN_SAMPLES: usize = 10;
const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

#[derive(Debug)]
struct State {
    samples: VecDeque<u64>,
    window_size: usize,
    percentile: u8,
    min_samples: usize,
    current_delay_ms: u64,
}

/// Tracks a rolling percentile of observed primary latencies and hedges at
/// that percentile, per Google's "Tail at Scale" recommendation.
#[derive(Debug)]
pub(super) struct PercentileStrategy {
    state: Mutex<State>,
}

impl PercentileStrategy {
    pub(super) fn new(cfg: &StrategyConfig) -> Self {
        let initial_delay_ms = cfg.initial_delay_ms.unwrap_or(DEFAULT_INITIAL_DELAY_MS);
        Self {
            state: Mutex::new(State {
                samples: VecDeque::new(),
                window_size: cfg.window_size.unwrap_or(DEFAULT_WINDOW_SIZE),
                percentile: cfg.percentile.unwrap_or(DEFAULT_PERCENTILE),
                min_samples: cfg.min_samples.unwrap_or(DEFAULT_MIN_SAMPLES),
                current_delay_ms: initial_delay_ms,
            }),
        }
    }
}

impl Strategy for PercentileStrategy {
    fn calculate_delay(&self, _cfg: &StrategyConfig) -> Option<Duration> {
        let state = self.state.lock().expect(crate::POISONED_LOCK);
        Some(Duration::from_millis(state.current_delay_ms))
    }

    fn update(&self, outcome: &StrategyOutcome) {
        let latency = outcome
            .primary_latency
            .or(outcome.backup_latency)
            .unwrap_or(outcome.total_latency);
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

        let mut state = self.state.lock().expect(crate::POISONED_LOCK);
        if state.samples.len() >= state.window_size {
            state.samples.pop_front();
        }
        state.samples.push_back(latency_ms);

        if state.samples.len() >= state.min_samples {
            let sorted: Vec<u64> = {
                let mut v: Vec<u64> = state.samples.iter().copied().collect();
                v.sort_unstable();
                v
            };
            state.current_delay_ms = crate::metrics::percentile_nearest_rank(&sorted, state.percentile);
        }
    }

    fn current_delay_ms(&self) -> Option<u64> {
        Some(self.state.lock().expect(crate::POISONED_LOCK).current_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome_with_latency(ms: u64) -> StrategyOutcome {
        StrategyOutcome {
            hedged: false,
            hedge_won: false,
            hedge_delay: None,
            primary_latency: Some(Duration::from_millis(ms)),
            backup_latency: None,
            total_latency: Duration::from_millis(ms),
            error: false,
        }
    }

    #[test]
    fn keeps_initial_delay_before_min_samples_is_reached() {
        let cfg = StrategyConfig::default().initial_delay_ms(100).min_samples(10);
        let strategy = PercentileStrategy::new(&cfg);
        for i in 1..5 {
            strategy.update(&outcome_with_latency(i * 1000));
        }
        assert_eq!(strategy.current_delay_ms(), Some(100));
    }

    #[test]
    fn p95_of_20_synthetic_outcomes_matches_nearest_rank() {
        let cfg = StrategyConfig::default().percentile(95).min_samples(1);
        let strategy = PercentileStrategy::new(&cfg);
        for i in 1..=20u64 {
            strategy.update(&outcome_with_latency(10 * i));
        }
        assert_eq!(strategy.current_delay_ms(), Some(190));
    }

    #[test]
    fn evicts_oldest_sample_once_window_is_full() {
        let cfg = StrategyConfig::default().window_size(3).min_samples(1);
        let strategy = PercentileStrategy::new(&cfg);
        strategy.update(&outcome_with_latency(10));
        strategy.update(&outcome_with_latency(20));
        strategy.update(&outcome_with_latency(30));
        strategy.update(&outcome_with_latency(1000));
        let state = strategy.state.lock().unwrap();
        assert_eq!(state.samples, VecDeque::from([20, 30, 1000]));
    }
}
