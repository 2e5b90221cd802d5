// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Mutex;
use std::time::Duration;

use super::{Strategy, StrategyConfig, StrategyOutcome};

pub(super) const DEFAULT_BASE_DELAY_MS: u64 = 100;
pub(super) const DEFAULT_MIN_DELAY_MS: u64 = 10;
pub(super) const DEFAULT_MAX_DELAY_MS: u64 = 5000;
pub(super) const DEFAULT_INCREASE_FACTOR: f64 = 1.5;
pub(super) const DEFAULT_DECREASE_FACTOR: f64 = 0.9;
pub(super) const DEFAULT_ERROR_FACTOR: f64 = 2.0;

#[derive(Debug)]
struct State {
    current_delay_ms: f64,
    min_delay_ms: f64,
    max_delay_ms: f64,
    increase_factor: f64,
    decrease_factor: f64,
    error_factor: f64,
    consecutive_successes: u64,
    consecutive_failures: u64,
    total_adjustments: u64,
}

/// AIMD-style exponential backoff: shrinks the delay on a won hedge, grows
/// it on a lost hedge or an error, bounded to `[min_delay, max_delay]`.
///
/// Addressed by `strategy_name`; the first call with a given name lazily
/// creates the instance using that call's configuration.
#[derive(Debug)]
pub(super) struct ExpBackoffStrategy {
    state: Mutex<State>,
}

impl ExpBackoffStrategy {
    pub(super) fn new(cfg: &StrategyConfig) -> Self {
        let min_delay_ms = cfg.exponential_min_delay_ms.unwrap_or(DEFAULT_MIN_DELAY_MS) as f64;
        let max_delay_ms = cfg.exponential_max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS) as f64;
        let base_delay_ms = cfg.exponential_base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS) as f64;
        Self {
            state: Mutex::new(State {
                current_delay_ms: base_delay_ms,
                min_delay_ms,
                max_delay_ms,
                increase_factor: cfg.exponential_increase_factor.unwrap_or(DEFAULT_INCREASE_FACTOR),
                decrease_factor: cfg.exponential_decrease_factor.unwrap_or(DEFAULT_DECREASE_FACTOR),
                error_factor: cfg.exponential_error_factor.unwrap_or(DEFAULT_ERROR_FACTOR),
                consecutive_successes: 0,
                consecutive_failures: 0,
                total_adjustments: 0,
            }),
        }
    }
}

impl Strategy for ExpBackoffStrategy {
    fn calculate_delay(&self, _cfg: &StrategyConfig) -> Option<Duration> {
        let state = self.state.lock().expect(crate::POISONED_LOCK);
        Some(Duration::from_millis(state.current_delay_ms.round() as u64))
    }

    fn update(&self, outcome: &StrategyOutcome) {
        let mut state = self.state.lock().expect(crate::POISONED_LOCK);
        let (min, max) = (state.min_delay_ms, state.max_delay_ms);

        if outcome.hedge_won {
            state.current_delay_ms = (state.current_delay_ms * state.decrease_factor).max(min);
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
        } else if outcome.hedged {
            state.current_delay_ms = (state.current_delay_ms * state.increase_factor).min(max);
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
        } else if outcome.error {
            state.current_delay_ms = (state.current_delay_ms * state.error_factor).min(max);
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
        } else {
            // Primary was fast enough that no backup fired; treat like a win.
            state.current_delay_ms = (state.current_delay_ms * state.decrease_factor).max(min);
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
        }
        state.total_adjustments += 1;
    }

    fn current_delay_ms(&self) -> Option<u64> {
        Some(self.state.lock().expect(crate::POISONED_LOCK).current_delay_ms.round() as u64)
    }
}
