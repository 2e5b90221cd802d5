// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::{Strategy, StrategyConfig, StrategyOutcome};

/// Always waits the same configured delay before firing a backup.
///
/// Stateless: `update` observes nothing, because there is nothing to learn.
#[derive(Debug)]
pub(super) struct FixedStrategy {
    delay: Duration,
}

impl FixedStrategy {
    pub(super) fn new(cfg: &StrategyConfig) -> Self {
        let delay_ms = cfg.delay_ms.expect("validated before construction");
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Strategy for FixedStrategy {
    fn calculate_delay(&self, _cfg: &StrategyConfig) -> Option<Duration> {
        Some(self.delay)
    }

    fn update(&self, _outcome: &StrategyOutcome) {}

    fn current_delay_ms(&self) -> Option<u64> {
        Some(u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX))
    }
}
