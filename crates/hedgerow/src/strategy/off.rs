// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::{Strategy, StrategyConfig, StrategyOutcome};

/// Hedging disabled: the primary always runs to completion or the overall
/// deadline, and no backup is ever fired.
#[derive(Debug)]
pub(super) struct OffStrategy;

impl Strategy for OffStrategy {
    fn calculate_delay(&self, _cfg: &StrategyConfig) -> Option<Duration> {
        None
    }

    fn update(&self, _outcome: &StrategyOutcome) {}

    fn current_delay_ms(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_hedges() {
        let cfg = StrategyConfig::default();
        assert_eq!(OffStrategy.calculate_delay(&cfg), None);
    }
}
