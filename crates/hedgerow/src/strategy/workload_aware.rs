// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::config::{ModelComplexity, Priority, TimeOfDay};
use super::{Strategy, StrategyConfig, StrategyOutcome};

const MIN_DELAY_MS: f64 = 10.0;

fn prompt_length_factor(prompt_length: Option<u32>) -> f64 {
    match prompt_length {
        Some(len) if len > 4000 => 2.5,
        Some(len) if len > 2000 => 2.0,
        Some(len) if len > 1000 => 1.5,
        _ => 1.0,
    }
}

fn model_complexity_factor(complexity: Option<ModelComplexity>) -> f64 {
    match complexity.unwrap_or_default() {
        ModelComplexity::Simple => 0.5,
        ModelComplexity::Medium => 1.0,
        ModelComplexity::Complex => 2.0,
    }
}

fn time_of_day_factor(time_of_day: Option<TimeOfDay>) -> f64 {
    match time_of_day.unwrap_or_default() {
        TimeOfDay::Peak => 0.7,
        TimeOfDay::Normal => 1.0,
        TimeOfDay::OffPeak => 1.3,
    }
}

fn priority_factor(priority: Option<Priority>) -> f64 {
    match priority.unwrap_or_default() {
        Priority::High => 0.6,
        Priority::Normal => 1.0,
        Priority::Low => 1.5,
    }
}

/// Stateless multiplier strategy: scales a base delay by independent
/// factors for prompt length, model complexity, time of day, and request
/// priority. Missing or unrecognized tags default to a 1.0 multiplier.
#[derive(Debug)]
pub(super) struct WorkloadAwareStrategy;

impl Strategy for WorkloadAwareStrategy {
    fn calculate_delay(&self, cfg: &StrategyConfig) -> Option<Duration> {
        let base_delay_ms = cfg.base_delay_ms.expect("validated before construction") as f64;
        let factor = prompt_length_factor(cfg.prompt_length)
            * model_complexity_factor(cfg.model_complexity)
            * time_of_day_factor(cfg.time_of_day)
            * priority_factor(cfg.priority);
        let delay_ms = (base_delay_ms * factor).max(MIN_DELAY_MS).round();
        Some(Duration::from_millis(delay_ms as u64))
    }

    fn update(&self, _outcome: &StrategyOutcome) {}

    fn current_delay_ms(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, 1.0)]
    #[case(Some(500), 1.0)]
    #[case(Some(1500), 1.5)]
    #[case(Some(2500), 2.0)]
    #[case(Some(5000), 2.5)]
    fn prompt_length_factor_matches_table(#[case] len: Option<u32>, #[case] expected: f64) {
        assert_eq!(prompt_length_factor(len), expected);
    }

    #[test]
    fn combines_all_dimensions_multiplicatively() {
        let cfg = StrategyConfig::default()
            .base_delay_ms(100)
            .prompt_length(5000)
            .model_complexity(ModelComplexity::Complex)
            .time_of_day(TimeOfDay::OffPeak)
            .priority(Priority::Low);
        // 100 * 2.5 * 2.0 * 1.3 * 1.5 = 975
        let delay = WorkloadAwareStrategy.calculate_delay(&cfg).unwrap();
        assert_eq!(delay, Duration::from_millis(975));
    }

    #[test]
    fn clamps_to_at_least_ten_millis() {
        let cfg = StrategyConfig::default()
            .base_delay_ms(1)
            .model_complexity(ModelComplexity::Simple)
            .priority(Priority::High);
        let delay = WorkloadAwareStrategy.calculate_delay(&cfg).unwrap();
        assert_eq!(delay, Duration::from_millis(10));
    }
}
