// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pluggable delay-selection strategies.
//!
//! A [`Strategy`] answers one question for the executor: "how long should I
//! wait on the primary attempt before firing a backup?" Every strategy also
//! observes the outcome of the request it advised, via [`Strategy::update`],
//! so it can adapt. Strategy instances are addressed by `(kind, name)` and
//! looked up lazily through [`StrategyRegistry`], mirroring the per-key
//! lazy-instance registry this workspace already uses for circuit breaker
//! engines: state lives behind a `Mutex`, one writer at a time, readers take
//! point-in-time snapshots.

mod adaptive;
mod config;
mod exp_backoff;
mod fixed;
mod off;
mod percentile;
mod registry;
mod workload_aware;

use std::fmt;
use std::time::Duration;

pub use config::{ModelComplexity, Priority, StrategyConfig, TimeOfDay};
pub use registry::StrategyRegistry;

/// Selects which built-in delay-selection algorithm governs a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StrategyKind {
    /// Always wait the same configured delay.
    Fixed,
    /// Track a rolling percentile of observed primary latencies.
    Percentile,
    /// Thompson-sampling bandit over a fixed set of candidate delays.
    Adaptive,
    /// Stateless multiplier keyed off request-shaped context tags.
    WorkloadAware,
    /// AIMD-style exponential backoff keyed by hedge outcomes.
    ExpBackoff,
    /// Hedging disabled; the primary always runs to completion/deadline.
    Off,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fixed => "fixed",
            Self::Percentile => "percentile",
            Self::Adaptive => "adaptive",
            Self::WorkloadAware => "workload_aware",
            Self::ExpBackoff => "exp_backoff",
            Self::Off => "off",
        };
        f.write_str(name)
    }
}

/// The outcome of one executor call, as reported to a strategy's
/// [`Strategy::update`].
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    /// Whether a backup attempt was ever fired for this request.
    pub hedged: bool,
    /// Whether a backup attempt (rather than the primary) produced the
    /// winning value.
    pub hedge_won: bool,
    /// The delay this strategy chose for the request, if hedging was not
    /// disabled.
    pub hedge_delay: Option<Duration>,
    /// Latency of the primary attempt, if it completed.
    pub primary_latency: Option<Duration>,
    /// Latency of the winning backup attempt, if one won.
    pub backup_latency: Option<Duration>,
    /// Total wall-clock time for the whole request.
    pub total_latency: Duration,
    /// Set when the request ended in an error rather than a value.
    pub error: bool,
}

/// A pluggable delay-selection algorithm.
///
/// Implementations must be safe under many concurrent `calculate_delay` and
/// `update` calls: interior state lives behind a `Mutex` so mutation is
/// always single-writer.
pub(crate) trait Strategy: fmt::Debug + Send + Sync {
    /// Choose the delay (ms, as a [`Duration`]) to wait on the primary
    /// before firing a backup. `None` means "never hedge".
    fn calculate_delay(&self, cfg: &StrategyConfig) -> Option<Duration>;

    /// Record the outcome of a request this strategy advised.
    fn update(&self, outcome: &StrategyOutcome);

    /// A snapshot of this strategy instance's current delay, for
    /// [`StrategyRegistry::stats`].
    fn current_delay_ms(&self) -> Option<u64>;
}

/// Point-in-time snapshot of a strategy instance, returned by
/// [`StrategyRegistry::stats`].
#[derive(Debug, Clone)]
pub struct StrategyStats {
    /// Which algorithm this instance runs.
    pub kind: StrategyKind,
    /// The delay (ms) this instance would currently hand out, if defined.
    pub current_delay_ms: Option<u64>,
}

/// Validates a [`StrategyConfig`] against the rules for `kind`, per the
/// per-strategy requirements in this module's strategy implementations.
pub(crate) fn validate(kind: StrategyKind, cfg: &StrategyConfig) -> Result<(), String> {
    match kind {
        StrategyKind::Fixed => {
            if cfg.delay_ms.is_none() {
                return Err("fixed strategy requires delay_ms".to_string());
            }
        }
        StrategyKind::Percentile => {
            let p = cfg.percentile.unwrap_or(percentile::DEFAULT_PERCENTILE);
            if !(50..=99).contains(&p) {
                return Err(format!("percentile must be in 50..=99, got {p}"));
            }
        }
        StrategyKind::Adaptive => {
            let candidates = cfg
                .delay_candidates
                .as_deref()
                .unwrap_or(adaptive::DEFAULT_CANDIDATES);
            if candidates.len() < 2 {
                return Err("adaptive strategy requires at least 2 delay candidates".to_string());
            }
        }
        StrategyKind::ExpBackoff => {
            let min = cfg.exponential_min_delay_ms.unwrap_or(exp_backoff::DEFAULT_MIN_DELAY_MS);
            let max = cfg.exponential_max_delay_ms.unwrap_or(exp_backoff::DEFAULT_MAX_DELAY_MS);
            let base = cfg.exponential_base_delay_ms.unwrap_or(exp_backoff::DEFAULT_BASE_DELAY_MS);
            let inc = cfg.exponential_increase_factor.unwrap_or(exp_backoff::DEFAULT_INCREASE_FACTOR);
            let dec = cfg.exponential_decrease_factor.unwrap_or(exp_backoff::DEFAULT_DECREASE_FACTOR);
            let err = cfg.exponential_error_factor.unwrap_or(exp_backoff::DEFAULT_ERROR_FACTOR);
            if min >= max {
                return Err(format!("exponential_min_delay_ms ({min}) must be < exponential_max_delay_ms ({max})"));
            }
            if base < min || base > max {
                return Err(format!("exponential_base_delay_ms ({base}) must be within [{min}, {max}]"));
            }
            if inc <= 1.0 {
                return Err(format!("exponential_increase_factor must be > 1.0, got {inc}"));
            }
            if !(0.0 < dec && dec < 1.0) {
                return Err(format!("exponential_decrease_factor must be in (0, 1), got {dec}"));
            }
            if err <= 1.0 {
                return Err(format!("exponential_error_factor must be > 1.0, got {err}"));
            }
        }
        StrategyKind::WorkloadAware => {
            if cfg.base_delay_ms.is_none() {
                return Err("workload_aware strategy requires base_delay_ms".to_string());
            }
        }
        StrategyKind::Off => {}
    }
    Ok(())
}

pub(crate) fn create(kind: StrategyKind, cfg: &StrategyConfig) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Fixed => Box::new(fixed::FixedStrategy::new(cfg)),
        StrategyKind::Percentile => Box::new(percentile::PercentileStrategy::new(cfg)),
        StrategyKind::Adaptive => Box::new(adaptive::AdaptiveStrategy::new(cfg)),
        StrategyKind::WorkloadAware => Box::new(workload_aware::WorkloadAwareStrategy),
        StrategyKind::ExpBackoff => Box::new(exp_backoff::ExpBackoffStrategy::new(cfg)),
        StrategyKind::Off => Box::new(off::OffStrategy),
    }
}

pub(crate) fn percentile_of(values: &[u64], p: u8) -> u64 {
    crate::metrics::percentile_nearest_rank(values, p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_snake_case_names() {
        assert_eq!(StrategyKind::WorkloadAware.to_string(), "workload_aware");
        assert_eq!(StrategyKind::ExpBackoff.to_string(), "exp_backoff");
    }

    #[test]
    fn validate_rejects_fixed_without_delay() {
        let cfg = StrategyConfig::default();
        assert!(validate(StrategyKind::Fixed, &cfg).is_err());
    }

    #[test]
    fn validate_rejects_percentile_out_of_range() {
        let cfg = StrategyConfig::default().percentile(30);
        assert!(validate(StrategyKind::Percentile, &cfg).is_err());
    }

    #[test]
    fn validate_accepts_off_with_no_fields() {
        let cfg = StrategyConfig::default();
        assert!(validate(StrategyKind::Off, &cfg).is_ok());
    }
}
