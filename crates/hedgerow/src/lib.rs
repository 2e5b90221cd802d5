// Copyright (c) Microsoft Corporation.

#![expect(
    rustdoc::broken_intra_doc_links,
    reason = "Too ugly to make 'live links' possible with the combination of features"
)]

//! Request hedging: speculative backup attempts that race the primary to
//! reduce tail latency.
//!
//! This crate implements hedged requests as described by Dean & Barroso in
//! ["The Tail at Scale"](https://research.google/pubs/pub40801/): a primary
//! attempt runs, and if it has not returned within an adaptively-chosen
//! delay, one or more backup attempts race it. Whichever attempt finishes
//! first wins; the losers are cancelled.
//!
//! # Runtime Agnostic Design
//!
//! This crate is designed to be **runtime agnostic**, using [`tick::Clock`]
//! rather than calling into a specific async runtime's timer directly. Tasks
//! are still spawned via [`tokio::spawn`], since racing independently
//! cancellable attempts needs a task per attempt.
//!
//! # Core Types
//!
//! - [`request`]: hedge a single request, racing a primary against staggered
//!   backups under one of five [`strategy`] delay-selection algorithms.
//! - [`multi_tier`]: escalate across an ordered list of distinct [`Tier`]
//!   functions instead of duplicates of the same one.
//! - [`MetricsSink`]: an aggregate, process-wide rolling-window collector of
//!   hedge rate, win rate, cost overhead, and latency percentiles.
//! - [`HedgingOptions`]: the shared clock, telemetry, and strategy registry
//!   bundle that [`request`] and [`multi_tier`] consult.
//!
//! # Quick Start
//!
//! ```rust
//! # use std::time::Duration;
//! # use hedgerow::{HedgeConfig, HedgingOptions};
//! # use hedgerow::strategy::{StrategyConfig, StrategyKind};
//! # async fn example() {
//! let clock = tick::Clock::new_tokio();
//! let options = HedgingOptions::<(), &'static str>::new(&clock).pipeline_name("search");
//!
//! let settings = HedgeConfig::new()
//!     .strategy_kind(StrategyKind::Fixed)
//!     .strategy_config(StrategyConfig::default().delay_ms(50))
//!     .timeout_ms(1000)
//!     .build()
//!     .unwrap();
//!
//! let (value, outcome) = hedgerow::request(|| async { Ok::<_, String>("result") }, &settings, &options)
//!     .await
//!     .unwrap();
//! assert_eq!(value, "result");
//! let _ = outcome.hedged;
//! # }
//! ```
//!
//! # Metrics
//!
//! [`MetricsSink`] is independent of any single strategy instance: strategies
//! learn per-request delay targets, while the sink summarizes every request
//! that passes through it, across strategies and pipelines.
//!
//! ```rust
//! # use hedgerow::MetricsSink;
//! let clock = tick::Clock::new_frozen();
//! let sink = MetricsSink::new(&clock);
//! assert!(sink.get_stats().is_none());
//! ```

pub mod error;
pub mod executor;
pub mod metrics;
pub mod multi_tier;
pub(crate) mod options;
mod rnd;
pub mod request_config;
pub mod strategy;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

/// Message used for every `.expect()` on a poisoned `Mutex` in this crate.
///
/// A poisoned lock means some other thread holding it panicked mid-update;
/// this crate has no recovery story for that beyond propagating the panic,
/// since the guarded state (strategy windows, metrics samples) cannot be
/// trusted once a writer died partway through mutating it.
pub(crate) const POISONED_LOCK: &str = "hedgerow: lock poisoned by a panicked holder";

pub use error::{ErrorKind, HedgingError};
pub use executor::OutcomeMetadata;
pub use metrics::{MetricsSink, MetricsStats, percentile, percentiles};
pub use multi_tier::{QualityScored, Tier, TierOutcome, Unscored};
pub use options::{HedgingOptions, NotSet, Set};
pub use request_config::{ConfigError, HedgeConfig, HedgeSettings};
pub use strategy::{StrategyKind, StrategyStats};
pub use telemetry::{PIPELINE_NAME, STRATEGY_NAME};

use std::future::Future;
use std::time::Duration;

use crate::telemetry::TelemetryBus;

/// Runs `f` as a hedged request: a primary attempt, and (if the primary has
/// not finished by the strategy's chosen delay) one or more backups racing
/// it. Returns the winning value and [`OutcomeMetadata`], or a
/// [`HedgingError`] if every attempt failed or `settings`'s deadline
/// elapsed.
///
/// `options` supplies the [`tick::Clock`] used for timing, the strategy
/// registry that carries learned delay state across calls sharing the same
/// `strategy_name`, and the telemetry bus events are reported on. Reuse one
/// `options` instance across every call in a logical pipeline.
///
/// # Errors
///
/// Returns a [`HedgingError`] wrapping [`ErrorKind::ConfigInvalid`] if
/// `settings.strategy_name()` was already started under a different,
/// incompatible configuration; [`ErrorKind::Timeout`] if the deadline
/// elapsed before any attempt produced a value; or
/// [`ErrorKind::RequestFailed`]/[`ErrorKind::AllTasksFailed`] if every
/// launched attempt returned an error.
pub async fn request<F, Fut, T, E, In>(
    f: F,
    settings: &HedgeSettings,
    options: &HedgingOptions<In, T>,
) -> Result<(T, OutcomeMetadata), HedgingError<E>>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let telemetry = TelemetryBus::new(
        options.get_pipeline_name().clone(),
        options.create_resilience_event_counter(),
    );
    executor::request(f, settings, options.get_clock(), options.get_registry(), &telemetry).await
}

/// Runs an ordered-fallback cascade over `tiers`, escalating to the next
/// tier whenever the current one is still in flight past its configured
/// delay (or has just failed), and accepting the first result (in
/// completion order) whose quality gate passes. See [`multi_tier::Tier`] for
/// how to build the tier list.
///
/// # Errors
///
/// Returns a [`HedgingError`] wrapping [`ErrorKind::ConfigInvalid`] if
/// `tiers` is empty, or [`ErrorKind::AllTiersFailed`] if no tier ever
/// produced a value before `timeout` elapsed.
pub async fn multi_tier<T, E, In>(
    tiers: Vec<Tier<T, E>>,
    timeout: Duration,
    options: &HedgingOptions<In, T>,
) -> Result<(T, TierOutcome), HedgingError<E>>
where
    T: QualityScored + Send + 'static,
    E: Send + 'static,
{
    let telemetry = TelemetryBus::new(
        options.get_pipeline_name().clone(),
        options.create_resilience_event_counter(),
    );
    multi_tier::multi_tier(tiers, timeout, options.get_clock(), &telemetry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{StrategyConfig, StrategyKind};

    #[tokio::test]
    async fn top_level_request_wires_options_into_the_executor() {
        let clock = tick::Clock::new_tokio();
        let options = HedgingOptions::<(), &'static str>::new(&clock).pipeline_name("top_level");
        let settings = HedgeConfig::new()
            .strategy_kind(StrategyKind::Fixed)
            .strategy_config(StrategyConfig::default().delay_ms(50))
            .timeout_ms(1000)
            .build()
            .unwrap();

        let (value, outcome) = request(|| async { Ok::<_, String>("ok") }, &settings, &options).await.unwrap();
        assert_eq!(value, "ok");
        assert!(!outcome.hedged);
    }

    #[tokio::test]
    async fn top_level_multi_tier_wires_options_into_the_cascade() {
        let clock = tick::Clock::new_tokio();
        let options = HedgingOptions::<(), Unscored<&'static str>>::new(&clock);

        let tier0 = Tier::new("only", 50, || async { Ok::<_, String>(Unscored("value")) });
        let (value, outcome) = multi_tier(vec![tier0], Duration::from_secs(1), &options).await.unwrap();
        assert_eq!(value.0, "value");
        assert_eq!(outcome.tier, "only");
    }
}
