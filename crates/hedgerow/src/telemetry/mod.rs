// Copyright (c) Microsoft Corporation.

//! # Telemetry Bus
//!
//! Every hedging and multi-tier decision is reported twice: once as an
//! OpenTelemetry counter increment (for dashboards and alerting) and once as
//! a [`tracing`] event (for structured logs and local debugging). This
//! module defines the well-known attribute keys, the event name catalog, and
//! [`TelemetryBus`], the small helper that performs both emissions together
//! so the two views of a request never drift apart.
//!
//! # Conventions
//!
//! Names follow the [OpenTelemetry naming guidelines](https://opentelemetry.io/docs/specs/semconv/general/naming/#general-naming-considerations).
//!
//! - Keys are dot-separated (e.g., `pipeline.name`, `strategy.name`)
//! - Values are concise, preferably `snake_case`

pub(crate) mod metrics;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;

/// Key used to annotate the name of a hedging pipeline.
///
/// Values reported under this dimension should be short and concise, preferably in `snake_case`.
/// Examples: `user_auth`, `data_processing`, `payment_flow`.
pub const PIPELINE_NAME: &str = "resilience.pipeline.name";

/// Key used to annotate the name of the strategy in effect for a request.
///
/// Values reported under this dimension should be short and concise, preferably in `snake_case`.
/// Examples: `fixed`, `percentile`, `adaptive`, `workload_aware`, `exp_backoff`.
pub const STRATEGY_NAME: &str = "resilience.strategy.name";

/// Key used to annotate the specific event being emitted.
pub const EVENT_NAME: &str = "resilience.event.name";

/// A primary or backup attempt was launched.
pub const EVENT_REQUEST_START: &str = "request.start";

/// A hedged request completed successfully, primary or backup.
pub const EVENT_REQUEST_STOP: &str = "request.stop";

/// An attempt completed with an error.
pub const EVENT_REQUEST_EXCEPTION: &str = "request.exception";

/// An in-flight attempt was cancelled after a race was decided.
pub const EVENT_REQUEST_CANCELLED: &str = "request.cancelled";

/// A backup attempt was fired because the primary had not yet returned.
pub const EVENT_HEDGE_FIRED: &str = "hedge.fired";

/// A backup attempt (rather than the primary) won the race.
pub const EVENT_HEDGE_WON: &str = "hedge.won";

/// A multi-tier cascade call began.
pub const EVENT_MULTI_LEVEL_START: &str = "multi_level.start";

/// A multi-tier cascade call returned a value.
pub const EVENT_MULTI_LEVEL_STOP: &str = "multi_level.stop";

/// A multi-tier cascade call ended in an error.
pub const EVENT_MULTI_LEVEL_EXCEPTION: &str = "multi_level.exception";

/// A tier's request function was spawned.
pub const EVENT_MULTI_LEVEL_TIER_START: &str = "multi_level.tier.start";

/// A tier's result passed its quality gate and was accepted.
pub const EVENT_MULTI_LEVEL_TIER_COMPLETED: &str = "multi_level.tier.completed";

/// A tier's escalation delay elapsed while it was still in flight.
pub const EVENT_MULTI_LEVEL_TIER_TIMEOUT: &str = "multi_level.tier.timeout";

/// A tier's task was aborted once the cascade had already chosen a result.
pub const EVENT_MULTI_LEVEL_TIER_CANCELLED: &str = "multi_level.tier.cancelled";

/// Dual-emits hedging/cascade events as an OpenTelemetry counter increment
/// and a [`tracing`] event, sharing the same pipeline/strategy/event
/// attributes across both.
#[derive(Debug, Clone)]
pub(crate) struct TelemetryBus {
    pipeline_name: std::borrow::Cow<'static, str>,
    counter: Counter<u64>,
}

impl TelemetryBus {
    pub(crate) fn new(
        pipeline_name: std::borrow::Cow<'static, str>,
        counter: Counter<u64>,
    ) -> Self {
        Self {
            pipeline_name,
            counter,
        }
    }

    /// Report a single named event for the given strategy.
    pub(crate) fn emit(&self, strategy_name: &str, event_name: &str) {
        self.counter.add(
            1,
            &[
                KeyValue::new(PIPELINE_NAME, self.pipeline_name.clone().into_owned()),
                KeyValue::new(STRATEGY_NAME, strategy_name.to_string()),
                KeyValue::new(EVENT_NAME, event_name.to_string()),
            ],
        );
        tracing::event!(
            tracing::Level::DEBUG,
            pipeline = %self.pipeline_name,
            strategy = %strategy_name,
            event = %event_name,
            "hedging event"
        );
    }

    /// Report a single named event, namespaced under `prefix` (see
    /// [`crate::request_config::HedgeConfig::telemetry_prefix`]).
    pub(crate) fn emit_prefixed(&self, strategy_name: &str, prefix: &str, event_name: &str) {
        self.emit(strategy_name, &format!("{prefix}.{event_name}"));
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_name_is_expected() {
        assert_eq!(PIPELINE_NAME, "resilience.pipeline.name");
    }

    #[test]
    fn test_strategy_name_is_expected() {
        assert_eq!(STRATEGY_NAME, "resilience.strategy.name");
    }

    #[test]
    fn test_event_name_is_expected() {
        assert_eq!(EVENT_NAME, "resilience.event.name");
    }

    #[test]
    #[cfg(not(miri))]
    fn emit_increments_counter_and_does_not_panic() {
        let tester = crate::testing::MetricTester::new();
        let meter = metrics::create_meter(tester.meter_provider());
        let counter = metrics::create_resilience_event_counter(&meter);

        let bus = TelemetryBus::new(std::borrow::Cow::Borrowed("default"), counter);
        bus.emit("fixed", EVENT_REQUEST_START);
        bus.emit("fixed", EVENT_REQUEST_STOP);

        tester.assert_attributes(
            &[
                KeyValue::new(PIPELINE_NAME, "default"),
                KeyValue::new(STRATEGY_NAME, "fixed"),
            ],
            None,
        );
    }
}
