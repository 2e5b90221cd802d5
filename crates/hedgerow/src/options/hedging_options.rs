// Copyright (c) Microsoft Corporation.

use std::borrow::Cow;
use std::sync::Arc;

use opentelemetry::metrics::*;
use tick::Clock;

use crate::strategy::StrategyRegistry;
use crate::telemetry::metrics::*;

pub(crate) const DEFAULT_PIPELINE_NAME: &str = "default";

/// Shared options for a hedging pipeline.
///
/// `HedgingOptions` bundles a [`Clock`] and telemetry primitives (an
/// OpenTelemetry [`Meter`]) that [`crate::request`] and [`crate::multi_tier`]
/// use to measure time, select delays, and report events. Use a single
/// instance to configure every hedged call that belongs to the same logical
/// pipeline.
///
/// The [`pipeline_name`][`HedgingOptions::pipeline_name`] groups hedged calls
/// under one logical parent for telemetry correlation. Reusing the same name
/// across every call site in a pipeline means exported metrics and events
/// carry the same pipeline attribute, making dashboards and analysis easier.
///
/// You can also override the meter provider via [`meter_provider`](Self::meter_provider)
/// if you need a non-global provider (e.g., tests or custom SDK wiring).
///
/// # Examples
///
/// ```rust
/// # use hedgerow::HedgingOptions;
/// # use tick::Clock;
/// # fn example(clock: Clock) {
/// let options = HedgingOptions::<String, String>::new(&clock).pipeline_name("search_pipeline");
///
/// let start = options.get_clock().instant();
/// let _ = start;
/// # }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub struct HedgingOptions<In, Out> {
    clock: Clock,
    pipeline_name: Cow<'static, str>,
    meter: Meter,
    registry: Arc<StrategyRegistry>,
    _in: std::marker::PhantomData<fn() -> In>,
    _out: std::marker::PhantomData<fn() -> Out>,
}

impl<In, Out> HedgingOptions<In, Out> {
    /// Create options with a clock and the global meter provider.
    ///
    /// Initializes with `pipeline_name = "default"` and a meter from the
    /// global provider. Override the provider later via
    /// [`meter_provider`](Self::meter_provider) if needed.
    pub fn new(clock: impl AsRef<Clock>) -> Self {
        let meter = create_meter(opentelemetry::global::meter_provider().as_ref());

        Self {
            clock: clock.as_ref().clone(),
            pipeline_name: Cow::Borrowed(DEFAULT_PIPELINE_NAME),
            meter,
            registry: Arc::new(StrategyRegistry::new()),
            _in: std::marker::PhantomData,
            _out: std::marker::PhantomData,
        }
    }

    /// Get the configured clock for timing operations.
    ///
    /// The executor uses this to measure attempt durations, schedule backup
    /// delays, and enforce deadlines from a consistent source.
    #[must_use]
    pub fn get_clock(&self) -> &Clock {
        &self.clock
    }

    /// Set the logical pipeline name used to group hedged calls.
    ///
    /// Use the same `pipeline_name` across every call site that forms one
    /// logical pipeline. The name is attached to emitted metrics/events so
    /// they can be correlated. Prefer `snake_case`, e.g., `user_auth`,
    /// `data_ingest`.
    #[must_use]
    pub fn pipeline_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Get the configured pipeline name (`default` if not set).
    #[must_use]
    pub fn get_pipeline_name(&self) -> &Cow<'static, str> {
        &self.pipeline_name
    }

    /// Override the global meter provider with a custom one.
    #[must_use]
    pub fn meter_provider(self, provider: &dyn MeterProvider) -> Self {
        let meter = create_meter(provider);

        Self { meter, ..self }
    }

    /// Get the configured OpenTelemetry meter.
    ///
    /// Use this to create additional instruments if you want to extend the
    /// built-in telemetry. The built-in meter uses:
    ///
    /// - Name: `hedgerow`
    /// - Version: `v0.1.0`
    /// - Schema URL: `https://opentelemetry.io/schemas/1.47.0`
    #[must_use]
    pub fn get_meter(&self) -> &Meter {
        &self.meter
    }

    /// Creates the standardized counter for hedging/cascade events.
    ///
    /// # Required Attributes
    ///
    /// When reporting events, the following attributes MUST be added:
    ///
    /// - [`PIPELINE_NAME`][crate::telemetry::PIPELINE_NAME]
    /// - [`STRATEGY_NAME`][crate::telemetry::STRATEGY_NAME]
    /// - [`EVENT_NAME`][crate::telemetry::EVENT_NAME]
    #[must_use]
    pub fn create_resilience_event_counter(&self) -> Counter<u64> {
        create_resilience_event_counter(self.get_meter())
    }

    /// The strategy registry shared by every hedged call built from this
    /// options instance, so strategy state (percentile windows, bandit
    /// weights, backoff state, …) persists across calls to the same
    /// pipeline rather than resetting per request.
    #[must_use]
    pub(crate) fn get_registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }
}

impl<In, Out> Clone for HedgingOptions<In, Out> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            pipeline_name: self.pipeline_name.clone(),
            meter: self.meter.clone(),
            registry: Arc::clone(&self.registry),
            _in: std::marker::PhantomData,
            _out: std::marker::PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};

    use super::*;

    #[test]
    fn test_new_with_clock_sets_default_pipeline_name() {
        let clock = tick::Clock::new_frozen();
        let options = HedgingOptions::<(), ()>::new(clock);
        assert_eq!(options.get_pipeline_name().as_ref(), DEFAULT_PIPELINE_NAME);
        let _ = options.get_clock().system_time();
    }

    #[test]
    fn test_pipeline_name_with_custom_value_sets_name_and_is_owned() {
        let clock = tick::Clock::new_frozen();
        let options =
            HedgingOptions::<(), ()>::new(clock).pipeline_name(String::from("custom_pipeline"));
        assert_eq!(options.get_pipeline_name().as_ref(), "custom_pipeline");
        assert!(matches!(options.get_pipeline_name(), Cow::Owned(_)));
    }

    #[cfg(not(miri))]
    #[test]
    fn test_create_event_reporter_with_multiple_clones_accumulates_events() {
        let clock = tick::Clock::new_frozen();
        let (provider, exporter) = test_meter_provider();

        let options = HedgingOptions::<(), ()>::new(clock).meter_provider(&provider);
        let c1 = create_resilience_event_counter(options.get_meter());
        let c2 = create_resilience_event_counter(options.get_meter());
        c1.add(1, &[]);
        c2.add(2, &[]);

        provider.force_flush().unwrap();
        let metrics = exporter.get_finished_metrics().unwrap();
        let dump = format!("{metrics:?}");
        assert!(dump.contains("resilience.event"));
        assert!(dump.contains('3'));
    }

    fn test_meter_provider() -> (SdkMeterProvider, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_periodic_exporter(exporter.clone())
            .build();
        (provider, exporter)
    }
}
