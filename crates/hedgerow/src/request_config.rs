// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-request configuration, built with a typestate builder.
//!
//! [`HedgeConfig`] requires a [`StrategyKind`] and a `timeout_ms` before
//! [`HedgeConfig::build`] is callable, mirroring the `Set`/`NotSet` typestate
//! pattern already used elsewhere in this workspace (see
//! [`crate::options::Set`]/[`crate::options::NotSet`]).

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use crate::options::{NotSet, Set};
use crate::strategy::{StrategyConfig, StrategyKind};

const DEFAULT_MAX_HEDGES: u32 = 1;
const DEFAULT_TELEMETRY_PREFIX: &str = "hedgerow";

/// Error returned by [`HedgeConfig::build`] when the assembled configuration
/// violates one of the per-strategy validation rules.
#[derive(Debug, Clone)]
pub struct ConfigError(pub(crate) String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

/// A fully validated, immutable request configuration, ready to pass to
/// [`crate::request`].
#[derive(Debug, Clone)]
pub struct HedgeSettings {
    pub(crate) strategy_kind: StrategyKind,
    pub(crate) strategy_name: String,
    pub(crate) strategy_config: StrategyConfig,
    pub(crate) max_hedges: u32,
    pub(crate) timeout: Duration,
    pub(crate) enable_cancellation: bool,
    pub(crate) telemetry_prefix: Cow<'static, str>,
}

impl HedgeSettings {
    /// The strategy algorithm selected for this request.
    #[must_use]
    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy_kind
    }

    /// The overall deadline for the request (primary plus every backup).
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Typestate builder for [`HedgeSettings`].
///
/// `HasStrategy` and `HasTimeout` track whether
/// [`strategy_kind`][Self::strategy_kind] and [`timeout_ms`][Self::timeout_ms]
/// have been set; [`build`][Self::build] is only available once both are
/// [`Set`].
#[derive(Debug)]
pub struct HedgeConfig<HasStrategy = NotSet, HasTimeout = NotSet> {
    strategy_kind: Option<StrategyKind>,
    strategy_name: String,
    strategy_config: StrategyConfig,
    max_hedges: u32,
    timeout_ms: Option<u64>,
    enable_cancellation: bool,
    telemetry_prefix: Cow<'static, str>,
    _state: PhantomData<(HasStrategy, HasTimeout)>,
}

impl Default for HedgeConfig<NotSet, NotSet> {
    fn default() -> Self {
        Self {
            strategy_kind: None,
            strategy_name: "default".to_string(),
            strategy_config: StrategyConfig::default(),
            max_hedges: DEFAULT_MAX_HEDGES,
            timeout_ms: None,
            enable_cancellation: true,
            telemetry_prefix: Cow::Borrowed(DEFAULT_TELEMETRY_PREFIX),
            _state: PhantomData,
        }
    }
}

impl HedgeConfig<NotSet, NotSet> {
    /// Start building a new request configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<HasTimeout> HedgeConfig<NotSet, HasTimeout> {
    /// Select the delay-selection algorithm for this request.
    #[must_use]
    pub fn strategy_kind(self, kind: StrategyKind) -> HedgeConfig<Set, HasTimeout> {
        HedgeConfig {
            strategy_kind: Some(kind),
            strategy_name: self.strategy_name,
            strategy_config: self.strategy_config,
            max_hedges: self.max_hedges,
            timeout_ms: self.timeout_ms,
            enable_cancellation: self.enable_cancellation,
            telemetry_prefix: self.telemetry_prefix,
            _state: PhantomData,
        }
    }
}

impl<HasStrategy> HedgeConfig<HasStrategy, NotSet> {
    /// Set the overall deadline (ms), measured from call entry, covering the
    /// primary and every backup.
    #[must_use]
    pub fn timeout_ms(self, timeout_ms: u64) -> HedgeConfig<HasStrategy, Set> {
        HedgeConfig {
            strategy_kind: self.strategy_kind,
            strategy_name: self.strategy_name,
            strategy_config: self.strategy_config,
            max_hedges: self.max_hedges,
            timeout_ms: Some(timeout_ms),
            enable_cancellation: self.enable_cancellation,
            telemetry_prefix: self.telemetry_prefix,
            _state: PhantomData,
        }
    }
}

impl<HasStrategy, HasTimeout> HedgeConfig<HasStrategy, HasTimeout> {
    /// Select which stateful strategy instance this request consults,
    /// letting callers keep distinct strategy state per backend.
    #[must_use]
    pub fn strategy_name(mut self, name: impl Into<String>) -> Self {
        self.strategy_name = name.into();
        self
    }

    /// Strategy-specific knobs (delay, percentile, candidates, …).
    #[must_use]
    pub fn strategy_config(mut self, strategy_config: StrategyConfig) -> Self {
        self.strategy_config = strategy_config;
        self
    }

    /// Upper bound on concurrent backup attempts (default 1).
    #[must_use]
    pub fn max_hedges(mut self, max_hedges: u32) -> Self {
        self.max_hedges = max_hedges;
        self
    }

    /// Whether to abort the losing attempts once a winner is chosen
    /// (default true).
    #[must_use]
    pub fn enable_cancellation(mut self, enable_cancellation: bool) -> Self {
        self.enable_cancellation = enable_cancellation;
        self
    }

    /// Namespace prepended to every emitted telemetry event for this
    /// request.
    #[must_use]
    pub fn telemetry_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.telemetry_prefix = prefix.into();
        self
    }
}

impl HedgeConfig<Set, Set> {
    /// Validate the assembled configuration against its strategy's rules and
    /// produce an immutable [`HedgeSettings`].
    pub fn build(self) -> Result<HedgeSettings, ConfigError> {
        let strategy_kind = self.strategy_kind.expect("Set guarantees strategy_kind");
        let timeout_ms = self.timeout_ms.expect("Set guarantees timeout_ms");

        if self.max_hedges == 0 {
            return Err(ConfigError("max_hedges must be at least 1".to_string()));
        }

        crate::strategy::validate(strategy_kind, &self.strategy_config).map_err(ConfigError)?;

        Ok(HedgeSettings {
            strategy_kind,
            strategy_name: self.strategy_name,
            strategy_config: self.strategy_config,
            max_hedges: self.max_hedges,
            timeout: Duration::from_millis(timeout_ms),
            enable_cancellation: self.enable_cancellation,
            telemetry_prefix: self.telemetry_prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_succeeds_with_strategy_and_timeout_set() {
        let settings = HedgeConfig::new()
            .strategy_kind(StrategyKind::Fixed)
            .timeout_ms(1000)
            .strategy_config(StrategyConfig::default().delay_ms(50))
            .build()
            .unwrap();
        assert_eq!(settings.strategy_kind(), StrategyKind::Fixed);
        assert_eq!(settings.timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn build_rejects_strategy_specific_invalid_configuration() {
        let result = HedgeConfig::new()
            .strategy_kind(StrategyKind::Fixed)
            .timeout_ms(1000)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_rejects_zero_max_hedges() {
        let result = HedgeConfig::new()
            .strategy_kind(StrategyKind::Off)
            .timeout_ms(1000)
            .max_hedges(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn a_zero_timeout_is_a_legitimate_fail_fast_configuration() {
        let settings = HedgeConfig::new()
            .strategy_kind(StrategyKind::Off)
            .timeout_ms(0)
            .build()
            .unwrap();
        assert_eq!(settings.timeout(), Duration::ZERO);
    }
}
