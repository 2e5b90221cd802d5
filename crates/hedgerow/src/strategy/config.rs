// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Strategy-specific configuration fields.
//!
//! Every field here is optional: only the strategy in effect for a request
//! looks at the ones it needs, and [`super::validate`] rejects a
//! configuration missing a field its chosen strategy requires.

/// A coarse classification of how expensive the underlying model call is,
/// used by the workload-aware strategy's multiplier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelComplexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

/// A coarse classification of current load, used by the workload-aware
/// strategy's multiplier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOfDay {
    Peak,
    #[default]
    Normal,
    OffPeak,
}

/// Request priority, used by the workload-aware strategy's multiplier
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// Strategy-specific knobs, gathered in one value so a single
/// [`super::StrategyKind`] selection can pull out the fields it needs.
///
/// Construct with [`StrategyConfig::default`] and chain the setters for the
/// fields your chosen strategy cares about; unused fields are ignored.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct StrategyConfig {
    // Fixed
    pub(crate) delay_ms: Option<u64>,

    // Percentile
    pub(crate) percentile: Option<u8>,
    pub(crate) window_size: Option<usize>,
    pub(crate) min_samples: Option<usize>,
    pub(crate) initial_delay_ms: Option<u64>,

    // Adaptive
    pub(crate) delay_candidates: Option<Vec<u64>>,

    // Workload-aware
    pub(crate) base_delay_ms: Option<u64>,
    pub(crate) prompt_length: Option<u32>,
    pub(crate) model_complexity: Option<ModelComplexity>,
    pub(crate) time_of_day: Option<TimeOfDay>,
    pub(crate) priority: Option<Priority>,

    // Exponential backoff
    pub(crate) exponential_base_delay_ms: Option<u64>,
    pub(crate) exponential_min_delay_ms: Option<u64>,
    pub(crate) exponential_max_delay_ms: Option<u64>,
    pub(crate) exponential_increase_factor: Option<f64>,
    pub(crate) exponential_decrease_factor: Option<f64>,
    pub(crate) exponential_error_factor: Option<f64>,
}

impl StrategyConfig {
    /// Set the constant delay (ms) used by [`super::StrategyKind::Fixed`].
    #[must_use]
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Set the target percentile (`50..=99`) for [`super::StrategyKind::Percentile`].
    #[must_use]
    pub fn percentile(mut self, percentile: u8) -> Self {
        self.percentile = Some(percentile);
        self
    }

    /// Set the rolling sample window size.
    #[must_use]
    pub fn window_size(mut self, window_size: usize) -> Self {
        self.window_size = Some(window_size);
        self
    }

    /// Set the minimum sample count before a rolling percentile is trusted.
    #[must_use]
    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = Some(min_samples);
        self
    }

    /// Set the delay used before enough samples have accumulated.
    #[must_use]
    pub fn initial_delay_ms(mut self, initial_delay_ms: u64) -> Self {
        self.initial_delay_ms = Some(initial_delay_ms);
        self
    }

    /// Set the candidate delay arms (ms) for [`super::StrategyKind::Adaptive`].
    #[must_use]
    pub fn delay_candidates(mut self, delay_candidates: Vec<u64>) -> Self {
        self.delay_candidates = Some(delay_candidates);
        self
    }

    /// Set the base delay (ms) for [`super::StrategyKind::WorkloadAware`].
    #[must_use]
    pub fn base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = Some(base_delay_ms);
        self
    }

    /// Tag the request's prompt length, in tokens or characters (caller's choice).
    #[must_use]
    pub fn prompt_length(mut self, prompt_length: u32) -> Self {
        self.prompt_length = Some(prompt_length);
        self
    }

    /// Tag the request's model complexity.
    #[must_use]
    pub fn model_complexity(mut self, model_complexity: ModelComplexity) -> Self {
        self.model_complexity = Some(model_complexity);
        self
    }

    /// Tag the current time-of-day bucket.
    #[must_use]
    pub fn time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    /// Tag the request's priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the starting delay for [`super::StrategyKind::ExpBackoff`].
    #[must_use]
    pub fn exponential_base_delay_ms(mut self, ms: u64) -> Self {
        self.exponential_base_delay_ms = Some(ms);
        self
    }

    /// Set the floor delay for [`super::StrategyKind::ExpBackoff`].
    #[must_use]
    pub fn exponential_min_delay_ms(mut self, ms: u64) -> Self {
        self.exponential_min_delay_ms = Some(ms);
        self
    }

    /// Set the ceiling delay for [`super::StrategyKind::ExpBackoff`].
    #[must_use]
    pub fn exponential_max_delay_ms(mut self, ms: u64) -> Self {
        self.exponential_max_delay_ms = Some(ms);
        self
    }

    /// Set the multiplicative increase factor applied on a lost hedge.
    #[must_use]
    pub fn exponential_increase_factor(mut self, factor: f64) -> Self {
        self.exponential_increase_factor = Some(factor);
        self
    }

    /// Set the multiplicative decrease factor applied on a won hedge.
    #[must_use]
    pub fn exponential_decrease_factor(mut self, factor: f64) -> Self {
        self.exponential_decrease_factor = Some(factor);
        self
    }

    /// Set the multiplicative factor applied on an error outcome.
    #[must_use]
    pub fn exponential_error_factor(mut self, factor: f64) -> Self {
        self.exponential_error_factor = Some(factor);
        self
    }
}
