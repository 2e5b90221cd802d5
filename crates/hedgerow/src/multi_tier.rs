// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The multi-tier cascade: an ordered-fallback executor over a list of
//! labelled tiers, each with its own escalation delay, currency cost, and
//! quality threshold.
//!
//! Unlike [`crate::request`], which races duplicates of the *same* function,
//! [`multi_tier`] escalates across *distinct* tier functions (e.g. a cheap,
//! fast model and a slower, higher-quality one) and accepts the first
//! response that clears its tier's quality bar. Tier functions are boxed
//! (`Arc<dyn Fn() -> BoxFuture<...>>`) so a cascade can mix arbitrarily
//! different closures, as long as every tier returns the same `T`/`E`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tick::{Clock, Delay};
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::{ErrorKind, HedgingError};
use crate::telemetry::TelemetryBus;

/// A short grace period given to background tiers after escalation is
/// exhausted, before the cascade gives up on a qualifying result.
const GRACE_PERIOD: Duration = Duration::from_millis(100);

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A result type that can report its own quality score for the cascade's
/// quality gate.
///
/// Types with no natural notion of quality (most types) can simply not
/// implement this trait and instead be wrapped in [`Unscored`], whose
/// `quality_score` always returns `None` — the gate then always passes,
/// matching the source behaviour for results that are "not a structured
/// object".
pub trait QualityScored {
    /// The result's self-reported quality, in `0.0..=1.0`, or `None` if this
    /// result carries no such field (treated as a passing score of `1.0`).
    fn quality_score(&self) -> Option<f64> {
        None
    }
}

/// Wraps any `T` as a result with no quality score, so its tier's quality
/// gate always passes regardless of `quality_threshold`.
#[derive(Debug, Clone)]
pub struct Unscored<T>(pub T);

impl<T> QualityScored for Unscored<T> {
    fn quality_score(&self) -> Option<f64> {
        None
    }
}

fn passes_gate<T: QualityScored>(value: &T, threshold: Option<f64>) -> bool {
    match threshold {
        None => true,
        Some(t) => score_or_default(value) >= t,
    }
}

/// A result's quality score, defaulting to a passing `1.0` when the result
/// carries none, and warning and defaulting the same way when a
/// [`QualityScored`] implementation misbehaves (returns a non-finite value
/// or one outside `0.0..=1.0`) rather than treating it as a hard error.
fn score_or_default<T: QualityScored>(value: &T) -> f64 {
    match value.quality_score() {
        None => 1.0,
        Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => score,
        Some(score) => {
            tracing::warn!(score, "quality_score outside 0.0..=1.0 or non-finite, treating as 1.0");
            1.0
        }
    }
}

/// Final selection once no tier has satisfied its gate within the run: the
/// first tier *by list order* whose outcome is `Ok` and meets its gate, else
/// the first `Ok` by list order ignoring gates, else `None`.
fn select_fallback<T: QualityScored, E>(tiers: &[Tier<T, E>], reports: &[Option<Result<T, E>>]) -> Option<usize> {
    reports
        .iter()
        .enumerate()
        .find(|(index, report)| {
            matches!(report, Some(Ok(value)) if passes_gate(value, tiers[*index].quality_threshold))
        })
        .or_else(|| reports.iter().enumerate().find(|(_, report)| matches!(report, Some(Ok(_)))))
        .map(|(index, _)| index)
}

/// One labelled tier in a [`multi_tier`] cascade.
pub struct Tier<T, E> {
    name: String,
    delay: Duration,
    request_fn: Arc<dyn Fn() -> BoxFuture<Result<T, E>> + Send + Sync>,
    quality_threshold: Option<f64>,
    cost: f64,
}

impl<T, E> Tier<T, E>
where
    T: QualityScored + Send + 'static,
    E: Send + 'static,
{
    /// Define a tier: a name (used in telemetry and [`TierOutcome::tier`]),
    /// the delay to wait before escalating past it, and the function to
    /// invoke.
    pub fn new<F, Fut>(name: impl Into<String>, delay_ms: u64, request_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            delay: Duration::from_millis(delay_ms),
            request_fn: Arc::new(move || Box::pin(request_fn()) as BoxFuture<Result<T, E>>),
            quality_threshold: None,
            cost: 0.0,
        }
    }

    /// Require the result's [`QualityScored::quality_score`] to be at least
    /// `threshold` (`0.0..=1.0`) for this tier's result to short-circuit the
    /// cascade.
    #[must_use]
    pub fn quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = Some(threshold);
        self
    }

    /// The currency cost charged if this tier's task is observed to start.
    #[must_use]
    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// Outcome metadata for a successful [`multi_tier`] call.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TierOutcome {
    /// The name of the tier whose result was accepted.
    pub tier: String,
    /// How many tiers beyond the first were escalated to.
    pub hedges_fired: usize,
    /// Sum of `cost` across every tier whose task was observed to start.
    pub total_cost: f64,
}

struct TierReport<T, E> {
    index: usize,
    outcome: Result<T, E>,
}

fn spawn_tier<T, E>(
    tier: &Tier<T, E>,
    index: usize,
    tasks: &mut FuturesUnordered<JoinHandle<TierReport<T, E>>>,
    abort_handles: &mut Vec<(usize, AbortHandle)>,
    telemetry: &TelemetryBus,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    let f = Arc::clone(&tier.request_fn);
    let handle = tokio::spawn(async move {
        let outcome = f().await;
        TierReport { index, outcome }
    });
    abort_handles.push((index, handle.abort_handle()));
    tasks.push(handle);
    telemetry.emit(&tier.name, crate::telemetry::EVENT_MULTI_LEVEL_TIER_START);
}

/// Runs an ordered-fallback cascade over `tiers`: tries tier 0, and while it
/// is still in flight at its configured delay (or has just failed), leaves
/// it running in the background and escalates to the next tier. Returns the
/// first tier result (in completion order) whose quality gate passes; if
/// none ever does, falls back, by tier list order, to the first `Ok` that
/// meets its gate among every tier observed so far, else the first `Ok` at
/// all, else [`ErrorKind::AllTiersFailed`].
///
/// # Errors
///
/// Returns [`ErrorKind::ConfigInvalid`] if `tiers` is empty, and
/// [`ErrorKind::AllTiersFailed`] if no tier ever produces any `Ok` before
/// `timeout` elapses.
pub async fn multi_tier<T, E>(
    tiers: Vec<Tier<T, E>>,
    timeout: Duration,
    clock: &Clock,
    telemetry: &TelemetryBus,
) -> Result<(T, TierOutcome), HedgingError<E>>
where
    T: QualityScored + Send + 'static,
    E: Send + 'static,
{
    if tiers.is_empty() {
        return Err(HedgingError::new(
            ErrorKind::ConfigInvalid("tier list must not be empty".to_string()),
            0,
            Duration::ZERO,
        ));
    }

    telemetry.emit("multi_tier", crate::telemetry::EVENT_MULTI_LEVEL_START);

    let mut tasks: FuturesUnordered<JoinHandle<TierReport<T, E>>> = FuturesUnordered::new();
    let mut abort_handles: Vec<(usize, AbortHandle)> = Vec::new();
    let mut started: Vec<bool> = vec![false; tiers.len()];
    let mut reports: Vec<Option<Result<T, E>>> = (0..tiers.len()).map(|_| None).collect();

    let deadline_fut = Delay::new(clock, timeout);
    tokio::pin!(deadline_fut);

    let mut current = 0usize;
    spawn_tier(&tiers[current], current, &mut tasks, &mut abort_handles, telemetry);
    started[current] = true;

    let winner: Option<usize> = 'escalate: loop {
        let tier_delay = tiers[current].delay;
        let delay_timer = Delay::new(clock, tier_delay);
        tokio::pin!(delay_timer);

        loop {
            tokio::select! {
                report = tasks.select_next_some() => {
                    let Ok(report) = report else { continue };
                    let is_current = report.index == current;
                    let passed = matches!(&report.outcome, Ok(value) if passes_gate(value, tiers[report.index].quality_threshold));
                    reports[report.index] = Some(report.outcome);
                    if passed {
                        telemetry.emit(&tiers[report.index].name, crate::telemetry::EVENT_MULTI_LEVEL_TIER_COMPLETED);
                        break 'escalate Some(report.index);
                    }
                    if tasks.is_empty() && current == tiers.len() - 1 {
                        break 'escalate None;
                    }
                    if is_current {
                        break;
                    }
                }
                () = &mut delay_timer => {
                    telemetry.emit(&tiers[current].name, crate::telemetry::EVENT_MULTI_LEVEL_TIER_TIMEOUT);
                    break;
                }
                () = &mut deadline_fut => break 'escalate None,
            }
        }

        if current < tiers.len() - 1 {
            current += 1;
            spawn_tier(&tiers[current], current, &mut tasks, &mut abort_handles, telemetry);
            started[current] = true;
        } else {
            let grace = Delay::new(clock, GRACE_PERIOD);
            tokio::pin!(grace);
            break 'escalate loop {
                tokio::select! {
                    report = tasks.select_next_some() => {
                        let Ok(report) = report else { continue };
                        let passed = matches!(&report.outcome, Ok(value) if passes_gate(value, tiers[report.index].quality_threshold));
                        reports[report.index] = Some(report.outcome);
                        if passed {
                            telemetry.emit(&tiers[report.index].name, crate::telemetry::EVENT_MULTI_LEVEL_TIER_COMPLETED);
                            break Some(report.index);
                        }
                        if tasks.is_empty() {
                            break None;
                        }
                    }
                    () = &mut grace => break None,
                    () = &mut deadline_fut => break None,
                }
            };
        }
    };

    let launched = started.iter().filter(|&&s| s).count();
    let total_cost: f64 = tiers.iter().zip(&started).filter(|(_, &s)| s).map(|(t, _)| t.cost).sum();

    let chosen = winner.or_else(|| select_fallback(&tiers, &reports));

    for (index, handle) in &abort_handles {
        if chosen != Some(*index) {
            handle.abort();
            telemetry.emit(&tiers[*index].name, crate::telemetry::EVENT_MULTI_LEVEL_TIER_CANCELLED);
        }
    }

    let Some(index) = chosen else {
        telemetry.emit("multi_tier", crate::telemetry::EVENT_MULTI_LEVEL_EXCEPTION);
        return Err(HedgingError::new(ErrorKind::AllTiersFailed, u32::try_from(launched).unwrap_or(u32::MAX), Duration::ZERO));
    };

    let Some(Ok(value)) = reports[index].take() else {
        telemetry.emit("multi_tier", crate::telemetry::EVENT_MULTI_LEVEL_EXCEPTION);
        return Err(HedgingError::new(ErrorKind::AllTiersFailed, u32::try_from(launched).unwrap_or(u32::MAX), Duration::ZERO));
    };

    telemetry.emit("multi_tier", crate::telemetry::EVENT_MULTI_LEVEL_STOP);

    Ok((
        value,
        TierOutcome {
            tier: tiers[index].name.clone(),
            hedges_fired: index,
            total_cost,
        },
    ))
}
