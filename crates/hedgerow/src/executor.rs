// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The hedging executor: races a primary attempt against staggered backups
//! and returns whichever produces a value first.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tick::{Clock, Delay};
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::{ErrorKind, HedgingError};
use crate::request_config::HedgeSettings;
use crate::strategy::{StrategyKind, StrategyOutcome, StrategyRegistry};
use crate::telemetry::{self, TelemetryBus};

/// Geometric stagger applied between successive backups when
/// `max_hedges > 1`: the k-th extra backup fires at `d * 1.5^k` after the
/// hedge timer.
const BACKUP_STAGGER_FACTOR: f64 = 1.5;

static COMPLETION_RANK: AtomicU64 = AtomicU64::new(0);

fn next_completion_rank() -> u64 {
    COMPLETION_RANK.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Primary,
    Backup(u32),
}

/// Outcome metadata returned alongside a successful value, or attached to
/// [`HedgingError`] bookkeeping on failure.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OutcomeMetadata {
    /// Whether a backup attempt was fired for this request.
    pub hedged: bool,
    /// Whether a backup (rather than the primary) produced the winning
    /// value.
    pub hedge_won: bool,
    /// The delay the strategy chose for this request, even when no backup
    /// ever fired.
    pub hedge_delay_ms: Option<u64>,
    /// Latency of the primary attempt, if it completed.
    pub primary_latency_ms: Option<u64>,
    /// Latency of the winning backup attempt, if one won.
    pub backup_latency_ms: Option<u64>,
    /// Total wall-clock time for the whole request.
    pub total_latency_ms: u64,
    /// `1.0 + (number of backups actually fired and observed)`.
    pub cost: f64,
    /// Which strategy governed this request.
    pub strategy_kind: StrategyKind,
}

struct AttemptReport<T, E> {
    role: Role,
    finished_at: Duration,
    rank: u64,
    outcome: Result<T, E>,
}

/// `(finished_at, completion_rank)` ordering used to resolve races and to
/// pick which error wins when every attempt fails.
fn is_earlier<T, E>(a: &AttemptReport<T, E>, b: &AttemptReport<T, E>) -> bool {
    (a.finished_at, a.rank) < (b.finished_at, b.rank)
}

fn spawn_attempt<F, Fut, T, E>(
    f: F,
    role: Role,
    clock: Clock,
    call_start: Instant,
    tasks: &mut FuturesUnordered<JoinHandle<AttemptReport<T, E>>>,
    abort_handles: &mut Vec<AbortHandle>,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let handle = tokio::spawn(async move {
        let outcome = f().await;
        let finished_at = clock.instant().saturating_duration_since(call_start);
        let rank = next_completion_rank();
        AttemptReport {
            role,
            finished_at,
            rank,
            outcome,
        }
    });
    abort_handles.push(handle.abort_handle());
    tasks.push(handle);
}

/// Runs `f` as a hedged request: a primary attempt, and (if the primary has
/// not finished by the strategy's chosen delay) one or more backups racing
/// it. Returns the winning value and [`OutcomeMetadata`], or a
/// [`HedgingError`] if every attempt failed or the deadline elapsed.
pub async fn request<F, Fut, T, E>(
    f: F,
    settings: &HedgeSettings,
    clock: &Clock,
    registry: &Arc<StrategyRegistry>,
    telemetry: &TelemetryBus,
) -> Result<(T, OutcomeMetadata), HedgingError<E>>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let call_start = clock.instant();
    let strategy_name = settings.strategy_name.as_str();

    let strategy = registry
        .start(settings.strategy_kind, strategy_name, &settings.strategy_config)
        .map_err(|reason| HedgingError::new(ErrorKind::ConfigInvalid(reason), 0, Duration::ZERO))?;

    let delay = strategy.calculate_delay(&settings.strategy_config);
    let hedge_delay_ms = delay.map(duration_as_millis);

    telemetry.emit_prefixed(strategy_name, &settings.telemetry_prefix, telemetry::EVENT_REQUEST_START);

    let mut tasks: FuturesUnordered<JoinHandle<AttemptReport<T, E>>> = FuturesUnordered::new();
    let mut abort_handles: Vec<AbortHandle> = Vec::new();
    spawn_attempt(f.clone(), Role::Primary, clock.clone(), call_start, &mut tasks, &mut abort_handles);

    let deadline_fut = Delay::new(clock, settings.timeout);
    tokio::pin!(deadline_fut);

    let mut hedge_fired = false;
    let mut backups_spawned: u32 = 0;
    let mut best_ok: Option<AttemptReport<T, E>> = None;
    let mut best_err: Option<AttemptReport<T, E>> = None;
    let mut attempt_count: u32 = 1;

    // Phase 1: wait on the primary up to the strategy's chosen delay, unless
    // the deadline intervenes first. The `Off` strategy never schedules a
    // hedge timer at all: the primary simply runs to completion or deadline.
    if let Some(d) = delay {
        let hedge_timer = Delay::new(clock, d);
        tokio::pin!(hedge_timer);

        loop {
            tokio::select! {
                report = tasks.select_next_some() => {
                    match report {
                        Ok(report) => record_report(report, &mut best_ok, &mut best_err),
                        Err(join_error) => {
                            tracing::error!(error = %join_error, "hedged attempt crashed");
                        }
                    }
                    if best_ok.is_some() || tasks.is_empty() {
                        break;
                    }
                }
                () = &mut hedge_timer => {
                    hedge_fired = true;
                    break;
                }
                () = &mut deadline_fut => {
                    return Err(timeout_error(attempt_count, clock, call_start));
                }
            }
        }
    } else {
        while best_ok.is_none() && !tasks.is_empty() {
            tokio::select! {
                report = tasks.select_next_some() => {
                    match report {
                        Ok(report) => record_report(report, &mut best_ok, &mut best_err),
                        Err(join_error) => {
                            tracing::error!(error = %join_error, "hedged attempt crashed");
                        }
                    }
                }
                () = &mut deadline_fut => {
                    return Err(timeout_error(attempt_count, clock, call_start));
                }
            }
        }
    }

    // Phase 2: the first backup enters the race immediately; any further
    // backups are staggered geometrically, but spawning them never blocks
    // the race itself, so a winner found mid-stagger short-circuits the
    // remaining spawns instead of delaying the whole schedule.
    if hedge_fired && best_ok.is_none() {
        telemetry.emit_prefixed(strategy_name, &settings.telemetry_prefix, telemetry::EVENT_HEDGE_FIRED);
        let backup_count = settings.max_hedges.max(1);
        let base_delay = delay.unwrap_or(Duration::ZERO);

        backups_spawned += 1;
        attempt_count += 1;
        spawn_attempt(f.clone(), Role::Backup(1), clock.clone(), call_start, &mut tasks, &mut abort_handles);

        let mut next_backup = 2u32;
        while best_ok.is_none() && !tasks.is_empty() {
            if next_backup <= backup_count {
                let stagger =
                    base_delay.mul_f64(BACKUP_STAGGER_FACTOR.powi(i32::try_from(next_backup - 1).unwrap_or(i32::MAX)));
                let stagger_fut = Delay::new(clock, stagger);
                tokio::pin!(stagger_fut);
                tokio::select! {
                    report = tasks.select_next_some() => {
                        match report {
                            Ok(report) => record_report(report, &mut best_ok, &mut best_err),
                            Err(join_error) => {
                                tracing::error!(error = %join_error, "hedged attempt crashed");
                            }
                        }
                    }
                    () = &mut stagger_fut => {
                        backups_spawned += 1;
                        attempt_count += 1;
                        spawn_attempt(f.clone(), Role::Backup(next_backup), clock.clone(), call_start, &mut tasks, &mut abort_handles);
                        next_backup += 1;
                    }
                    () = &mut deadline_fut => {
                        return Err(timeout_error(attempt_count, clock, call_start));
                    }
                }
            } else {
                tokio::select! {
                    report = tasks.select_next_some() => {
                        match report {
                            Ok(report) => record_report(report, &mut best_ok, &mut best_err),
                            Err(join_error) => {
                                tracing::error!(error = %join_error, "hedged attempt crashed");
                            }
                        }
                    }
                    () = &mut deadline_fut => {
                        return Err(timeout_error(attempt_count, clock, call_start));
                    }
                }
            }
        }
    }

    let hedge_won = best_ok.as_ref().is_some_and(|winner| matches!(winner.role, Role::Backup(_)));
    if hedge_won {
        telemetry.emit_prefixed(strategy_name, &settings.telemetry_prefix, telemetry::EVENT_HEDGE_WON);
    }

    if settings.enable_cancellation {
        for handle in &abort_handles {
            if !handle.is_finished() {
                handle.abort();
                telemetry.emit_prefixed(strategy_name, &settings.telemetry_prefix, telemetry::EVENT_REQUEST_CANCELLED);
            }
        }
    }

    let total_latency = clock.instant().saturating_duration_since(call_start);

    let Some(winner) = best_ok else {
        let outcome = StrategyOutcome {
            hedged: hedge_fired,
            hedge_won: false,
            hedge_delay: delay,
            primary_latency: None,
            backup_latency: None,
            total_latency,
            error: true,
        };
        strategy.update(&outcome);
        telemetry.emit_prefixed(strategy_name, &settings.telemetry_prefix, telemetry::EVENT_REQUEST_EXCEPTION);

        return Err(match best_err {
            Some(err) => {
                let cause = err.outcome.err().expect("best_err always holds an Err");
                let kind = if attempt_count <= 1 {
                    ErrorKind::RequestFailed(cause)
                } else {
                    ErrorKind::AllTasksFailed(cause)
                };
                HedgingError::new(kind, attempt_count, total_latency)
            }
            None => HedgingError::new(ErrorKind::Timeout, attempt_count, total_latency),
        });
    };

    let (primary_latency_ms, backup_latency_ms) = match winner.role {
        Role::Primary => (Some(duration_as_millis(winner.finished_at)), None),
        Role::Backup(_) => {
            let backup_latency = winner.finished_at.saturating_sub(delay.unwrap_or(Duration::ZERO));
            (None, Some(duration_as_millis(backup_latency)))
        }
    };

    let metadata = OutcomeMetadata {
        hedged: hedge_fired,
        hedge_won,
        hedge_delay_ms,
        primary_latency_ms,
        backup_latency_ms,
        total_latency_ms: duration_as_millis(total_latency),
        cost: 1.0 + f64::from(backups_spawned),
        strategy_kind: settings.strategy_kind,
    };

    let strategy_outcome = StrategyOutcome {
        hedged: metadata.hedged,
        hedge_won: metadata.hedge_won,
        hedge_delay: delay,
        primary_latency: primary_latency_ms.map(Duration::from_millis),
        backup_latency: backup_latency_ms.map(Duration::from_millis),
        total_latency,
        error: false,
    };
    strategy.update(&strategy_outcome);

    telemetry.emit_prefixed(strategy_name, &settings.telemetry_prefix, telemetry::EVENT_REQUEST_STOP);

    Ok((winner.outcome.ok().expect("best_ok always holds an Ok"), metadata))
}

fn record_report<T, E>(
    report: AttemptReport<T, E>,
    best_ok: &mut Option<AttemptReport<T, E>>,
    best_err: &mut Option<AttemptReport<T, E>>,
) {
    match report.outcome {
        Ok(_) => {
            if best_ok.as_ref().is_none_or(|current| is_earlier(&report, current)) {
                *best_ok = Some(report);
            }
        }
        Err(_) => {
            if best_err.as_ref().is_none_or(|current| is_earlier(&report, current)) {
                *best_err = Some(report);
            }
        }
    }
}

fn timeout_error<E>(attempt_count: u32, clock: &Clock, call_start: Instant) -> HedgingError<E> {
    let elapsed = clock.instant().saturating_duration_since(call_start);
    HedgingError::new(ErrorKind::Timeout, attempt_count, elapsed)
}

fn duration_as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use opentelemetry::metrics::MeterProvider;
    use tick::Clock;

    use super::*;
    use crate::strategy::StrategyConfig;

    fn test_bus() -> TelemetryBus {
        let meter = opentelemetry::global::meter_provider().meter("test");
        let counter = meter.u64_counter("resilience.event").build();
        TelemetryBus::new(std::borrow::Cow::Borrowed("test"), counter)
    }

    fn settings(kind: StrategyKind, cfg: StrategyConfig, timeout_ms: u64) -> HedgeSettings {
        crate::request_config::HedgeConfig::new()
            .strategy_kind(kind)
            .timeout_ms(timeout_ms)
            .strategy_config(cfg)
            .build()
            .unwrap()
    }

    #[tokio::test]
    #[cfg(not(miri))]
    async fn telemetry_prefix_namespaces_emitted_event_names() {
        let clock = Clock::new_tokio();
        let registry = Arc::new(StrategyRegistry::new());
        let tester = crate::testing::MetricTester::new();
        let meter = crate::telemetry::metrics::create_meter(tester.meter_provider());
        let counter = crate::telemetry::metrics::create_resilience_event_counter(&meter);
        let bus = TelemetryBus::new(std::borrow::Cow::Borrowed("test"), counter);

        let settings = crate::request_config::HedgeConfig::new()
            .strategy_kind(StrategyKind::Fixed)
            .timeout_ms(1000)
            .strategy_config(StrategyConfig::default().delay_ms(100))
            .telemetry_prefix("checkout")
            .build()
            .unwrap();

        let f = || async { Ok::<_, String>("fast") };
        request(f, &settings, &clock, &registry, &bus).await.unwrap();

        tester.assert_attributes(
            &[opentelemetry::KeyValue::new(
                crate::telemetry::EVENT_NAME,
                "checkout.request.start",
            )],
            None,
        );
    }

    #[tokio::test]
    async fn fast_primary_never_hedges() {
        let clock = Clock::new_tokio();
        let registry = Arc::new(StrategyRegistry::new());
        let bus = test_bus();
        let settings = settings(StrategyKind::Fixed, StrategyConfig::default().delay_ms(100), 1000);

        let f = || async { Ok::<_, String>("fast") };
        let (value, metadata) = request(f, &settings, &clock, &registry, &bus).await.unwrap();

        assert_eq!(value, "fast");
        assert!(!metadata.hedged);
        assert!(!metadata.hedge_won);
        assert_eq!(metadata.cost, 1.0);
    }

    #[tokio::test]
    async fn failing_primary_without_hedge_returns_request_failed() {
        let clock = Clock::new_tokio();
        let registry = Arc::new(StrategyRegistry::new());
        let bus = test_bus();
        let settings = settings(StrategyKind::Fixed, StrategyConfig::default().delay_ms(100), 1000);

        let f = || async { Err::<&str, _>("boom") };
        let err = request(f, &settings, &clock, &registry, &bus).await.unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::RequestFailed(_)));
    }

    #[tokio::test]
    async fn slow_primary_lets_backup_win() {
        let clock = Clock::new_tokio();
        let registry = Arc::new(StrategyRegistry::new());
        let bus = test_bus();
        let settings = settings(StrategyKind::Fixed, StrategyConfig::default().delay_ms(10), 2000);

        let calls = Arc::new(AtomicU32::new(0));
        let calls_for_closure = Arc::clone(&calls);
        let f = move || {
            let calls = Arc::clone(&calls_for_closure);
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                if attempt == 0 {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok::<_, String>("primary")
                } else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, String>("backup")
                }
            }
        };

        let (value, metadata) = request(f, &settings, &clock, &registry, &bus).await.unwrap();
        assert_eq!(value, "backup");
        assert!(metadata.hedged);
        assert!(metadata.hedge_won);
        assert_eq!(metadata.cost, 2.0);
    }

    #[tokio::test]
    async fn staggered_backup_wins_without_spawning_remaining_backups() {
        let clock = Clock::new_tokio();
        let registry = Arc::new(StrategyRegistry::new());
        let bus = test_bus();
        let settings = crate::request_config::HedgeConfig::new()
            .strategy_kind(StrategyKind::Fixed)
            .timeout_ms(2000)
            .strategy_config(StrategyConfig::default().delay_ms(10))
            .max_hedges(3)
            .build()
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_for_closure = Arc::clone(&calls);
        let f = move || {
            let calls = Arc::clone(&calls_for_closure);
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                if attempt == 0 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, String>("primary")
                } else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok::<_, String>("first backup")
                }
            }
        };

        let (value, metadata) = request(f, &settings, &clock, &registry, &bus).await.unwrap();
        assert_eq!(value, "first backup");
        assert!(metadata.hedged);
        assert!(metadata.hedge_won);
        // Only the first backup should actually have fired before it won the
        // race; the second and third staggered backups (max_hedges=3) never
        // get spawned, so cost stays at 2.0 rather than 1.0 + max_hedges.
        assert_eq!(metadata.cost, 2.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn off_strategy_awaits_primary_to_completion_without_hedging() {
        let clock = Clock::new_tokio();
        let registry = Arc::new(StrategyRegistry::new());
        let bus = test_bus();
        let settings = settings(StrategyKind::Off, StrategyConfig::default(), 2000);

        let f = || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>("eventually")
        };

        let (value, metadata) = request(f, &settings, &clock, &registry, &bus).await.unwrap();
        assert_eq!(value, "eventually");
        assert!(!metadata.hedged);
        assert!(!metadata.hedge_won);
        assert_eq!(metadata.hedge_delay_ms, None);
        assert_eq!(metadata.cost, 1.0);
    }

    #[tokio::test]
    async fn zero_timeout_with_blocking_primary_times_out() {
        let clock = Clock::new_tokio();
        let registry = Arc::new(StrategyRegistry::new());
        let bus = test_bus();
        let settings = settings(StrategyKind::Fixed, StrategyConfig::default().delay_ms(0), 0);

        let f = || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, String>("too late")
        };

        let err = request(f, &settings, &clock, &registry, &bus).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Timeout));
    }
}
