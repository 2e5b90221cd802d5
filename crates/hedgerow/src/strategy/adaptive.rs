// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Mutex;
use std::time::Duration;

use super::{Strategy, StrategyConfig, StrategyOutcome};
use crate::rnd::Rnd;

pub(super) const DEFAULT_CANDIDATES: &[u64] = &[50, 100, 200, 500, 1000];
const FAST_REQUEST_THRESHOLD_MS: u64 = 200;
const REWARD_SCALE_MS: f64 = 500.0;

#[derive(Debug, Clone, Copy)]
struct Arm {
    delay_ms: u64,
    alpha: f64,
    beta: f64,
    pulls: u64,
    reward_sum: f64,
}

impl Arm {
    fn mean(self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    fn variance(self) -> f64 {
        let sum = self.alpha + self.beta;
        (self.alpha * self.beta) / (sum * sum * (sum + 1.0))
    }
}

#[derive(Debug)]
struct State {
    arms: Vec<Arm>,
    total_pulls: u64,
}

/// A Thompson-sampling bandit over a fixed set of candidate delays.
///
/// Each arm tracks Beta(α, β) parameters. `calculate_delay` samples a
/// mean-plus-noise proxy score per arm (the explicitly sanctioned fallback
/// when a full Beta sampler is unavailable) and greedily picks the best
/// scoring arm. `update` converts the request outcome into a reward in
/// `[0, 1]` and nudges the matching arm's parameters toward it.
#[derive(Debug)]
pub(super) struct AdaptiveStrategy {
    state: Mutex<State>,
    rnd: Rnd,
}

impl AdaptiveStrategy {
    pub(super) fn new(cfg: &StrategyConfig) -> Self {
        let candidates: Vec<u64> = cfg
            .delay_candidates
            .clone()
            .unwrap_or_else(|| DEFAULT_CANDIDATES.to_vec());
        let arms = candidates
            .into_iter()
            .map(|delay_ms| Arm {
                delay_ms,
                alpha: 1.0,
                beta: 1.0,
                pulls: 0,
                reward_sum: 0.0,
            })
            .collect();
        Self {
            state: Mutex::new(State { arms, total_pulls: 0 }),
            rnd: Rnd::default(),
        }
    }

    #[cfg(test)]
    fn with_rnd(cfg: &StrategyConfig, rnd: Rnd) -> Self {
        Self { rnd, ..Self::new(cfg) }
    }
}

fn reward_for(outcome: &StrategyOutcome) -> f64 {
    if outcome.hedged && outcome.hedge_won {
        let primary_ms = outcome.primary_latency.map(|d| d.as_millis() as f64).unwrap_or(0.0);
        let hedge_delay_ms = outcome.hedge_delay.map(|d| d.as_millis() as f64).unwrap_or(0.0);
        let backup_ms = outcome.backup_latency.map(|d| d.as_millis() as f64).unwrap_or(0.0);
        ((primary_ms - (hedge_delay_ms + backup_ms)) / REWARD_SCALE_MS).clamp(0.0, 1.0)
    } else if outcome.hedged {
        0.0
    } else if outcome.total_latency < Duration::from_millis(FAST_REQUEST_THRESHOLD_MS) {
        0.8
    } else {
        0.5
    }
}

impl Strategy for AdaptiveStrategy {
    fn calculate_delay(&self, _cfg: &StrategyConfig) -> Option<Duration> {
        let mut state = self.state.lock().expect(crate::POISONED_LOCK);
        let mut best_index = 0;
        let mut best_score = f64::MIN;
        for (index, arm) in state.arms.iter().enumerate() {
            let noise = (self.rnd.next_f64() - 0.5) * 2.0 * arm.variance().sqrt();
            let score = arm.mean() + noise;
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }
        state.arms[best_index].pulls += 1;
        state.total_pulls += 1;
        Some(Duration::from_millis(state.arms[best_index].delay_ms))
    }

    fn update(&self, outcome: &StrategyOutcome) {
        let Some(delay) = outcome.hedge_delay else {
            return;
        };
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let reward = reward_for(outcome);

        let mut state = self.state.lock().expect(crate::POISONED_LOCK);
        if let Some(arm) = state.arms.iter_mut().find(|arm| arm.delay_ms == delay_ms) {
            arm.alpha += reward;
            arm.beta += 1.0 - reward;
            arm.reward_sum += reward;
        }
    }

    fn current_delay_ms(&self) -> Option<u64> {
        let state = self.state.lock().expect(crate::POISONED_LOCK);
        state
            .arms
            .iter()
            .max_by(|a, b| a.mean().total_cmp(&b.mean()))
            .map(|arm| arm.delay_ms)
    }
}
