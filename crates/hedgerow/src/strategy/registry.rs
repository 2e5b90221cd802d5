// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Strategy, StrategyConfig, StrategyKind, StrategyStats, create, validate};

/// Lazily-created, per-`(kind, name)` registry of strategy instances.
///
/// Mirrors the per-key lazy-instance pattern this workspace's circuit
/// breaker engine registry uses: a `Mutex<HashMap<K, Arc<V>>>`, with
/// `start`/`get_or_create` creating and caching an instance the first time
/// a key is seen and every later call reusing it.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    instances: Mutex<HashMap<(StrategyKind, String), Arc<dyn Strategy>>>,
}

impl StrategyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `cfg` for `kind`, then return the existing instance for
    /// `(kind, name)` or lazily create and cache one using `cfg`. Idempotent:
    /// once created, later calls with the same `(kind, name)` ignore `cfg`
    /// and return the existing instance.
    pub(crate) fn start(
        &self,
        kind: StrategyKind,
        name: &str,
        cfg: &StrategyConfig,
    ) -> Result<Arc<dyn Strategy>, String> {
        let key = (kind, name.to_string());
        let mut instances = self.instances.lock().expect(crate::POISONED_LOCK);
        if let Some(existing) = instances.get(&key) {
            return Ok(Arc::clone(existing));
        }
        validate(kind, cfg)?;
        let strategy: Arc<dyn Strategy> = Arc::from(create(kind, cfg));
        instances.insert(key, Arc::clone(&strategy));
        Ok(strategy)
    }

    /// A snapshot of the named strategy instance's state, across every kind
    /// registered under that name. Returns `None` if no instance with that
    /// name has been started yet.
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<StrategyStats> {
        let instances = self.instances.lock().expect(crate::POISONED_LOCK);
        instances.iter().find_map(|((kind, instance_name), strategy)| {
            (instance_name == name).then(|| StrategyStats {
                kind: *kind,
                current_delay_ms: strategy.current_delay_ms(),
            })
        })
    }

    /// Drop every strategy instance registered under `name`, so the next
    /// call to [`start`][Self::start] with that name creates a fresh
    /// instance.
    pub fn reset(&self, name: &str) {
        let mut instances = self.instances.lock().expect(crate::POISONED_LOCK);
        instances.retain(|(_, instance_name), _| instance_name != name);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.instances.lock().expect(crate::POISONED_LOCK).len()
    }
}
