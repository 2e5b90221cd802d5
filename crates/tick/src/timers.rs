// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::mem;
use std::task::Waker;
use std::time::{Duration, Instant};

/// Unique identifier for a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerKey {
    tick: Instant,

    /// Discriminator that ensures two timer IDs with the same instant can be created.
    discriminator: u32,
}

impl TimerKey {
    const fn new(tick: Instant, id: u32) -> Self {
        Self { tick, discriminator: id }
    }

    /// Determines when the timer will fire.
    pub const fn tick(&self) -> Instant {
        self.tick
    }
}

/// The minimum resolution for timers.
///
/// Timers with a shorter period will be rounded up to this value. The 1ms resolution
/// provides adequate precision for most use cases while minimizing the overhead of
/// timer management. Setting this too low would increase CPU usage from frequent
/// timer checks, while setting it too high would reduce timer precision.
pub(crate) const TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// Management of one-shot timers, inspired by the [glommio runtime](https://github.com/DataDog/glommio/blob/d3f6e7a2ee7fb071ada163edcf90fc3286424c31/glommio/src/reactor.rs#L80).
///
/// The timers managed by this collection are one-shot, meaning they will not fire again after being triggered.
#[derive(Debug, Default)]
pub(crate) struct Timers {
    /// An ordered map of registered timers.
    ///
    /// Timers are stored in the order in which they will fire.
    /// The [`Waker`] represents the task awaiting the timer.
    wakers: BTreeMap<TimerKey, Waker>,
    last_discriminator: u32,
}

impl Timers {
    pub fn len(&self) -> usize {
        self.wakers.len()
    }

    #[cfg(test)]
    fn contains(&self, id: TimerKey) -> bool {
        self.wakers.contains_key(&id)
    }

    /// Registers a new timer that will fire at the specified instant.
    ///
    /// Returns a unique [`TimerKey`] that can be used to unregister the timer.
    pub fn register(&mut self, when: Instant, waker: Waker) -> TimerKey {
        // We can wrap the discriminator because it's only used to distinguish timers with the same instant,
        // and the actual value can start from 0 again.
        self.last_discriminator = self.last_discriminator.wrapping_add(1);
        let key = TimerKey::new(when, self.last_discriminator);

        self.wakers.insert(key, waker);

        key
    }

    /// Unregisters a timer with the given key.
    ///
    /// If the timer was not found, this operation is a no-op.
    pub fn unregister(&mut self, id: TimerKey) {
        self.wakers.remove(&id);
    }

    /// Returns the instant when the next timer will fire, or `None` if no timers are registered.
    pub fn next_timer(&self) -> Option<Instant> {
        self.wakers.keys().next().map(TimerKey::tick)
    }

    /// Advances timers that are ready to be woken.
    ///
    /// Returns the next timer instant if any timers remain, or `None` if no timers are pending.
    ///
    /// In the future, the signature of this method can be easily expanded to return more
    /// information about the timers that fired and when the next timer fires.
    #[cfg_attr(test, mutants::skip)] // Causes test timeout.
    pub fn advance_timers(&mut self, now: Instant) -> Option<Instant> {
        // We are adding 1ns to the instant to ensure that even timers whose deadline is the current
        // instant are advanced. This is required because of how BTreeMap::split_off works; it does
        // not include keys that are equal to the split key. Adding 1ns to the value makes this work.
        let adjusted_now = now.checked_add(Duration::from_nanos(1)).unwrap_or(now);

        // Check if there are any timers that are ready to be woken.
        match self.wakers.first_entry() {
            Some(entry) => {
                if entry.key().tick() <= adjusted_now {
                    // Split timers into ready and pending timers.
                    let pending = self.wakers.split_off(&TimerKey::new(adjusted_now, 0));
                    let ready = mem::replace(&mut self.wakers, pending);

                    // Invoke the wakers for timers that ticked.
                    for (_, waker) in ready {
                        waker.wake();
                    }

                    // Return the next timer to be fired.
                    return self.next_timer();
                }

                Some(entry.key().tick())
            }
            None => None,
        }
    }
}
