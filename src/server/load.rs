//! Request load estimation per primary key.

use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Default weight of the newest sample in [SmoothedRequestLoad].
pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.25;
/// Default gap between lookups after which the load starts over from zero.
pub const DEFAULT_NULLING_DELAY: Duration = Duration::from_secs(60);

/// Shortest gap between two lookups taken into account, caps a single
/// sample at 100 lookups per second.
const MIN_DELAY_SECS: f32 = 0.01;

/// How the request load of a key evolves with every lookup.
pub trait RequestLoadPolicy: Debug + Send + Sync {
    /// Compute the new load given the previous one and the time since the
    /// previous lookup, `None` for the first lookup of a key.
    fn next_load(&self, previous: f32, elapsed: Option<Duration>) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Exponential moving average of the lookup rate (lookups per second).
///
/// The first lookup yields `0`, and so does a lookup arriving after more
/// than `nulling_delay` of silence.
pub struct SmoothedRequestLoad {
    pub smoothing_factor: f32,
    pub nulling_delay: Duration,
}

impl Default for SmoothedRequestLoad {
    fn default() -> Self {
        SmoothedRequestLoad {
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            nulling_delay: DEFAULT_NULLING_DELAY,
        }
    }
}

impl RequestLoadPolicy for SmoothedRequestLoad {
    fn next_load(&self, previous: f32, elapsed: Option<Duration>) -> f32 {
        let elapsed = match elapsed {
            Some(elapsed) if elapsed <= self.nulling_delay => elapsed,
            _ => return 0.0,
        };

        let delay = elapsed.as_secs_f32().max(MIN_DELAY_SECS);
        let load = self.smoothing_factor * (1.0 / delay) + (1.0 - self.smoothing_factor) * previous;

        load.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Load state kept with every value bag.
pub(crate) struct RequestLoad {
    load: f32,
    last_request: Option<Instant>,
}

impl RequestLoad {
    pub fn load(&self) -> f32 {
        self.load
    }

    /// Record a lookup at `now` and return the updated load.
    pub fn increment(&mut self, policy: &dyn RequestLoadPolicy, now: Instant) -> f32 {
        let elapsed = self
            .last_request
            .map(|last| now.saturating_duration_since(last));

        self.load = policy.next_load(self.load, elapsed);
        self.last_request = Some(now);

        self.load
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_lookup_is_zero() {
        let policy = SmoothedRequestLoad::default();
        assert_eq!(policy.next_load(0.0, None), 0.0);
    }

    #[test]
    fn grows_with_frequent_lookups() {
        let policy = SmoothedRequestLoad::default();
        let half_second = Some(Duration::from_millis(500));

        let load = policy.next_load(0.0, half_second);
        assert!(load > policy.smoothing_factor);

        let next = policy.next_load(load, half_second);
        assert!(next > load);
    }

    #[test]
    fn zero_smoothing_factor() {
        let policy = SmoothedRequestLoad {
            smoothing_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(policy.next_load(0.0, Some(Duration::from_millis(500))), 0.0);
    }

    #[test]
    fn nulled_after_silence() {
        let policy = SmoothedRequestLoad::default();

        let load = policy.next_load(
            50.0,
            Some(policy.nulling_delay + Duration::from_millis(1)),
        );
        assert_eq!(load, 0.0);
    }

    #[test]
    fn bounded_by_minimum_delay() {
        let policy = SmoothedRequestLoad::default();
        let mut load = 0.0;

        for _ in 0..1000 {
            load = policy.next_load(load, Some(Duration::ZERO));
        }

        assert!(load > 1.0);
        assert!(load <= 1.0 / MIN_DELAY_SECS + 0.001);
    }

    #[test]
    fn bag_load_state() {
        let policy = SmoothedRequestLoad::default();
        let mut state = RequestLoad::default();
        let start = Instant::now();

        assert_eq!(state.increment(&policy, start), 0.0);

        let load = state.increment(&policy, start + Duration::from_millis(500));
        assert!(load > 0.0);
        assert_eq!(state.load(), load);

        // A clock going backwards counts as no delay at all.
        assert!(state.increment(&policy, start) >= load);
    }
}
