//! Registry sizing and cleaner scheduling from the `[registry]` section

use ssoconfig::{define_options, Count, Duration, Ratio};
use std::time::Duration as StdDuration;

/// Ceiling on the preallocated map size; larger hints are clamped
pub const MAX_INITIAL_CAPACITY: usize = 1 << 20;

define_options! {
    /// Store sizing hints and cleaner policy
    pub struct RegistryOptions {
        /// Expected number of live tickets
        initial_capacity: Count = Count(1000),
        load_factor: Ratio = Ratio(1.0),
        /// Expected number of concurrently writing threads
        concurrency_level: Count = Count(20),
        /// Delay before the first sweep; zero disables the cleaner
        cleaner_start_delay: Duration = Duration(StdDuration::from_secs(20)),
        cleaner_repeat_interval: Duration = Duration(StdDuration::from_secs(120)),
        /// Upper bound on one single-logout call during a sweep
        cleaner_logout_timeout: Duration = Duration(StdDuration::from_secs(10)),
        /// Whether this instance is the one that runs the cleaner
        cleaner_enabled: bool = true,
    }
}

impl RegistryOptions {
    /// Map capacity after applying the load factor
    pub fn capacity(&self) -> usize {
        let load_factor = if self.load_factor.0 > 0.0 {
            self.load_factor.0
        } else {
            1.0
        };
        let capacity = (self.initial_capacity.0 as f64 / load_factor).ceil();
        if capacity >= MAX_INITIAL_CAPACITY as f64 {
            MAX_INITIAL_CAPACITY
        } else {
            capacity as usize
        }
    }

    /// Shard count: the concurrency level rounded up to a power of two, at least 2
    pub fn shard_amount(&self) -> usize {
        let level = usize::try_from(self.concurrency_level.0)
            .unwrap_or(1 << 16)
            .clamp(2, 1 << 16);
        level.next_power_of_two()
    }
}
