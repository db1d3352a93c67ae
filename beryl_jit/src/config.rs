//! JIT coordinator configuration.
//!
//! All thresholds are tunable; defaults match the shipped interpreter
//! flags. Options are normalized once at engine init.

use std::time::Duration;

/// Default permitted number of units with loaded code.
pub const DEFAULT_CACHE_SIZE: usize = 1000;
/// Default call-count threshold for admitting an iseq.
pub const DEFAULT_MIN_CALLS: u64 = 5;
/// Minimum value for the JIT cache size.
pub const MIN_CACHE_SIZE: usize = 10;
/// Sleep quantum shared by every poll loop in the coordinator
/// (synchronous wait, pause draining, worker stop).
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// How long a synchronous wait spins before giving up on a unit.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the JIT coordination plane.
#[derive(Debug, Clone)]
pub struct JitConfig {
    /// Invocation threshold at which the interpreter submits an iseq.
    ///
    /// `0` means unset and normalizes to [`DEFAULT_MIN_CALLS`].
    pub min_calls: u64,

    /// Maximum number of units kept in the active cache.
    ///
    /// `0` means unset and normalizes to [`DEFAULT_CACHE_SIZE`];
    /// explicit values below [`MIN_CACHE_SIZE`] are raised to it.
    pub max_cache_size: usize,

    /// Emit coordinator warnings (timeouts, dead worker).
    pub warnings: bool,

    /// Diagnostic verbosity level; `0` is silent.
    pub verbose: u8,

    /// Keep the precompiled header on disk at finish.
    pub save_temps: bool,

    /// Default `wait` semantics for `pause` when the caller does not
    /// specify one.
    pub wait: bool,

    /// Poll-sleep quantum for the coordinator's wait loops.
    pub poll_interval: Duration,

    /// Timeout for the synchronous per-iseq wait.
    pub wait_timeout: Duration,
}

impl Default for JitConfig {
    fn default() -> Self {
        JitConfig {
            min_calls: DEFAULT_MIN_CALLS,
            max_cache_size: DEFAULT_CACHE_SIZE,
            warnings: false,
            verbose: 0,
            save_temps: false,
            wait: true,
            poll_interval: POLL_INTERVAL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl JitConfig {
    /// Normalize unset and out-of-range options.
    ///
    /// Order matters and is observable: an explicit `0` cache size is
    /// treated as unset and lands on the 1000 default, not on the 10
    /// minimum.
    pub fn normalized(mut self) -> Self {
        if self.min_calls == 0 {
            self.min_calls = DEFAULT_MIN_CALLS;
        }
        if self.max_cache_size == 0 {
            self.max_cache_size = DEFAULT_CACHE_SIZE;
        }
        if self.max_cache_size < MIN_CACHE_SIZE {
            self.max_cache_size = MIN_CACHE_SIZE;
        }
        if self.poll_interval.is_zero() {
            self.poll_interval = POLL_INTERVAL;
        }
        if self.wait_timeout.is_zero() {
            self.wait_timeout = DEFAULT_WAIT_TIMEOUT;
        }
        self
    }

    /// Small cache and short timeout for tests.
    pub fn for_testing() -> Self {
        JitConfig {
            min_calls: 1,
            max_cache_size: MIN_CACHE_SIZE,
            wait_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_already_normal() {
        let config = JitConfig::default().normalized();
        assert_eq!(config.min_calls, DEFAULT_MIN_CALLS);
        assert_eq!(config.max_cache_size, DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn test_zero_min_calls_promotes_to_default() {
        let config = JitConfig {
            min_calls: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.min_calls, DEFAULT_MIN_CALLS);
    }

    #[test]
    fn test_zero_cache_size_lands_on_default_not_minimum() {
        let config = JitConfig {
            max_cache_size: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.max_cache_size, DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn test_tiny_cache_size_raised_to_minimum() {
        let config = JitConfig {
            max_cache_size: 3,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.max_cache_size, MIN_CACHE_SIZE);
    }
}
