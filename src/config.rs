// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::time::Duration;

/// Store configuration.
///
/// Built with a chainable builder, e.g.:
///
/// ```
/// # use bitlog::Config;
/// # use std::time::Duration;
/// let config = Config::new()
///     .max_segment_size(4 * 1_024 * 1_024)
///     .compaction_garbage_ratio(0.6)
///     .compaction_check_interval(Duration::from_secs(5));
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Segments rotate once their size reaches this many bytes.
    pub(crate) max_segment_size: u64,

    /// How often the background watchdog checks whether compaction should run.
    pub(crate) compaction_check_interval: Duration,

    /// Compaction triggers once `(total_bytes - live_bytes) / total_bytes` reaches this.
    pub(crate) compaction_garbage_ratio: f64,

    /// Whether to spawn the background compaction watchdog thread at all.
    pub(crate) watchdog_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_segment_size: 1024 * 1024,
            compaction_check_interval: Duration::from_secs(2),
            compaction_garbage_ratio: 0.5,
            watchdog_enabled: true,
        }
    }
}

impl Config {
    /// Creates a new configuration builder with the store's defaults: 1 MiB segments,
    /// a 2-second watchdog tick, and a 0.5 garbage-ratio compaction trigger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size, in bytes, past which an active segment rotates to a fresh file.
    ///
    /// Default = 1 MiB.
    #[must_use]
    pub fn max_segment_size(mut self, bytes: u64) -> Self {
        self.max_segment_size = bytes;
        self
    }

    /// Sets how often the background watchdog re-evaluates the garbage ratio.
    ///
    /// Default = 2 seconds.
    #[must_use]
    pub fn compaction_check_interval(mut self, interval: Duration) -> Self {
        self.compaction_check_interval = interval;
        self
    }

    /// Sets the garbage ratio at which the watchdog triggers a compaction pass.
    ///
    /// Default = 0.5.
    #[must_use]
    pub fn compaction_garbage_ratio(mut self, ratio: f64) -> Self {
        self.compaction_garbage_ratio = ratio;
        self
    }

    /// Disables the background compaction watchdog thread entirely.
    ///
    /// Useful for tests and embedders that want to drive compaction only via
    /// [`crate::Store::compact_now`].
    #[must_use]
    pub fn without_watchdog(mut self) -> Self {
        self.watchdog_enabled = false;
        self
    }
}
