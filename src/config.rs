//! Kernel sizing constants and runtime configuration.

/// Number of thread table slots, including the one owned by the idle thread.
pub const MAX_THREADS: usize = 8;

/// Longest thread name kept, in bytes. Longer names are truncated.
pub const MAX_NAME_LEN: usize = 10;

/// Default tick period: 10 ms.
pub const DEFAULT_TICK_PERIOD_US: u32 = 10_000;

/// Default length of a statistics interval: 100 ticks, one second at the
/// default tick period.
pub const DEFAULT_STATS_INTERVAL_TICKS: u32 = 100;

/// Runtime kernel configuration.
///
/// ```ignore
/// let config = KernelConfig::new()
///     .with_tick_period_us(1_000)
///     .with_stats_interval_ticks(1_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Time between two scheduler ticks, in microseconds.
    pub tick_period_us: u32,
    /// Ticks per statistics interval. Zero disables counter rollover.
    pub stats_interval_ticks: u32,
}

impl KernelConfig {
    /// Configuration with the default 10 ms tick and one second intervals.
    pub const fn new() -> Self {
        Self {
            tick_period_us: DEFAULT_TICK_PERIOD_US,
            stats_interval_ticks: DEFAULT_STATS_INTERVAL_TICKS,
        }
    }

    pub const fn with_tick_period_us(mut self, tick_period_us: u32) -> Self {
        self.tick_period_us = tick_period_us;
        self
    }

    pub const fn with_stats_interval_ticks(mut self, ticks: u32) -> Self {
        self.stats_interval_ticks = ticks;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.tick_period_us, 10_000);
        assert_eq!(config.stats_interval_ticks, 100);
    }

    #[test]
    fn test_builder_methods() {
        let config = KernelConfig::new()
            .with_tick_period_us(1_000)
            .with_stats_interval_ticks(0);
        assert_eq!(config.tick_period_us, 1_000);
        assert_eq!(config.stats_interval_ticks, 0);
    }
}
