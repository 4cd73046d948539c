//! Redelivery delay policy

use fc_config::DispatchConfig;

/// Exponential backoff: `min(2^attempt_count * base, max)`, never below 1 s.
///
/// With the default 5 s base the delays after attempts 1, 2, 3 are 10, 20, 40.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_seconds: u32,
    max_delay_seconds: u32,
}

impl BackoffPolicy {
    pub fn new(base_seconds: u32, max_delay_seconds: u32) -> Self {
        Self {
            base_seconds,
            max_delay_seconds: max_delay_seconds.max(1),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.backoff_base_seconds, config.max_delay_seconds)
    }

    pub fn delay_seconds(&self, attempt_count: u32) -> u32 {
        let max = u64::from(self.max_delay_seconds);
        let delay = 1u64
            .checked_shl(attempt_count)
            .map_or(max, |factor| factor.saturating_mul(u64::from(self.base_seconds)));
        delay.clamp(1, max) as u32
    }

    /// Clamp a not-before wait into `1..=max`
    pub fn clamp_delay(&self, seconds: u64) -> u32 {
        seconds.clamp(1, u64::from(self.max_delay_seconds)) as u32
    }
}
