//! Construction-time parameters for a clipmap terrain.

use crate::error::ConfigError;
use std::time::Duration;

/// Default vertical bias (world units) subtracted from every elevation sample.
pub const DEFAULT_HEIGHT_BIAS: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ClipmapConfig {
    /// Clipmap power `k`; each level is `2^k - 1` vertices per side.
    pub power: u32,
    /// Number of concentric levels `L`.
    pub levels: u32,
    /// Z component of the shared world offset.
    pub height_bias: f64,
    pub vertical_exaggeration: f32,
    pub alpha: f32,
    pub sync: SyncPolicy,
}

impl Default for ClipmapConfig {
    fn default() -> Self {
        Self {
            power: 8,
            levels: 6,
            height_bias: DEFAULT_HEIGHT_BIAS,
            vertical_exaggeration: 1.0,
            alpha: 1.0,
            sync: SyncPolicy::default(),
        }
    }
}

impl ClipmapConfig {
    pub fn new(power: u32, levels: u32) -> Self {
        Self {
            power,
            levels,
            ..Default::default()
        }
    }

    pub fn with_height_bias(mut self, bias: f64) -> Self {
        self.height_bias = bias;
        self
    }

    pub fn with_sync(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(3..=14).contains(&self.power) {
            return Err(ConfigError::Power(self.power));
        }
        if self.levels == 0 {
            return Err(ConfigError::NoLevels);
        }
        if !self.height_bias.is_finite() {
            return Err(ConfigError::NonPositive {
                name: "height_bias",
                value: self.height_bias,
            });
        }
        if !(self.vertical_exaggeration.is_finite() && self.vertical_exaggeration >= 0.0) {
            return Err(ConfigError::NonPositive {
                name: "vertical_exaggeration",
                value: self.vertical_exaggeration as f64,
            });
        }
        self.sync.validate()
    }
}

/// How the frame driver waits on the previous frame's fence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncPolicy {
    /// Timeout of a single wait call. 32 ms is one frame at 30 fps.
    pub timeout: Duration,
    /// Timed-out waits tolerated before the frame proceeds unsynchronised.
    pub max_retries: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(32),
            max_retries: 8,
            backoff_initial: Duration::from_millis(1),
            backoff_max: Duration::from_millis(16),
        }
    }
}

impl SyncPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "sync.timeout",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Backoff slept after the `retry`-th consecutive timeout (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.backoff_initial
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ClipmapConfig::default();
        assert_eq!(cfg.power, 8);
        assert_eq!(cfg.levels, 6);
        assert_eq!(cfg.height_bias, 1000.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_power() {
        assert_eq!(
            ClipmapConfig::new(2, 4).validate(),
            Err(ConfigError::Power(2))
        );
        assert_eq!(
            ClipmapConfig::new(15, 4).validate(),
            Err(ConfigError::Power(15))
        );
        assert_eq!(ClipmapConfig::new(5, 0).validate(), Err(ConfigError::NoLevels));
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        let p = SyncPolicy::default();
        assert_eq!(p.backoff(0), Duration::from_millis(1));
        assert_eq!(p.backoff(1), Duration::from_millis(2));
        assert_eq!(p.backoff(3), Duration::from_millis(8));
        assert_eq!(p.backoff(4), Duration::from_millis(16));
        assert_eq!(p.backoff(40), Duration::from_millis(16));
    }
}
