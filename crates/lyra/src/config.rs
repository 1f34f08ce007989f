//! Configuration for [`Session`](crate::Session).

use lyra_bufpool::AllocatorOptions;
use lyra_control::LoadControlConfig;
use lyra_net::PolicyOptions;
use lyra_source::PeriodOptions;
use serde::{Deserialize, Serialize};

use crate::SessionResult;

/// Every tunable of one playback session.
///
/// All sections default independently, so a JSON document only needs the
/// fields it changes:
///
/// ```
/// use lyra::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{"load_control": {"min_buffer_ms": 15000}}"#)
///     .expect("valid config");
/// assert_eq!(config.load_control.min_buffer_ms, 15_000);
/// assert_eq!(config.load_control.buffer_for_playback_ms, 2_500);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pool shared by every period of the session.
    pub allocator: AllocatorOptions,
    /// Retry and fallback tunables.
    pub load_error_policy: PolicyOptions,
    /// Buffering thresholds.
    pub load_control: LoadControlConfig,
    /// Settings applied to every progressive period.
    pub period: PeriodOptions,
    /// Capacity of the event bus channel.
    pub event_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allocator: AllocatorOptions::default(),
            load_error_policy: PolicyOptions::default(),
            load_control: LoadControlConfig::default(),
            period: PeriodOptions::default(),
            event_channel_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or inconsistent buffering thresholds.
    pub fn from_json(json: &str) -> SessionResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Fails on inconsistent buffering thresholds.
    pub fn validate(&self) -> SessionResult<()> {
        self.load_control.validate()?;
        Ok(())
    }

    pub fn with_load_control(mut self, config: LoadControlConfig) -> Self {
        self.load_control = config;
        self
    }

    pub fn with_load_error_policy(mut self, options: PolicyOptions) -> Self {
        self.load_error_policy = options;
        self
    }

    pub fn with_allocator(mut self, options: AllocatorOptions) -> Self {
        self.allocator = options;
        self
    }

    pub fn with_period(mut self, options: PeriodOptions) -> Self {
        self.period = options;
        self
    }
}
