use lyra_bufpool::Allocator;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DefaultLoadControl;

/// Invalid buffering thresholds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min buffer ({min_buffer_ms} ms) is shorter than buffer for playback ({buffer_for_playback_ms} ms)")]
    MinBelowPlayback {
        min_buffer_ms: u64,
        buffer_for_playback_ms: u64,
    },

    #[error(
        "min buffer ({min_buffer_ms} ms) is shorter than buffer after rebuffer ({buffer_after_rebuffer_ms} ms)"
    )]
    MinBelowRebuffer {
        min_buffer_ms: u64,
        buffer_after_rebuffer_ms: u64,
    },

    #[error("max buffer ({max_buffer_ms} ms) is shorter than min buffer ({min_buffer_ms} ms)")]
    MaxBelowMin {
        max_buffer_ms: u64,
        min_buffer_ms: u64,
    },

    #[error("target buffer bytes must be positive")]
    ZeroTargetBytes,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Thresholds for [`DefaultLoadControl`].
///
/// Durations are playout time in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadControlConfig {
    /// Loading resumes when the buffer drops below this.
    pub min_buffer_ms: u64,
    /// Loading stops once the buffer reaches this.
    pub max_buffer_ms: u64,
    /// Buffer required to start playback initially or after a seek.
    pub buffer_for_playback_ms: u64,
    /// Buffer required to resume after a stall.
    pub buffer_for_playback_after_rebuffer_ms: u64,
    /// Fixed byte target. `None` derives it from the selected tracks.
    pub target_buffer_bytes: Option<u64>,
    /// Let the duration thresholds win over the byte target.
    pub prioritize_time_over_size_thresholds: bool,
    /// Media kept behind the playback position.
    pub back_buffer_duration_ms: u64,
    /// Keep the back buffer from the preceding keyframe.
    pub retain_back_buffer_from_keyframe: bool,
}

impl Default for LoadControlConfig {
    fn default() -> Self {
        Self {
            min_buffer_ms: 50_000,
            max_buffer_ms: 50_000,
            buffer_for_playback_ms: 2_500,
            buffer_for_playback_after_rebuffer_ms: 2_000,
            target_buffer_bytes: None,
            prioritize_time_over_size_thresholds: false,
            back_buffer_duration_ms: 0,
            retain_back_buffer_from_keyframe: false,
        }
    }
}

impl LoadControlConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_buffer_ms < self.buffer_for_playback_ms {
            return Err(ConfigError::MinBelowPlayback {
                min_buffer_ms: self.min_buffer_ms,
                buffer_for_playback_ms: self.buffer_for_playback_ms,
            });
        }
        if self.min_buffer_ms < self.buffer_for_playback_after_rebuffer_ms {
            return Err(ConfigError::MinBelowRebuffer {
                min_buffer_ms: self.min_buffer_ms,
                buffer_after_rebuffer_ms: self.buffer_for_playback_after_rebuffer_ms,
            });
        }
        if self.max_buffer_ms < self.min_buffer_ms {
            return Err(ConfigError::MaxBelowMin {
                max_buffer_ms: self.max_buffer_ms,
                min_buffer_ms: self.min_buffer_ms,
            });
        }
        if self.target_buffer_bytes == Some(0) {
            return Err(ConfigError::ZeroTargetBytes);
        }
        Ok(())
    }
}

/// Builder for [`DefaultLoadControl`].
pub struct DefaultLoadControlBuilder {
    config: LoadControlConfig,
    allocator: Option<Allocator>,
}

impl DefaultLoadControlBuilder {
    pub fn new() -> Self {
        Self {
            config: LoadControlConfig::default(),
            allocator: None,
        }
    }

    pub fn with_config(mut self, config: LoadControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing pool instead of creating one.
    pub fn with_allocator(mut self, allocator: Allocator) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn with_buffer_durations_ms(
        mut self,
        min_buffer_ms: u64,
        max_buffer_ms: u64,
        buffer_for_playback_ms: u64,
        buffer_for_playback_after_rebuffer_ms: u64,
    ) -> Self {
        self.config.min_buffer_ms = min_buffer_ms;
        self.config.max_buffer_ms = max_buffer_ms;
        self.config.buffer_for_playback_ms = buffer_for_playback_ms;
        self.config.buffer_for_playback_after_rebuffer_ms = buffer_for_playback_after_rebuffer_ms;
        self
    }

    pub fn with_target_buffer_bytes(mut self, bytes: u64) -> Self {
        self.config.target_buffer_bytes = Some(bytes);
        self
    }

    pub fn with_prioritize_time_over_size_thresholds(mut self, prioritize: bool) -> Self {
        self.config.prioritize_time_over_size_thresholds = prioritize;
        self
    }

    pub fn with_back_buffer_duration_ms(mut self, duration_ms: u64, from_keyframe: bool) -> Self {
        self.config.back_buffer_duration_ms = duration_ms;
        self.config.retain_back_buffer_from_keyframe = from_keyframe;
        self
    }

    pub fn build(self) -> ConfigResult<DefaultLoadControl> {
        DefaultLoadControl::new(self.config, self.allocator.unwrap_or_default())
    }
}

impl Default for DefaultLoadControlBuilder {
    fn default() -> Self {
        Self::new()
    }
}
