use lyra_bufpool::{Allocator, DEFAULT_ALLOCATION_LENGTH};
use lyra_core::{MediaPeriodId, Timeline, TrackGroupArray, TrackSelection, TrackType, time};
use tracing::{debug, trace, warn};

use crate::{ConfigResult, DefaultLoadControlBuilder, LoadControlConfig};

const BLOCK: u64 = DEFAULT_ALLOCATION_LENGTH as u64;

/// Byte target floor for any selection.
pub const MIN_BUFFER_SIZE: u64 = 200 * BLOCK;

/// Loading is never paused on the duration threshold below this buffer.
const MIN_BUFFER_FLOOR_US: i64 = 500_000;

/// Byte budget for a renderer of `track_type` whose bitrate is unknown.
pub fn default_buffer_size(track_type: TrackType) -> u64 {
    match track_type {
        TrackType::Video => 2_000 * BLOCK,
        TrackType::Audio => 200 * BLOCK,
        TrackType::Default => (2_000 + 200 + 2) * BLOCK,
        TrackType::None => 0,
        TrackType::Text
        | TrackType::Image
        | TrackType::Metadata
        | TrackType::CameraMotion
        | TrackType::Unknown => 2 * BLOCK,
    }
}

/// Buffering decisions for the player.
///
/// The player calls the lifecycle methods as a period is prepared, gets its
/// tracks selected, stops and is released, and polls the two `should_*`
/// questions on every iteration of its loop.
pub trait LoadControl: Send {
    fn on_prepared(&mut self);

    /// `renderer_types[i]` is the type handled by renderer `i`, whose
    /// selection is `selections[i]`.
    fn on_tracks_selected(
        &mut self,
        timeline: &Timeline,
        period_id: &MediaPeriodId,
        renderer_types: &[TrackType],
        track_groups: &TrackGroupArray,
        selections: &[Option<TrackSelection>],
    );

    fn on_stopped(&mut self);

    fn on_released(&mut self);

    /// Pool shared by every period of the session.
    fn allocator(&self) -> &Allocator;

    fn back_buffer_duration_us(&self) -> i64;

    fn retain_back_buffer_from_keyframe(&self) -> bool;

    fn should_continue_loading(
        &mut self,
        playback_position_us: i64,
        buffered_duration_us: i64,
        playback_speed: f32,
    ) -> bool;

    /// `target_live_offset_us` is set only for live streams.
    fn should_start_playback(
        &self,
        timeline: &Timeline,
        period_id: &MediaPeriodId,
        buffered_duration_us: i64,
        playback_speed: f32,
        rebuffering: bool,
        target_live_offset_us: Option<i64>,
    ) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadControlState {
    Idle,
    Prepared,
    Loading,
    Loaded,
    Stopped,
    Released,
}

/// Threshold based [`LoadControl`].
///
/// Loading is switched on below the min buffer and off at the max buffer or
/// the byte target; between the two the previous decision holds.
#[derive(Debug)]
pub struct DefaultLoadControl {
    config: LoadControlConfig,
    allocator: Allocator,
    target_buffer_bytes: u64,
    state: LoadControlState,
}

impl DefaultLoadControl {
    pub fn new(config: LoadControlConfig, allocator: Allocator) -> ConfigResult<Self> {
        config.validate()?;
        let target_buffer_bytes = config.target_buffer_bytes.unwrap_or(MIN_BUFFER_SIZE);
        Ok(Self {
            config,
            allocator,
            target_buffer_bytes,
            state: LoadControlState::Idle,
        })
    }

    pub fn builder() -> DefaultLoadControlBuilder {
        DefaultLoadControlBuilder::new()
    }

    pub fn config(&self) -> &LoadControlConfig {
        &self.config
    }

    pub fn state(&self) -> LoadControlState {
        self.state
    }

    pub fn target_buffer_bytes(&self) -> u64 {
        self.target_buffer_bytes
    }

    fn min_buffer_us(&self) -> i64 {
        config_ms_to_us(self.config.min_buffer_ms)
    }

    fn max_buffer_us(&self) -> i64 {
        config_ms_to_us(self.config.max_buffer_ms)
    }

    fn target_reached(&self) -> bool {
        self.allocator.total_bytes_allocated() >= self.target_buffer_bytes
    }

    fn selection_target_bytes(
        &self,
        renderer_types: &[TrackType],
        selections: &[Option<TrackSelection>],
    ) -> u64 {
        let total = selections
            .iter()
            .enumerate()
            .filter_map(|(i, selection)| selection.as_ref().map(|s| (i, s)))
            .map(|(i, selection)| {
                let bitrate = selection.selected_format().and_then(|f| f.bitrate);
                match bitrate {
                    Some(bits_per_sec) => {
                        u64::from(bits_per_sec).saturating_mul(self.config.max_buffer_ms) / 8_000
                    }
                    None => {
                        let track_type = renderer_types
                            .get(i)
                            .copied()
                            .unwrap_or(selection.track_group().track_type);
                        default_buffer_size(track_type)
                    }
                }
            })
            .fold(0_u64, u64::saturating_add);
        total.max(MIN_BUFFER_SIZE)
    }

    fn reset(&mut self, state: LoadControlState, reset_allocator: bool) {
        if self.state == LoadControlState::Released {
            warn!(to = ?state, "load control already released");
            return;
        }
        self.target_buffer_bytes = self.config.target_buffer_bytes.unwrap_or(MIN_BUFFER_SIZE);
        self.state = state;
        if reset_allocator {
            self.allocator.reset();
        }
        trace!(?state, reset_allocator, "load control reset");
    }
}

impl LoadControl for DefaultLoadControl {
    fn on_prepared(&mut self) {
        self.reset(LoadControlState::Prepared, false);
    }

    fn on_tracks_selected(
        &mut self,
        _timeline: &Timeline,
        period_id: &MediaPeriodId,
        renderer_types: &[TrackType],
        _track_groups: &TrackGroupArray,
        selections: &[Option<TrackSelection>],
    ) {
        if self.state == LoadControlState::Released {
            return;
        }
        self.target_buffer_bytes = match self.config.target_buffer_bytes {
            Some(bytes) => bytes,
            None => self.selection_target_bytes(renderer_types, selections),
        };
        self.allocator
            .set_target_buffer_size(self.target_buffer_bytes);
        debug!(
            period = ?period_id.period_uid,
            target_bytes = self.target_buffer_bytes,
            "buffer target set"
        );
    }

    fn on_stopped(&mut self) {
        self.reset(LoadControlState::Stopped, true);
    }

    fn on_released(&mut self) {
        self.reset(LoadControlState::Released, true);
    }

    fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn back_buffer_duration_us(&self) -> i64 {
        config_ms_to_us(self.config.back_buffer_duration_ms)
    }

    fn retain_back_buffer_from_keyframe(&self) -> bool {
        self.config.retain_back_buffer_from_keyframe
    }

    fn should_continue_loading(
        &mut self,
        _playback_position_us: i64,
        buffered_duration_us: i64,
        playback_speed: f32,
    ) -> bool {
        if self.state == LoadControlState::Released {
            return false;
        }
        let target_reached = self.target_reached();
        let max_buffer_us = self.max_buffer_us();
        let mut min_buffer_us = self.min_buffer_us();
        if playback_speed > 1.0 {
            let scaled =
                time::media_duration_for_playout_duration(min_buffer_us, playback_speed);
            min_buffer_us = scaled.min(max_buffer_us);
        }
        min_buffer_us = min_buffer_us.max(MIN_BUFFER_FLOOR_US);

        let was_loading = self.state == LoadControlState::Loading;
        let loading = if buffered_duration_us < min_buffer_us {
            let loading = self.config.prioritize_time_over_size_thresholds || !target_reached;
            if !loading && buffered_duration_us < MIN_BUFFER_FLOOR_US {
                warn!(
                    buffered_us = buffered_duration_us,
                    target_bytes = self.target_buffer_bytes,
                    "byte target reached with less than 500 ms buffered"
                );
            }
            loading
        } else if buffered_duration_us >= max_buffer_us || target_reached {
            false
        } else {
            was_loading
        };

        if loading != was_loading {
            debug!(
                loading,
                buffered_us = buffered_duration_us,
                min_buffer_us,
                max_buffer_us,
                target_reached,
                "loading decision changed"
            );
        }
        self.state = if loading {
            LoadControlState::Loading
        } else {
            LoadControlState::Loaded
        };
        loading
    }

    fn should_start_playback(
        &self,
        _timeline: &Timeline,
        _period_id: &MediaPeriodId,
        buffered_duration_us: i64,
        playback_speed: f32,
        rebuffering: bool,
        target_live_offset_us: Option<i64>,
    ) -> bool {
        let buffered_us =
            time::playout_duration_for_media_duration(buffered_duration_us, playback_speed);
        let mut threshold_us = if rebuffering {
            config_ms_to_us(self.config.buffer_for_playback_after_rebuffer_ms)
        } else {
            config_ms_to_us(self.config.buffer_for_playback_ms)
        };
        if let Some(live_offset_us) = target_live_offset_us {
            threshold_us = threshold_us.min(live_offset_us / 2);
        }
        let start = threshold_us <= 0
            || buffered_us >= threshold_us
            || (!self.config.prioritize_time_over_size_thresholds && self.target_reached());
        trace!(
            start,
            buffered_us,
            threshold_us,
            rebuffering,
            "start playback check"
        );
        start
    }
}

/// Configured milliseconds as microseconds, saturating at `i64::MAX`.
fn config_ms_to_us(ms: u64) -> i64 {
    time::ms_to_us(i64::try_from(ms).unwrap_or(i64::MAX))
}
