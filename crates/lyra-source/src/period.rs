use std::sync::Arc;

use lyra_bufpool::Allocator;
use lyra_core::{TrackGroupArray, TrackSelection};
use lyra_events::EventBus;
use lyra_net::{LoadError, LoadErrorHandlingPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SeekParameters, SharedSampleStream};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("period released")]
    Released,

    #[error("period not prepared")]
    NotPrepared,

    #[error("selection arrays differ in length")]
    LengthMismatch,

    #[error("track group {0} not exposed by this period")]
    UnknownTrackGroup(String),

    #[error("track group {0} selected more than once")]
    DuplicateSelection(String),

    #[error("children disagree on position: {expected} vs {actual}")]
    PositionMismatch { expected: i64, actual: i64 },

    #[error("no stream created for enabled selection {0}")]
    MissingStream(usize),
}

pub type PeriodResult<T> = Result<T, PeriodError>;

/// Lifecycle of a period as seen from the control thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeriodState {
    Idle,
    Preparing,
    Prepared,
    Loading,
    /// Prepared, not loading, more media to load.
    Buffered,
    /// Everything loaded.
    Ended,
    Error,
    Released,
}

/// Notification returned from [`MediaPeriod::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeriodEvent {
    /// Track groups are known. Returned once.
    Prepared,
    /// Loading paused; call `continue_loading` to go on.
    ContinueLoadingRequested,
}

/// A loader that loads media ahead of playback and can be resumed.
pub trait SequenceableLoader {
    /// End of the contiguous buffered range, or `TIME_END_OF_SOURCE` once all
    /// media is loaded.
    fn buffered_position_us(&self) -> i64;

    /// Start of the next load, or `TIME_END_OF_SOURCE` when nothing remains.
    fn next_load_position_us(&self) -> i64;

    /// Resume loading. Returns whether anything changed.
    fn continue_loading(&mut self, position_us: i64) -> bool;

    fn is_loading(&self) -> bool;

    fn reevaluate_buffer(&mut self, position_us: i64);
}

impl<T: SequenceableLoader + ?Sized> SequenceableLoader for Box<T> {
    fn buffered_position_us(&self) -> i64 {
        (**self).buffered_position_us()
    }

    fn next_load_position_us(&self) -> i64 {
        (**self).next_load_position_us()
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        (**self).continue_loading(position_us)
    }

    fn is_loading(&self) -> bool {
        (**self).is_loading()
    }

    fn reevaluate_buffer(&mut self, position_us: i64) {
        (**self).reevaluate_buffer(position_us);
    }
}

/// One period of media: exposes tracks, hands out sample streams for
/// selected tracks, and loads ahead of playback.
///
/// Driven from a single control thread. Asynchronous progress is observed
/// through [`MediaPeriod::poll`].
pub trait MediaPeriod: SequenceableLoader + Send {
    /// Start preparing; `position_us` is where playback will begin.
    fn prepare(&mut self, position_us: i64);

    /// Process background progress and return the next notification.
    fn poll(&mut self) -> Option<PeriodEvent>;

    /// # Errors
    ///
    /// Returns the error that stopped preparation.
    fn maybe_throw_prepare_error(&self) -> PeriodResult<()>;

    /// Exposed track groups. Empty until prepared.
    fn track_groups(&self) -> &TrackGroupArray;

    /// Apply `selections`, one slot per renderer.
    ///
    /// A slot in `streams` is kept when `may_retain` allows it and the slot's
    /// selection is unchanged; otherwise the old stream is dropped and, if the
    /// slot is selected, a new stream is stored with `reset_flags` set.
    /// Returns the position playback should start from.
    ///
    /// # Errors
    ///
    /// Fails on mismatched slice lengths or selections of unknown groups.
    fn select_tracks(
        &mut self,
        selections: &[Option<TrackSelection>],
        may_retain: &[bool],
        streams: &mut [Option<SharedSampleStream>],
        reset_flags: &mut [bool],
        position_us: i64,
    ) -> PeriodResult<i64>;

    fn discard_buffer(&mut self, position_us: i64, to_key_frame: bool);

    /// Position of a pending discontinuity, reported once.
    ///
    /// # Errors
    ///
    /// Fails when a merged child could not seek to the discontinuity.
    fn read_discontinuity(&mut self) -> PeriodResult<Option<i64>>;

    /// # Errors
    ///
    /// Fails when merged children disagree on the resulting position.
    fn seek_to_us(&mut self, position_us: i64) -> PeriodResult<i64>;

    fn adjusted_seek_position_us(&self, position_us: i64, parameters: SeekParameters) -> i64;

    /// Stop loading and free all buffers. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns the first failure among released resources.
    fn release(&mut self) -> PeriodResult<()>;

    fn state(&self) -> PeriodState;
}

/// Receives duration, seekability and liveness once known.
pub trait SourceInfoListener: Send + Sync {
    fn on_source_info_refreshed(&self, duration_us: Option<i64>, is_seekable: bool, is_live: bool);
}

impl<F> SourceInfoListener for F
where
    F: Fn(Option<i64>, bool, bool) + Send + Sync,
{
    fn on_source_info_refreshed(&self, duration_us: Option<i64>, is_seekable: bool, is_live: bool) {
        self(duration_us, is_seekable, is_live);
    }
}

/// Per-session collaborators handed to every period.
#[derive(Clone)]
pub struct PeriodContext {
    pub allocator: Allocator,
    pub policy: Arc<dyn LoadErrorHandlingPolicy>,
    pub events: EventBus,
}

impl PeriodContext {
    pub fn new(
        allocator: Allocator,
        policy: Arc<dyn LoadErrorHandlingPolicy>,
        events: EventBus,
    ) -> Self {
        Self {
            allocator,
            policy,
            events,
        }
    }
}

impl std::fmt::Debug for PeriodContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodContext")
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}

/// Single-source period settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodOptions {
    /// Bytes loaded between pauses that ask the control thread to continue.
    pub continue_loading_check_interval_bytes: u64,
    /// Cache key attached to every data spec.
    pub custom_cache_key: Option<String>,
}

impl Default for PeriodOptions {
    fn default() -> Self {
        Self {
            continue_loading_check_interval_bytes: 1024 * 1024,
            custom_cache_key: None,
        }
    }
}
