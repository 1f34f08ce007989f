#![forbid(unsafe_code)]

//! Media periods for the lyra playback core.
//!
//! A period is one stretch of media that renderers read from through
//! [`SampleStream`]s. [`ProgressiveMediaPeriod`] loads a single resource on a
//! background loader and buffers it in per-track [`SampleQueue`]s backed by
//! the session [`lyra_bufpool::Allocator`]. [`MergingMediaPeriod`] plays
//! several periods in parallel as one, shifting those with a time offset.
//!
//! ```ignore
//! let mut period = ProgressiveMediaPeriod::new(id, uri, factory, ctx, listener, options);
//! period.prepare(0);
//! while let Some(event) = period.poll() {
//!     match event {
//!         PeriodEvent::Prepared => { /* select tracks */ }
//!         PeriodEvent::ContinueLoadingRequested => {
//!             if load_control.should_continue_loading(..) {
//!                 period.continue_loading(playback_position_us);
//!             }
//!         }
//!     }
//! }
//! ```

mod composite;
mod extractor;
mod merging;
mod period;
mod progressive;
mod sample_queue;
mod sample_stream;
mod seek;
mod time_offset;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use composite::CompositeSequenceableLoader;
pub use extractor::{
    ContainerKind, ExtractorFactory, ExtractorOutput, MediaExtractor, ReadOutcome, TrackOutput,
};
pub use merging::MergingMediaPeriod;
pub use period::{
    MediaPeriod, PeriodContext, PeriodError, PeriodEvent, PeriodOptions, PeriodResult,
    PeriodState, SequenceableLoader, SourceInfoListener,
};
pub use progressive::ProgressiveMediaPeriod;
pub use sample_queue::SampleQueue;
pub use sample_stream::{
    DecoderInputBuffer, FormatHolder, ReadResult, SampleStream, SharedSampleStream, same_stream,
};
pub use seek::{SeekMap, SeekParameters, SeekPoint};
pub use time_offset::{TimeOffsetMediaPeriod, TimeOffsetSampleStream};
