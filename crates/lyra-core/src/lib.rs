//! Shared vocabulary for the lyra playback core.
//!
//! Everything here is plain data: time sentinels, period identifiers, formats,
//! track groups and selections, data specs and load metadata. The crates that
//! do work (`lyra-bufpool`, `lyra-net`, `lyra-source`, `lyra-control`) all
//! speak in these types.

#![forbid(unsafe_code)]

mod data;
mod flags;
mod format;
mod ids;
mod selection;
pub mod time;
mod timeline;
mod track;

pub use data::{DataSpec, DataType, LoadEventInfo, MediaLoadData};
pub use flags::{BufferFlags, ReadFlags};
pub use format::{Format, FormatBuilder};
pub use ids::{MediaPeriodId, PeriodUid};
pub use selection::TrackSelection;
pub use time::{TIME_END_OF_SOURCE, TIME_UNSET};
pub use timeline::{PeriodInfo, Timeline};
pub use track::{TrackGroup, TrackGroupArray, TrackType};
