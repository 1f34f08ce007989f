//! Buffering policy for the lyra playback core.
//!
//! The player asks a [`LoadControl`] two questions: whether the loading period
//! should keep buffering, and whether playback may start (or resume after a
//! stall). [`DefaultLoadControl`] answers both from duration thresholds with
//! hysteresis and a byte target derived from the selected tracks.
//!
//! ```rust
//! use lyra_control::{DefaultLoadControl, LoadControl};
//!
//! let mut control = DefaultLoadControl::builder()
//!     .with_buffer_durations_ms(15_000, 30_000, 2_500, 2_000)
//!     .build()
//!     .expect("valid thresholds");
//! control.on_prepared();
//! assert!(control.should_continue_loading(0, 0, 1.0));
//! ```

#![forbid(unsafe_code)]

mod config;
mod control;

pub use config::{ConfigError, ConfigResult, DefaultLoadControlBuilder, LoadControlConfig};
pub use control::{
    DefaultLoadControl, LoadControl, LoadControlState, MIN_BUFFER_SIZE, default_buffer_size,
};
