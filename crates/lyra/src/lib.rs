#![forbid(unsafe_code)]

//! # Lyra
//!
//! Facade over the lyra buffering core.
//!
//! A [`Session`] owns the per-playback collaborators: the allocation pool,
//! the load error policy, the load control and the event bus. Periods created
//! through it share all four.
//!
//! ## Quick start
//!
//! ```ignore
//! use lyra::prelude::*;
//!
//! let mut session = Session::new(SessionConfig::default())?;
//! let mut events = session.subscribe();
//! let mut period = session.progressive_period(id, uri, factory, listener);
//! period.prepare(0);
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod bufpool {
    pub use lyra_bufpool::*;
}

pub mod control {
    pub use lyra_control::*;
}

pub mod events {
    pub use lyra_events::*;
}

pub mod net {
    pub use lyra_net::*;
}

pub mod source {
    pub use lyra_source::*;
}

pub mod types {
    pub use lyra_core::*;
}

// ── Session ─────────────────────────────────────────────────────────────

mod config;
mod error;
mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::Session;

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use lyra_bufpool::{Allocator, AllocatorOptions};
    pub use lyra_control::{DefaultLoadControl, LoadControl, LoadControlConfig};
    pub use lyra_core::{
        MediaPeriodId, PeriodUid, Timeline, TrackGroupArray, TrackSelection, TrackType,
    };
    pub use lyra_events::{Event, EventBus, LoadEvent, SourceEvent};
    pub use lyra_net::{LoadError, LoadErrorHandlingPolicy, PolicyOptions};
    pub use lyra_source::{
        MediaPeriod, MergingMediaPeriod, PeriodEvent, PeriodOptions, ProgressiveMediaPeriod,
        SampleStream, SequenceableLoader,
    };

    pub use crate::{Session, SessionConfig, SessionError};
}
