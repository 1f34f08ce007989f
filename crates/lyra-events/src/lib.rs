//! Event bus for the lyra playback core.

#![forbid(unsafe_code)]

mod bus;
mod event;
mod load;
mod source;

pub use bus::EventBus;
pub use event::Event;
pub use load::LoadEvent;
pub use source::SourceEvent;
