//! Background loading for media periods.
//!
//! A [`Loader`] runs one [`Loadable`] at a time on its own named thread:
//!
//! - progress is throttled by a [`LoadGate`] the control thread opens from
//!   `continue_loading`
//! - completion and failure travel back over a `kanal` channel and are
//!   collected with [`Loader::try_next_event`], so no callback runs on the
//!   loader thread
//! - failures wait for a [`LoadErrorAction`] from the owner before retrying
//! - [`Loader::cancel_loading`] and [`Loader::release`] join the thread before
//!   returning

#![forbid(unsafe_code)]

mod gate;
mod loader;

pub use gate::{CancelToken, LoadGate};
pub use loader::{LoadContext, LoadErrorAction, Loadable, Loader, LoaderEvent};
