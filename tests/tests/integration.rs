//! All integration tests for lyra

mod common;
mod lyra_bufpool;
mod lyra_session;
