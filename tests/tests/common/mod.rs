// Common fixtures and utilities for integration tests

pub mod fixtures;
pub mod player;

pub use fixtures::*;
pub use player::*;
