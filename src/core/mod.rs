//! Core types: identifiers, time patterns, readings, sizing and shared state.

pub mod schedule;
pub mod sizing;
pub mod snapshot;
pub mod state;
pub mod types;
