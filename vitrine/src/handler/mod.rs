//! The http handlers
//!
//! Reads are served from the stores' in-memory snapshots,
//! writes go through the stores and answer once the backend confirmed them.

pub mod content;
pub mod settings;
pub mod uploads;
