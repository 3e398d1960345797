//! Channel reaper: warns and archives stale workspace channels, and flags
//! well-reacted messages.

pub mod config;
pub mod error;
pub mod flagger;
pub mod lifecycle;
pub mod policy;
pub mod report;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;
