//! Freshness detection: file mtimes and per-module staleness tracking.

mod mtime;
mod tracker;

pub use mtime::get_mtime;
pub use tracker::StalenessTracker;
