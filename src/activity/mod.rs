//! Activity tracking for the irrigation monitor.
//!
//! Counts uploads, predictions and feed ticks so operators can see what the
//! monitor has done, within a run and across runs.

pub mod log;

pub use log::{read_snapshot, ActivityLog, ActivityStats, Counter, SharedActivityLog};
