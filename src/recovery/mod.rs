//! Stuck job recovery
//!
//! The monitor reads only persisted job records: a job is stuck when it is
//! not terminal and its `updated_at` is older than the staleness threshold.
//! Nothing about previously seen jobs is kept in memory, so any number of
//! monitors (or a one-off `recover` from the command line) can run next to
//! the workers.

mod monitor;

pub use monitor::{RecoveryAction, RecoveryMonitor, RecoveryOutcome};
