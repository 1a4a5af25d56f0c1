//! State module for tracking crawl progress
//!
//! This module provides the per-run bookkeeping shared by every worker.
//!
//! # Components
//!
//! - `RunState`: Lifecycle of a run (init, running, draining, finished, failed)
//! - `RunStateMachine`: Thread-safe holder that validates transitions
//! - `VisitationLedger`: Which URLs were followed, reached, failed or excluded

mod ledger;
mod run_state;

use std::sync::{Mutex, MutexGuard};

// Re-export main types
pub use ledger::{Outcome, VisitationLedger};
pub use run_state::{RunState, RunStateMachine};

/// Locks a mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
