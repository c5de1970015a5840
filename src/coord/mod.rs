//! Task and claim coordination over a shared `RecordStore`.
//!
//! Agents never talk to each other or to a lock service. They create tasks
//! (deduplicated against recent active titles), append claim events, and ask
//! which open tasks nobody else seems to be working on. All liveness is
//! inferred from the event stream at read time.

pub mod aggregate;
pub mod available;
pub mod claims;
pub mod tasks;

pub use available::{AvailableFilter, AvailableTask, Availability, Contention};
pub use claims::{ClaimConflict, ClaimOutcome, LockedFile};
pub use tasks::{
    CreateOutcome, NewSubtask, NewTask, PickOutcome, SubtaskOutcome, TaskFilter, TaskUpdate,
    UpdateOutcome,
};

use crate::config::CoordinationConfig;
use crate::db::{RecordStore, now_ms};
use std::sync::Arc;

/// Entry point for every coordination operation.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn RecordStore>,
    settings: CoordinationConfig,
}

impl Coordinator {
    pub fn new(store: Arc<dyn RecordStore>, settings: CoordinationConfig) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &CoordinationConfig {
        &self.settings
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Oldest `ts` still inside the claim window.
    fn claim_window_start(&self) -> i64 {
        now_ms() - self.settings.claim_window().as_millis() as i64
    }
}
