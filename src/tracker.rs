//! State tracking: apply a stage result to the record and persist it.
//!
//! Every stage reports through [`StateTracker::report`]. The record is
//! updated in memory first and then upserted whole; if the upsert fails the
//! in-memory update stays and the caller gets a
//! [`PipelineError::PersistenceFailure`]. The stage's work is done at that
//! point, so retrying means calling [`StateTracker::persist`] again, not
//! redoing the stage.
//!
//! Whole-record upserts lose updates if two writers hold copies of the same
//! record. The orchestrator therefore owns each record for the duration of a
//! run and is the only caller of the tracker for it.

use crate::error::PipelineError;
use crate::record::{DocumentRecord, Stage};
use crate::store::DocumentStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies stage results to records and persists them.
#[derive(Clone)]
pub struct StateTracker {
    store: Arc<dyn DocumentStore>,
}

impl StateTracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Record `stage`'s outcome and upsert the record.
    pub async fn report(
        &self,
        record: &mut DocumentRecord,
        stage: Stage,
        success: bool,
        duration_secs: Option<f64>,
    ) -> Result<(), PipelineError> {
        record.set_stage(stage, success, duration_secs);
        debug!(
            "{}: {}={} ({:?}s)",
            record.id(),
            stage,
            success,
            duration_secs
        );
        self.persist(record).await
    }

    /// Upsert the record as it stands.
    pub async fn persist(&self, record: &DocumentRecord) -> Result<(), PipelineError> {
        self.store.upsert(record).await.map_err(|e| {
            warn!("{}: upsert failed, state not durable: {}", record.id(), e);
            match e {
                e @ PipelineError::PersistenceFailure { .. } => e,
                other => PipelineError::PersistenceFailure {
                    id: record.id().to_string(),
                    message: other.to_string(),
                },
            }
        })
    }
}
