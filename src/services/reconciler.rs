//! src/services/reconciler.rs
//!
//! One reconciliation sweep: page through every record that needs attention,
//! probe its container, and drive it through the drift decision table in
//! [`crate::lifecycle::transitions`]. Records are handled independently; a
//! failure on one record is logged and counted, never propagated.
//!
//! All writes go through `conditional_update`, so a sweep racing another
//! sweep (or a delete) on the same record either wins cleanly or backs off.
//! A lost race is a no-op: no notification is sent and nothing is counted
//! twice.

use crate::{
    lifecycle::{Presence, SweepAction, plan},
    models::bucket::{BucketRecord, RecordKey},
    services::{
        metadata_store::{MetadataStore, StoreResult},
        notifier::{Notification, Notifier, notify},
        object_storage::{ObjectStorage, StorageError},
        provisioner::Provisioner,
    },
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Counters for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records loaded from the working set.
    pub processed_count: usize,
    /// Containers recreated and recorded as healed.
    pub healed_count: usize,
    /// Deleted records whose container reappeared out-of-band.
    pub restored_count: usize,
    /// Active records found in place.
    pub refreshed_count: usize,
    /// Recreation attempts that failed; retried next sweep.
    pub heal_failed_count: usize,
    /// Inconclusive probes; the record is left alone until next sweep.
    pub probe_error_count: usize,
    /// Updates that lost to a concurrent writer.
    pub lost_race_count: usize,
    /// Metadata writes that failed outright.
    pub store_error_count: usize,
}

/// What happened to a single record during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Refreshed,
    Restored,
    Healed,
    Ignored,
    HealFailed,
    ProbeFailed,
    LostRace,
    StoreFailed,
}

impl SweepReport {
    fn tally(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Refreshed => self.refreshed_count += 1,
            RecordOutcome::Restored => self.restored_count += 1,
            RecordOutcome::Healed => self.healed_count += 1,
            RecordOutcome::Ignored => {}
            RecordOutcome::HealFailed => self.heal_failed_count += 1,
            RecordOutcome::ProbeFailed => self.probe_error_count += 1,
            RecordOutcome::LostRace => self.lost_race_count += 1,
            RecordOutcome::StoreFailed => self.store_error_count += 1,
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStorage>,
    provisioner: Provisioner,
    notifier: Arc<dyn Notifier>,
    page_size: usize,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        provisioner: Provisioner,
        notifier: Arc<dyn Notifier>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            storage: provisioner.storage().clone(),
            provisioner,
            notifier,
            page_size: page_size.max(1),
        }
    }

    /// Run one full sweep over the working set.
    ///
    /// Fails only when a page of records cannot be loaded; every record
    /// already handled by then keeps its new state.
    pub async fn reconcile(&self) -> StoreResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut cursor: Option<RecordKey> = None;

        loop {
            let page = match self
                .store
                .scan_working_set(cursor.as_ref(), self.page_size)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    error!(error = %err, processed = report.processed_count, "failed to load working set page");
                    return Err(err);
                }
            };
            let page_len = page.len();
            cursor = page.last().map(BucketRecord::key);

            for record in page {
                report.processed_count += 1;
                let outcome = self.reconcile_record(&record).await;
                report.tally(outcome);
            }

            if page_len < self.page_size {
                break;
            }
        }

        info!(
            processed = report.processed_count,
            healed = report.healed_count,
            restored = report.restored_count,
            heal_failed = report.heal_failed_count,
            probe_errors = report.probe_error_count,
            "reconciliation sweep complete"
        );
        Ok(report)
    }

    async fn probe(&self, resource_name: &str) -> Result<Presence, StorageError> {
        match self.storage.head_bucket(resource_name).await {
            Ok(()) => Ok(Presence::Exists),
            Err(err) if err.is_not_found() => Ok(Presence::Missing),
            Err(err) => Err(err),
        }
    }

    async fn reconcile_record(&self, record: &BucketRecord) -> RecordOutcome {
        let presence = match self.probe(&record.resource_name).await {
            Ok(presence) => presence,
            Err(err) => {
                warn!(
                    resource_name = %record.resource_name,
                    error = %err,
                    "inconclusive existence check, leaving record for next sweep"
                );
                return RecordOutcome::ProbeFailed;
            }
        };

        let state = record.lifecycle_state();
        let action = plan(state, presence);
        debug!(
            resource_name = %record.resource_name,
            ?state,
            ?presence,
            ?action,
            "probed bucket"
        );

        match action {
            SweepAction::Ignore => RecordOutcome::Ignored,
            SweepAction::Refresh => {
                self.commit(record, record.checked(Utc::now()), RecordOutcome::Refreshed)
                    .await
            }
            SweepAction::Restore => {
                let outcome = self
                    .commit(record, record.restored(Utc::now()), RecordOutcome::Restored)
                    .await;
                if outcome == RecordOutcome::Restored {
                    info!(resource_name = %record.resource_name, "bucket reappeared, record restored to active");
                    notify(self.notifier.as_ref(), Notification::restored(record)).await;
                }
                outcome
            }
            SweepAction::Heal => self.heal(record).await,
        }
    }

    async fn heal(&self, record: &BucketRecord) -> RecordOutcome {
        let orphaned = record.deletion.is_none();
        info!(
            resource_name = %record.resource_name,
            owner_id = %record.owner_id,
            project = %record.display_name,
            orphaned,
            "bucket missing, initiating healing"
        );

        let outcome = match self
            .provisioner
            .provision(&record.resource_name, &record.region, &record.config)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(resource_name = %record.resource_name, error = %err, "failed to heal bucket");
                return RecordOutcome::HealFailed;
            }
        };
        for warning in &outcome.warnings {
            warn!(resource_name = %record.resource_name, "healed with warning: {}", warning);
        }

        let now = Utc::now();
        let result = self
            .commit(record, record.healed(now), RecordOutcome::Healed)
            .await;
        match result {
            RecordOutcome::Healed => {
                info!(resource_name = %record.resource_name, heal_count = record.heal_count + 1, "bucket healed");
                notify(self.notifier.as_ref(), Notification::healed(record, now)).await;
            }
            RecordOutcome::LostRace if outcome.created => self.withdraw(record).await,
            _ => {}
        }
        result
    }

    /// Undo a recreation whose record was deleted for good while the
    /// container was being provisioned.
    async fn withdraw(&self, record: &BucketRecord) {
        let current = match self.store.get(&record.key()).await {
            Ok(current) => current,
            Err(err) => {
                warn!(resource_name = %record.resource_name, error = %err, "could not re-read record after lost race");
                return;
            }
        };
        if current.is_some_and(|current| current.lifecycle_state().in_working_set()) {
            return;
        }
        match self.provisioner.remove(&record.resource_name).await {
            Ok(_) => info!(resource_name = %record.resource_name, "removed bucket recreated for a deleted record"),
            Err(err) => {
                warn!(resource_name = %record.resource_name, error = %err, "failed to remove recreated bucket")
            }
        }
    }

    /// Write `next` over `prior` and translate the result into an outcome.
    async fn commit(
        &self,
        prior: &BucketRecord,
        next: BucketRecord,
        success: RecordOutcome,
    ) -> RecordOutcome {
        match self.store.conditional_update(prior, &next).await {
            Ok(true) => success,
            Ok(false) => {
                debug!(
                    resource_name = %prior.resource_name,
                    "record changed during sweep, skipping"
                );
                RecordOutcome::LostRace
            }
            Err(err) => {
                error!(resource_name = %prior.resource_name, error = %err, "failed to update record");
                RecordOutcome::StoreFailed
            }
        }
    }
}
