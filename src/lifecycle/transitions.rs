//! The record state machine as seen by the reconciler.
//!
//! `Active -> Deleted` happens only through [`BucketRecord::deleted`] (the
//! delete path); `Deleted -> Active` only through [`BucketRecord::restored`]
//! and [`BucketRecord::healed`] (the reconciler). None of the transitions
//! touch the version token; the store bumps it on a successful write.

use crate::models::bucket::{BucketRecord, BucketStatus, DeletionAudit};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    DeletedHealable,
    DeletedTerminal,
}

impl LifecycleState {
    pub fn of(record: &BucketRecord) -> Self {
        match (record.status, record.should_heal) {
            (BucketStatus::Active, _) => LifecycleState::Active,
            (BucketStatus::Deleted, true) => LifecycleState::DeletedHealable,
            (BucketStatus::Deleted, false) => LifecycleState::DeletedTerminal,
        }
    }

    /// Whether the reconciler should look at records in this state at all.
    pub fn in_working_set(&self) -> bool {
        !matches!(self, LifecycleState::DeletedTerminal)
    }
}

/// Result of probing the underlying container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Exists,
    Missing,
}

/// What the reconciler should do with one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepAction {
    /// Container is where it should be; only bump `last_checked_at`.
    Refresh,
    /// Container came back out-of-band; flip the record back to active.
    Restore,
    /// Container is gone but should exist; recreate it.
    Heal,
    Ignore,
}

/// The drift decision table.
pub fn plan(state: LifecycleState, presence: Presence) -> SweepAction {
    match (state, presence) {
        (LifecycleState::Active, Presence::Exists) => SweepAction::Refresh,
        (LifecycleState::DeletedHealable, Presence::Exists) => SweepAction::Restore,
        (LifecycleState::Active, Presence::Missing) => SweepAction::Heal,
        (LifecycleState::DeletedHealable, Presence::Missing) => SweepAction::Heal,
        (LifecycleState::DeletedTerminal, _) => SweepAction::Ignore,
    }
}

impl BucketRecord {
    pub fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::of(self)
    }

    /// Record a deletion. Replaces any earlier audit fields together with the
    /// new heal decision.
    pub fn deleted(&self, audit: DeletionAudit, should_heal: bool) -> Self {
        Self {
            status: BucketStatus::Deleted,
            deletion: Some(audit),
            should_heal,
            ..self.clone()
        }
    }

    pub fn checked(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_checked_at: Some(now),
            ..self.clone()
        }
    }

    /// The container reappeared without our help. Audit fields stay.
    pub fn restored(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: BucketStatus::Active,
            should_heal: false,
            last_checked_at: Some(now),
            ..self.clone()
        }
    }

    /// The container was recreated by the provisioner. Audit fields stay.
    pub fn healed(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: BucketStatus::Active,
            should_heal: false,
            last_checked_at: Some(now),
            healed_at: Some(now),
            heal_count: self.heal_count.saturating_add(1),
            ..self.clone()
        }
    }
}
