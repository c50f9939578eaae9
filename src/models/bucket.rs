//! Represents a provisioned bucket record: the durable intent behind one
//! underlying storage container.

use crate::models::{
    actor::Role,
    lifecycle_rules::{LifecycleConfiguration, LifecyclePolicy},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Whether a record is meant to have a live container behind it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BucketStatus {
    Active,
    Deleted,
}

impl BucketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketStatus::Active => "active",
            BucketStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(BucketStatus::Active),
            "deleted" => Ok(BucketStatus::Deleted),
            other => Err(format!("unknown bucket status `{other}`")),
        }
    }
}

/// Primary key of a record: one project name per owner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub owner_id: String,
    pub display_name: String,
}

impl RecordKey {
    pub fn new(owner_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner_id, self.display_name)
    }
}

/// Configuration reapplied verbatim on every (re)creation of the container.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DesiredConfig {
    pub versioning_enabled: bool,
    pub lifecycle_policy: LifecyclePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_lifecycle_rules: Option<LifecycleConfiguration>,
}

impl Default for DesiredConfig {
    fn default() -> Self {
        Self {
            versioning_enabled: true,
            lifecycle_policy: LifecyclePolicy::None,
            custom_lifecycle_rules: None,
        }
    }
}

/// Who deleted a record, when, and in which capacity.
///
/// The fields only ever change together: a fresh deletion replaces the whole
/// value, healing leaves it untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeletionAudit {
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by_email: Option<String>,
    pub deleted_by_role: Role,
}

/// One record per (owner, project).
///
/// Container existence is not stored here; it is re-derived by probing the
/// object storage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BucketRecord {
    pub owner_id: String,
    pub owner_email: String,

    /// User-facing project name.
    pub display_name: String,

    /// Globally unique name of the underlying container.
    pub resource_name: String,

    /// Region the container is created in.
    pub region: String,

    pub status: BucketStatus,

    #[serde(flatten)]
    pub config: DesiredConfig,

    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub deletion: Option<DeletionAudit>,

    /// Only meaningful while `status` is `Deleted`.
    pub should_heal: bool,

    pub healed_at: Option<DateTime<Utc>>,
    pub heal_count: u32,

    /// Optimistic-concurrency token; bumped by the store on every mutation.
    #[serde(skip)]
    pub version: i64,
}

impl BucketRecord {
    /// A freshly provisioned, active record.
    pub fn new(
        owner_id: impl Into<String>,
        owner_email: impl Into<String>,
        display_name: impl Into<String>,
        resource_name: impl Into<String>,
        region: impl Into<String>,
        config: DesiredConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_email: owner_email.into(),
            display_name: display_name.into(),
            resource_name: resource_name.into(),
            region: region.into(),
            status: BucketStatus::Active,
            config,
            created_at: now,
            last_checked_at: Some(now),
            deletion: None,
            should_heal: false,
            healed_at: None,
            heal_count: 0,
            version: 0,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.owner_id, &self.display_name)
    }

    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        self.owner_id == actor_id
    }
}
