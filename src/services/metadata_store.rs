//! src/services/metadata_store.rs
//!
//! Durable record store. The SQLite implementation keeps one row per
//! (owner_id, display_name) and guards every mutation with an optimistic
//! version check, so two writers racing on the same record never both win.

use crate::models::{
    actor::Role,
    bucket::{BucketRecord, BucketStatus, DeletionAudit, DesiredConfig, RecordKey},
    lifecycle_rules::{LifecycleConfiguration, LifecyclePolicy},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record `{0}` already exists")]
    AlreadyExists(String),
    #[error("stored value for `{field}` is invalid: {reason}")]
    Corrupt { field: &'static str, reason: String },
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<BucketRecord>>;

    /// Insert a brand new record. Fails with `AlreadyExists` if the key is taken.
    async fn insert(&self, record: &BucketRecord) -> StoreResult<()>;

    /// Atomically replace the mutable fields of `prior` with those of `next`,
    /// provided the stored row still has `prior`'s version and status.
    ///
    /// Returns `false` when another writer got there first.
    async fn conditional_update(&self, prior: &BucketRecord, next: &BucketRecord)
    -> StoreResult<bool>;

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<BucketRecord>>;

    async fn list_all(&self) -> StoreResult<Vec<BucketRecord>>;

    async fn find_by_display_name(&self, display_name: &str) -> StoreResult<Vec<BucketRecord>>;

    async fn find_by_resource_name(&self, resource_name: &str)
    -> StoreResult<Option<BucketRecord>>;

    /// One page of records the reconciler must look at: every active record and
    /// every deleted record still flagged for healing, ordered by key.
    async fn scan_working_set(
        &self,
        after: Option<&RecordKey>,
        limit: usize,
    ) -> StoreResult<Vec<BucketRecord>>;

    /// Records carrying deletion or heal history, most recently deleted first.
    async fn deletion_history(&self) -> StoreResult<Vec<BucketRecord>>;
}

/// Metadata store backed by SQLite via sqlx.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

const SELECT_COLUMNS: &str = "SELECT owner_id, display_name, owner_email, resource_name, region, \
     status, versioning_enabled, lifecycle_policy, custom_lifecycle_rules, created_at, \
     last_checked_at, deleted_at, deleted_by, deleted_by_email, deleted_by_role, \
     CAST(should_heal AS TEXT) AS should_heal_raw, healed_at, heal_count, version \
     FROM bucket_records";

/// Raw row shape. Converting it into a [`BucketRecord`] is the only place
/// that knows about storage encodings.
#[derive(FromRow, Debug)]
struct BucketRow {
    owner_id: String,
    display_name: String,
    owner_email: String,
    resource_name: String,
    region: String,
    status: String,
    versioning_enabled: bool,
    lifecycle_policy: String,
    custom_lifecycle_rules: Option<String>,
    created_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
    deleted_by_email: Option<String>,
    deleted_by_role: Option<String>,
    should_heal_raw: Option<String>,
    healed_at: Option<DateTime<Utc>>,
    heal_count: i64,
    version: i64,
}

impl TryFrom<BucketRow> for BucketRecord {
    type Error = StoreError;

    fn try_from(row: BucketRow) -> Result<Self, Self::Error> {
        let status: BucketStatus = row.status.parse().map_err(|reason| StoreError::Corrupt {
            field: "status",
            reason,
        })?;

        let custom_lifecycle_rules = row
            .custom_lifecycle_rules
            .as_deref()
            .map(serde_json::from_str::<LifecycleConfiguration>)
            .transpose()
            .map_err(|err| StoreError::Corrupt {
                field: "custom_lifecycle_rules",
                reason: err.to_string(),
            })?;

        let deletion = match (row.deleted_at, row.deleted_by) {
            (Some(deleted_at), Some(deleted_by)) => Some(DeletionAudit {
                deleted_at,
                deleted_by,
                deleted_by_email: row.deleted_by_email,
                deleted_by_role: decode_role(row.deleted_by_role.as_deref())?,
            }),
            _ => None,
        };

        let heal_count = u32::try_from(row.heal_count).map_err(|_| StoreError::Corrupt {
            field: "heal_count",
            reason: format!("{} is out of range", row.heal_count),
        })?;

        Ok(BucketRecord {
            should_heal: decode_should_heal(row.should_heal_raw.as_deref(), status)?,
            owner_id: row.owner_id,
            owner_email: row.owner_email,
            display_name: row.display_name,
            resource_name: row.resource_name,
            region: row.region,
            status,
            config: DesiredConfig {
                versioning_enabled: row.versioning_enabled,
                lifecycle_policy: LifecyclePolicy::parse_lenient(&row.lifecycle_policy),
                custom_lifecycle_rules,
            },
            created_at: row.created_at,
            last_checked_at: row.last_checked_at,
            deletion,
            healed_at: row.healed_at,
            heal_count,
            version: row.version,
        })
    }
}

/// Decode the heal flag, tolerating legacy encodings.
///
/// Older rows may carry the flag as text ("true", "False", "yes") or not at
/// all. A missing flag on a deleted row means "heal", matching how those rows
/// were treated when they were written. Active rows never carry the flag.
fn decode_should_heal(raw: Option<&str>, status: BucketStatus) -> StoreResult<bool> {
    if status == BucketStatus::Active {
        return Ok(false);
    }
    let Some(raw) = raw else {
        return Ok(true);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "" => Ok(false),
        other => match other.parse::<f64>() {
            Ok(number) => Ok(number != 0.0),
            Err(_) => Err(StoreError::Corrupt {
                field: "should_heal",
                reason: format!("unrecognised flag value `{raw}`"),
            }),
        },
    }
}

fn decode_role(raw: Option<&str>) -> StoreResult<Role> {
    match raw {
        // Rows written before roles were recorded.
        None => Ok(Role::Anonymous),
        Some(value) => value.parse().map_err(|reason| StoreError::Corrupt {
            field: "deleted_by_role",
            reason,
        }),
    }
}

fn encode_custom_rules(config: &DesiredConfig) -> StoreResult<Option<String>> {
    config
        .custom_lifecycle_rules
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| StoreError::Corrupt {
            field: "custom_lifecycle_rules",
            reason: err.to_string(),
        })
}

fn into_records(rows: Vec<BucketRow>) -> StoreResult<Vec<BucketRecord>> {
    rows.into_iter().map(BucketRecord::try_from).collect()
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Rewrite legacy heal-flag encodings into canonical 0/1 integers.
    ///
    /// Only values [`decode_should_heal`] understands are touched; anything
    /// else is left for an operator to look at.
    pub async fn normalize_legacy_flags(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bucket_records SET should_heal = CASE
                WHEN status = 'active' THEN 0
                WHEN should_heal IS NULL THEN 1
                WHEN lower(trim(CAST(should_heal AS TEXT))) IN ('1', 'true', 't', 'yes', 'y') THEN 1
                ELSE 0
            END
            WHERE (status = 'active' AND should_heal IS NOT 0)
               OR (status = 'deleted' AND (
                    should_heal IS NULL
                    OR (typeof(should_heal) = 'text' AND lower(trim(should_heal)) IN
                        ('1', 'true', 't', 'yes', 'y', '0', 'false', 'f', 'no', 'n', ''))))
            "#,
        )
        .execute(&*self.db)
        .await?;

        let rewritten = result.rows_affected();
        if rewritten > 0 {
            info!(rewritten, "normalized legacy should_heal values");
        }
        Ok(rewritten)
    }

    async fn fetch_where(&self, clause: &str, value: &str) -> StoreResult<Vec<BucketRecord>> {
        let rows = sqlx::query_as::<_, BucketRow>(&format!("{SELECT_COLUMNS} {clause}"))
            .bind(value)
            .fetch_all(&*self.db)
            .await?;
        into_records(rows)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<BucketRecord>> {
        let row = sqlx::query_as::<_, BucketRow>(&format!(
            "{SELECT_COLUMNS} WHERE owner_id = ? AND display_name = ?"
        ))
        .bind(&key.owner_id)
        .bind(&key.display_name)
        .fetch_optional(&*self.db)
        .await?;

        row.map(BucketRecord::try_from).transpose()
    }

    async fn insert(&self, record: &BucketRecord) -> StoreResult<()> {
        let deletion = record.deletion.as_ref();
        let result = sqlx::query(
            r#"
            INSERT INTO bucket_records (
                owner_id, display_name, owner_email, resource_name, region, status,
                versioning_enabled, lifecycle_policy, custom_lifecycle_rules, created_at,
                last_checked_at, deleted_at, deleted_by, deleted_by_email, deleted_by_role,
                should_heal, healed_at, heal_count, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&record.owner_id)
        .bind(&record.display_name)
        .bind(&record.owner_email)
        .bind(&record.resource_name)
        .bind(&record.region)
        .bind(record.status.as_str())
        .bind(record.config.versioning_enabled)
        .bind(record.config.lifecycle_policy.as_str())
        .bind(encode_custom_rules(&record.config)?)
        .bind(record.created_at)
        .bind(record.last_checked_at)
        .bind(deletion.map(|d| d.deleted_at))
        .bind(deletion.map(|d| d.deleted_by.clone()))
        .bind(deletion.and_then(|d| d.deleted_by_email.clone()))
        .bind(deletion.map(|d| d.deleted_by_role.as_str()))
        .bind(record.status == BucketStatus::Deleted && record.should_heal)
        .bind(record.healed_at)
        .bind(i64::from(record.heal_count))
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => {
                debug!(key = %record.key(), resource_name = %record.resource_name, "inserted record");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::AlreadyExists(record.key().to_string()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    async fn conditional_update(
        &self,
        prior: &BucketRecord,
        next: &BucketRecord,
    ) -> StoreResult<bool> {
        let deletion = next.deletion.as_ref();
        let result = sqlx::query(
            r#"
            UPDATE bucket_records SET
                status = ?,
                last_checked_at = ?,
                deleted_at = ?,
                deleted_by = ?,
                deleted_by_email = ?,
                deleted_by_role = ?,
                should_heal = ?,
                healed_at = ?,
                heal_count = ?,
                version = version + 1
            WHERE owner_id = ? AND display_name = ? AND version = ? AND status = ?
            "#,
        )
        .bind(next.status.as_str())
        .bind(next.last_checked_at)
        .bind(deletion.map(|d| d.deleted_at))
        .bind(deletion.map(|d| d.deleted_by.clone()))
        .bind(deletion.and_then(|d| d.deleted_by_email.clone()))
        .bind(deletion.map(|d| d.deleted_by_role.as_str()))
        .bind(next.status == BucketStatus::Deleted && next.should_heal)
        .bind(next.healed_at)
        .bind(i64::from(next.heal_count))
        .bind(&prior.owner_id)
        .bind(&prior.display_name)
        .bind(prior.version)
        .bind(prior.status.as_str())
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<BucketRecord>> {
        self.fetch_where("WHERE owner_id = ? ORDER BY display_name ASC", owner_id)
            .await
    }

    async fn list_all(&self) -> StoreResult<Vec<BucketRecord>> {
        let rows = sqlx::query_as::<_, BucketRow>(&format!(
            "{SELECT_COLUMNS} ORDER BY owner_id ASC, display_name ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        into_records(rows)
    }

    async fn find_by_display_name(&self, display_name: &str) -> StoreResult<Vec<BucketRecord>> {
        self.fetch_where(
            "WHERE display_name = ? ORDER BY owner_id ASC",
            display_name,
        )
        .await
    }

    async fn find_by_resource_name(
        &self,
        resource_name: &str,
    ) -> StoreResult<Option<BucketRecord>> {
        Ok(self
            .fetch_where("WHERE resource_name = ?", resource_name)
            .await?
            .into_iter()
            .next())
    }

    async fn scan_working_set(
        &self,
        after: Option<&RecordKey>,
        limit: usize,
    ) -> StoreResult<Vec<BucketRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(
            " WHERE (status = 'active' \
             OR (status = 'deleted' AND (should_heal IS NULL OR should_heal = 1)))",
        );

        if let Some(key) = after {
            builder.push(" AND (owner_id > ");
            builder.push_bind(key.owner_id.clone());
            builder.push(" OR (owner_id = ");
            builder.push_bind(key.owner_id.clone());
            builder.push(" AND display_name > ");
            builder.push_bind(key.display_name.clone());
            builder.push("))");
        }

        builder.push(" ORDER BY owner_id ASC, display_name ASC LIMIT ");
        builder.push_bind(limit.max(1) as i64);

        let rows: Vec<BucketRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        into_records(rows)
    }

    async fn deletion_history(&self) -> StoreResult<Vec<BucketRecord>> {
        let rows = sqlx::query_as::<_, BucketRow>(&format!(
            "{SELECT_COLUMNS} WHERE deleted_at IS NOT NULL OR healed_at IS NOT NULL \
             ORDER BY deleted_at DESC, owner_id ASC, display_name ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        into_records(rows)
    }
}
