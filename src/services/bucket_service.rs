//! src/services/bucket_service.rs
//!
//! The request-side operations: create, delete, list, get, and audit. Every
//! check (identity, validation, authorization, conflict) happens before the
//! first write, so a rejected request leaves nothing behind.

use crate::{
    errors::{BucketError, BucketResult},
    lifecycle::{decide_should_heal, is_authorized_to_delete},
    models::{
        actor::Actor,
        bucket::{BucketRecord, DeletionAudit, DesiredConfig, RecordKey},
        lifecycle_rules::LifecyclePolicy,
    },
    services::{
        authorization::{AdminTier, AuthorizationResolver},
        metadata_store::{MetadataStore, StoreError},
        notifier::{Notification, Notifier, notify},
        object_storage::ensure_bucket_name_safe,
        provisioner::{ConfigurationWarning, Provisioner},
    },
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const PROJECT_NAME_MIN_LEN: usize = 3;
const PROJECT_NAME_MAX_LEN: usize = 50;
const RESOURCE_NAME_MAX_LEN: usize = 63;
/// `-` plus eight hex characters.
const RESOURCE_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub record: BucketRecord,
    pub warnings: Vec<ConfigurationWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub record: BucketRecord,
    pub should_heal: bool,
}

/// Validate a requested project name and return it trimmed.
///
/// Uppercase letters are rejected rather than folded.
pub fn validate_project_name(raw: &str) -> BucketResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(BucketError::Validation("project_name is required".into()));
    }
    if !name
        .to_ascii_lowercase()
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(BucketError::Validation(
            "Project name must contain only lowercase letters, numbers, and hyphens".into(),
        ));
    }
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(BucketError::Validation(
            "Project name must contain only lowercase letters, numbers, and hyphens \
             (no uppercase letters allowed)"
                .into(),
        ));
    }
    if !(PROJECT_NAME_MIN_LEN..=PROJECT_NAME_MAX_LEN).contains(&name.len()) {
        return Err(BucketError::Validation(format!(
            "Project name must be between {PROJECT_NAME_MIN_LEN} and {PROJECT_NAME_MAX_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Longest project name whose resource name still fits in `environment`.
pub fn max_project_len(environment: &str) -> usize {
    RESOURCE_NAME_MAX_LEN
        .saturating_sub(environment.len() + 1 + RESOURCE_SUFFIX_LEN)
        .min(PROJECT_NAME_MAX_LEN)
}

/// `{environment}-{project}-{8 hex chars}`.
pub fn generate_resource_name(environment: &str, project: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{environment}-{project}-{}", &suffix[..8])
}

fn require_identity(actor: Option<&Actor>) -> BucketResult<&Actor> {
    match actor {
        Some(actor) if !actor.id.trim().is_empty() => Ok(actor),
        _ => Err(BucketError::Unauthenticated),
    }
}

pub struct BucketService {
    store: Arc<dyn MetadataStore>,
    provisioner: Provisioner,
    resolver: AuthorizationResolver,
    notifier: Arc<dyn Notifier>,
    environment: String,
    region: String,
}

impl BucketService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        provisioner: Provisioner,
        resolver: AuthorizationResolver,
        notifier: Arc<dyn Notifier>,
        environment: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provisioner,
            resolver,
            notifier,
            environment: environment.into(),
            region: region.into(),
        }
    }

    /// Provision a new container for `owner` and record it.
    pub async fn create(
        &self,
        owner: Option<&Actor>,
        project_name: &str,
        desired: DesiredConfig,
    ) -> BucketResult<CreateOutcome> {
        let owner = require_identity(owner)?;
        let project = validate_project_name(project_name)?;
        let max_len = max_project_len(&self.environment);
        if project.len() > max_len {
            return Err(BucketError::Validation(format!(
                "Project name must be between {PROJECT_NAME_MIN_LEN} and {max_len} characters"
            )));
        }

        if desired.lifecycle_policy == LifecyclePolicy::Custom
            && desired.custom_lifecycle_rules.is_none()
        {
            return Err(BucketError::Validation(
                "Custom lifecycle policy requires custom_lifecycle_config field".into(),
            ));
        }

        let key = RecordKey::new(&owner.id, &project);
        match self.store.get(&key).await {
            Ok(Some(_)) => {
                return Err(BucketError::Conflict(
                    "Project already exists for this user".into(),
                ));
            }
            Ok(None) => {}
            // The insert below is the real uniqueness guard.
            Err(err) => warn!(%key, error = %err, "existence pre-check failed, continuing"),
        }

        let resource_name = generate_resource_name(&self.environment, &project);
        ensure_bucket_name_safe(&resource_name)
            .map_err(|err| BucketError::Validation(err.to_string()))?;

        let outcome = self
            .provisioner
            .provision(&resource_name, &self.region, &desired)
            .await
            .map_err(|err| {
                error!(%resource_name, error = %err, "failed to create bucket");
                BucketError::Provisioning(err.to_string())
            })?;

        let record = BucketRecord::new(
            &owner.id,
            owner.email.clone().unwrap_or_default(),
            &project,
            &resource_name,
            &self.region,
            desired,
            Utc::now(),
        );

        if let Err(err) = self.store.insert(&record).await {
            error!(%resource_name, error = %err, "failed to record bucket, cleaning up");
            if let Err(cleanup) = self.provisioner.remove(&resource_name).await {
                error!(%resource_name, error = %cleanup, "cleanup failed, bucket is untracked");
            }
            return Err(match err {
                StoreError::AlreadyExists(_) => {
                    BucketError::Conflict("Project already exists for this user".into())
                }
                other => BucketError::Store(other),
            });
        }

        info!(
            %resource_name,
            owner_id = %record.owner_id,
            project = %record.display_name,
            warnings = outcome.warnings.len(),
            "bucket provisioned"
        );
        notify(self.notifier.as_ref(), Notification::created(&record)).await;

        Ok(CreateOutcome {
            record,
            warnings: outcome.warnings,
        })
    }

    /// Soft-delete a project and remove its container.
    ///
    /// The record is marked deleted before the container goes away, so a
    /// concurrent sweep never mistakes an owner's deletion for an orphan.
    pub async fn delete(
        &self,
        actor: Option<&Actor>,
        project_name: &str,
        owner_hint: Option<&str>,
    ) -> BucketResult<DeleteOutcome> {
        let actor = require_identity(actor)?;
        let project = project_name.trim();
        if project.is_empty() {
            return Err(BucketError::Validation(
                "project_name query parameter is required".into(),
            ));
        }

        let record = self
            .locate(actor, project, owner_hint)
            .await?
            .ok_or_else(|| BucketError::NotFound("Bucket not found".into()))?;

        let role = self.resolver.resolve(actor, &record.owner_id).await;
        let is_owner = record.is_owned_by(&actor.id);
        if !is_authorized_to_delete(role, is_owner) {
            warn!(actor = %actor.id, owner_id = %record.owner_id, project, "delete denied");
            return Err(BucketError::Forbidden(
                "You can only delete your own buckets".into(),
            ));
        }
        let should_heal = decide_should_heal(role, is_owner);

        let audit = DeletionAudit {
            deleted_at: Utc::now(),
            deleted_by: actor.id.clone(),
            deleted_by_email: actor.email.clone(),
            deleted_by_role: role,
        };
        let next = record.deleted(audit, should_heal);
        if !self.store.conditional_update(&record, &next).await? {
            return Err(BucketError::Conflict(
                "Bucket was modified concurrently, retry the request".into(),
            ));
        }
        let mut applied = next;
        applied.version += 1;

        if let Err(err) = self.provisioner.remove(&record.resource_name).await {
            error!(resource_name = %record.resource_name, error = %err, "failed to delete bucket");
            match self.store.conditional_update(&applied, &record).await {
                Ok(true) => info!(resource_name = %record.resource_name, "deletion reverted"),
                Ok(false) => warn!(resource_name = %record.resource_name, "record moved on, not reverting"),
                Err(revert) => {
                    error!(resource_name = %record.resource_name, error = %revert, "failed to revert deletion")
                }
            }
            return Err(BucketError::Provisioning(format!(
                "Failed to delete bucket: {err}"
            )));
        }

        info!(
            resource_name = %record.resource_name,
            owner_id = %record.owner_id,
            project,
            deleted_by = %actor.id,
            role = %role,
            should_heal,
            "bucket deleted"
        );
        notify(
            self.notifier.as_ref(),
            Notification::deleted(&record, actor, should_heal),
        )
        .await;

        Ok(DeleteOutcome {
            record: applied,
            should_heal,
        })
    }

    /// Owners see their own records, admins see every record.
    pub async fn list(&self, actor: Option<&Actor>) -> BucketResult<Vec<BucketRecord>> {
        let actor = require_identity(actor)?;
        let records = match self.resolver.admin_tier(actor).await {
            Some(_) => self.store.list_all().await?,
            None => self.store.list_by_owner(&actor.id).await?,
        };
        Ok(records)
    }

    pub async fn get(
        &self,
        actor: Option<&Actor>,
        project_name: &str,
        owner_hint: Option<&str>,
    ) -> BucketResult<BucketRecord> {
        let actor = require_identity(actor)?;
        let not_found = || BucketError::NotFound("Project not found".into());

        let record = self
            .locate(actor, project_name.trim(), owner_hint)
            .await?
            .ok_or_else(not_found)?;
        if record.is_owned_by(&actor.id) || self.resolver.admin_tier(actor).await.is_some() {
            Ok(record)
        } else {
            Err(not_found())
        }
    }

    /// Deletion and heal history. `resource_name` narrows it to the record
    /// behind one bucket, `project` to every owner's record of that name.
    pub async fn audit(
        &self,
        resource_name: Option<&str>,
        project: Option<&str>,
    ) -> BucketResult<Vec<BucketRecord>> {
        match (resource_name, project) {
            (Some(name), _) => self
                .store
                .find_by_resource_name(name)
                .await?
                .map(|record| vec![record])
                .ok_or_else(|| BucketError::NotFound(format!("No record for bucket `{name}`"))),
            (None, Some(project)) => {
                let records = self.store.find_by_display_name(project).await?;
                if records.is_empty() {
                    return Err(BucketError::NotFound(format!(
                        "No record for project `{project}`"
                    )));
                }
                Ok(records)
            }
            (None, None) => Ok(self.store.deletion_history().await?),
        }
    }

    /// Fails unless `actor` holds an admin tier.
    pub async fn require_admin(&self, actor: Option<&Actor>) -> BucketResult<AdminTier> {
        let actor = require_identity(actor)?;
        self.resolver
            .admin_tier(actor)
            .await
            .ok_or_else(|| BucketError::Forbidden("admin access required".into()))
    }

    /// Find the record an actor means by `project`.
    ///
    /// An explicit owner wins. Otherwise the actor's own record is tried
    /// first, and admins fall back to a lookup by display name across owners.
    async fn locate(
        &self,
        actor: &Actor,
        project: &str,
        owner_hint: Option<&str>,
    ) -> BucketResult<Option<BucketRecord>> {
        if let Some(owner_id) = owner_hint.filter(|owner| !owner.trim().is_empty()) {
            return Ok(self.store.get(&RecordKey::new(owner_id.trim(), project)).await?);
        }

        if let Some(record) = self.store.get(&RecordKey::new(&actor.id, project)).await? {
            return Ok(Some(record));
        }

        if self.resolver.admin_tier(actor).await.is_none() {
            return Ok(None);
        }

        let mut matches = self.store.find_by_display_name(project).await?;
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            n => Err(BucketError::Validation(format!(
                "Project `{project}` exists for {n} owners, specify owner_id"
            ))),
        }
    }
}
