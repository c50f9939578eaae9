//! Creates (or re-creates) a container and reapplies its configuration.
//!
//! Only container creation is fatal. Each configuration step is attempted
//! independently; a failing step becomes a [`ConfigurationWarning`] on the
//! outcome instead of an error.

use crate::{
    models::{bucket::DesiredConfig, lifecycle_rules::expand_policy},
    services::object_storage::{
        CreateBucketOutcome, EncryptionConfiguration, ObjectStorage, PublicAccessBlock,
        StorageError, VersioningStatus,
    },
};
use serde::Serialize;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStep {
    PublicAccessBlock,
    Encryption,
    Versioning,
    Lifecycle,
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigStep::PublicAccessBlock => "public access block",
            ConfigStep::Encryption => "encryption",
            ConfigStep::Versioning => "versioning",
            ConfigStep::Lifecycle => "lifecycle policy",
        })
    }
}

/// A configuration step that did not apply. Never blocks the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationWarning {
    pub step: ConfigStep,
    pub message: String,
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to configure {}: {}", self.step, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// `false` when the container already existed and was reused.
    pub created: bool,
    pub warnings: Vec<ConfigurationWarning>,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to create bucket `{name}`: {source}")]
    Create {
        name: String,
        #[source]
        source: StorageError,
    },
}

#[derive(Clone)]
pub struct Provisioner {
    storage: Arc<dyn ObjectStorage>,
}

impl Provisioner {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Make sure `resource_name` exists with `desired` applied.
    ///
    /// Idempotent: an existing container owned by this system is reused and
    /// simply reconfigured, which leaves it in the same end state.
    pub async fn provision(
        &self,
        resource_name: &str,
        region: &str,
        desired: &DesiredConfig,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let created = match self.storage.create_bucket(resource_name, region).await {
            Ok(CreateBucketOutcome::Created) => {
                info!(resource_name, region, "bucket created");
                true
            }
            Ok(CreateBucketOutcome::AlreadyOwned) => {
                info!(resource_name, "bucket already exists, reapplying configuration");
                false
            }
            Err(source) => {
                return Err(ProvisionError::Create {
                    name: resource_name.to_string(),
                    source,
                });
            }
        };

        let mut warnings = Vec::new();
        let mut record = |step: ConfigStep, result: Result<(), String>| match result {
            Ok(()) => debug!(resource_name, %step, "configured"),
            Err(message) => {
                let warning = ConfigurationWarning { step, message };
                warn!(resource_name, "{}", warning);
                warnings.push(warning);
            }
        };

        record(
            ConfigStep::PublicAccessBlock,
            self.storage
                .put_public_access_block(resource_name, &PublicAccessBlock::all_blocked())
                .await
                .map_err(|err| err.to_string()),
        );

        record(
            ConfigStep::Encryption,
            self.storage
                .put_bucket_encryption(resource_name, &EncryptionConfiguration::default())
                .await
                .map_err(|err| err.to_string()),
        );

        if desired.versioning_enabled {
            record(
                ConfigStep::Versioning,
                self.storage
                    .put_bucket_versioning(resource_name, VersioningStatus::Enabled)
                    .await
                    .map_err(|err| err.to_string()),
            );
        }

        match expand_policy(
            desired.lifecycle_policy,
            desired.custom_lifecycle_rules.as_ref(),
        ) {
            Ok(Some(expanded)) => {
                record(
                    ConfigStep::Lifecycle,
                    self.storage
                        .put_bucket_lifecycle(resource_name, &expanded.configuration)
                        .await
                        .map_err(|err| err.to_string()),
                );
                if !expanded.rejected.is_empty() {
                    record(
                        ConfigStep::Lifecycle,
                        Err(format!(
                            "skipped malformed rules: {}",
                            expanded.rejected.join("; ")
                        )),
                    );
                }
            }
            Ok(None) => {}
            Err(message) => record(ConfigStep::Lifecycle, Err(message)),
        }

        Ok(ProvisionOutcome { created, warnings })
    }

    /// Delete the container and everything in it.
    ///
    /// Returns `false` if it was already gone.
    pub async fn remove(&self, resource_name: &str) -> Result<bool, StorageError> {
        match self.storage.delete_bucket(resource_name).await {
            Ok(()) => {
                info!(resource_name, "bucket deleted");
                Ok(true)
            }
            Err(err) if err.is_not_found() => {
                info!(resource_name, "bucket already deleted");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::lifecycle_rules::{LifecycleConfiguration, LifecyclePolicy},
        testing::{FaultyStep, InMemoryObjectStorage},
    };

    fn provisioner(storage: &Arc<InMemoryObjectStorage>) -> Provisioner {
        Provisioner::new(storage.clone())
    }

    #[tokio::test]
    async fn provisions_and_applies_every_step() {
        let storage = Arc::new(InMemoryObjectStorage::default());
        let desired = DesiredConfig {
            versioning_enabled: true,
            lifecycle_policy: LifecyclePolicy::AutoArchive,
            custom_lifecycle_rules: None,
        };

        let outcome = provisioner(&storage)
            .provision("dev-alpha-1", "us-east-1", &desired)
            .await
            .unwrap();
        assert!(outcome.created);
        assert!(outcome.warnings.is_empty());

        let config = storage.bucket_configuration("dev-alpha-1").await.unwrap();
        assert_eq!(config.public_access_block, Some(PublicAccessBlock::all_blocked()));
        assert_eq!(config.encryption, Some(EncryptionConfiguration::default()));
        assert_eq!(config.versioning, Some(VersioningStatus::Enabled));
        assert_eq!(config.lifecycle, Some(LifecycleConfiguration::auto_archive()));
    }

    #[tokio::test]
    async fn provisioning_twice_converges_on_the_same_configuration() {
        let storage = Arc::new(InMemoryObjectStorage::default());
        let desired = DesiredConfig {
            lifecycle_policy: LifecyclePolicy::AutoDelete,
            ..DesiredConfig::default()
        };
        let provisioner = provisioner(&storage);

        let first = provisioner
            .provision("dev-alpha-1", "us-east-1", &desired)
            .await
            .unwrap();
        let after_first = storage.bucket_configuration("dev-alpha-1").await.unwrap();
        let second = provisioner
            .provision("dev-alpha-1", "us-east-1", &desired)
            .await
            .unwrap();
        let after_second = storage.bucket_configuration("dev-alpha-1").await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert!(second.warnings.is_empty());
        assert_eq!(after_first, after_second);
        assert_eq!(after_second.lifecycle.unwrap().rules.len(), 1);
    }

    #[tokio::test]
    async fn configuration_failures_become_warnings() {
        let storage = Arc::new(InMemoryObjectStorage::default());
        storage.fail_step(FaultyStep::Encryption);

        let outcome = provisioner(&storage)
            .provision("dev-alpha-1", "us-east-1", &DesiredConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].step, ConfigStep::Encryption);
        assert!(storage.exists("dev-alpha-1"));
    }

    #[tokio::test]
    async fn malformed_custom_rules_are_a_warning_not_an_error() {
        let storage = Arc::new(InMemoryObjectStorage::default());
        let desired = DesiredConfig {
            lifecycle_policy: LifecyclePolicy::Custom,
            custom_lifecycle_rules: Some(LifecycleConfiguration::default()),
            ..DesiredConfig::default()
        };

        let outcome = provisioner(&storage)
            .provision("dev-alpha-1", "us-east-1", &desired)
            .await
            .unwrap();
        assert_eq!(outcome.warnings[0].step, ConfigStep::Lifecycle);
        assert_eq!(
            storage.bucket_configuration("dev-alpha-1").await.unwrap().lifecycle,
            None
        );
    }

    #[tokio::test]
    async fn partially_malformed_custom_rules_apply_the_good_ones() {
        let storage = Arc::new(InMemoryObjectStorage::default());
        let rules: LifecycleConfiguration = serde_json::from_str(
            r#"{"Rules":[
                {"ID":"good","Status":"Enabled","Expiration":{"Days":7}},
                {"ID":"bad","Status":"Enabled"}
            ]}"#,
        )
        .unwrap();
        let desired = DesiredConfig {
            lifecycle_policy: LifecyclePolicy::Custom,
            custom_lifecycle_rules: Some(rules),
            ..DesiredConfig::default()
        };

        let outcome = provisioner(&storage)
            .provision("dev-alpha-1", "us-east-1", &desired)
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].step, ConfigStep::Lifecycle);
        assert!(outcome.warnings[0].message.contains("`bad`"));

        let applied = storage.bucket_configuration("dev-alpha-1").await.unwrap().lifecycle.unwrap();
        assert_eq!(applied.rules.len(), 1);
        assert_eq!(applied.rules[0].id, "good");
    }

    #[tokio::test]
    async fn creation_failure_is_fatal() {
        let storage = Arc::new(InMemoryObjectStorage::default());
        storage.fail_step(FaultyStep::Create);

        let err = provisioner(&storage)
            .provision("dev-alpha-1", "us-east-1", &DesiredConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Create { .. }));
        assert!(!storage.exists("dev-alpha-1"));
    }

    #[tokio::test]
    async fn removing_a_missing_bucket_is_not_an_error() {
        let storage = Arc::new(InMemoryObjectStorage::default());
        assert!(!provisioner(&storage).remove("dev-alpha-1").await.unwrap());
    }
}
