//! Shared in-memory fakes for unit tests.
//!
//! Every collaborator the engine talks to has a fake here, each with a small
//! amount of failure injection.

use crate::{
    db,
    models::{
        actor::Actor,
        bucket::{BucketRecord, RecordKey},
        lifecycle_rules::LifecycleConfiguration,
    },
    services::{
        group_directory::{DirectoryError, GroupDirectory},
        metadata_store::{MetadataStore, SqliteMetadataStore, StoreError, StoreResult},
        notifier::{Notification, Notifier, NotifyError},
        object_storage::{
            BucketConfiguration, CreateBucketOutcome, EncryptionConfiguration, ObjectStorage,
            PublicAccessBlock, StorageError, StorageResult, VersioningStatus,
        },
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    io,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// Operations of [`InMemoryObjectStorage`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultyStep {
    Head,
    Create,
    Delete,
    PublicAccessBlock,
    Encryption,
    Versioning,
    Lifecycle,
}

#[derive(Default)]
pub struct InMemoryObjectStorage {
    buckets: Mutex<HashMap<String, BucketConfiguration>>,
    faults: Mutex<HashSet<FaultyStep>>,
    creates: AtomicUsize,
}

impl InMemoryObjectStorage {
    pub fn fail_step(&self, step: FaultyStep) {
        self.faults.lock().unwrap().insert(step);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.buckets.lock().unwrap().contains_key(name)
    }

    /// Simulate a container vanishing behind the system's back.
    pub fn remove_externally(&self, name: &str) {
        self.buckets.lock().unwrap().remove(name);
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.lock().unwrap().keys().cloned().collect()
    }

    /// Number of create calls that actually created a container.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn check(&self, step: FaultyStep) -> StorageResult<()> {
        if self.faults.lock().unwrap().contains(&step) {
            Err(StorageError::Io(io::Error::other(format!(
                "injected failure in {step:?}"
            ))))
        } else {
            Ok(())
        }
    }

    fn update(
        &self,
        name: &str,
        step: FaultyStep,
        apply: impl FnOnce(&mut BucketConfiguration),
    ) -> StorageResult<()> {
        self.check(step)?;
        let mut buckets = self.buckets.lock().unwrap();
        let config = buckets
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        apply(config);
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn head_bucket(&self, name: &str) -> StorageResult<()> {
        if self.faults.lock().unwrap().contains(&FaultyStep::Head) {
            return Err(StorageError::AccessDenied(name.to_string()));
        }
        if self.exists(name) {
            Ok(())
        } else {
            Err(StorageError::NotFound(name.to_string()))
        }
    }

    async fn create_bucket(&self, name: &str, region: &str) -> StorageResult<CreateBucketOutcome> {
        self.check(FaultyStep::Create)?;
        let mut buckets = self.buckets.lock().unwrap();
        if buckets.contains_key(name) {
            return Ok(CreateBucketOutcome::AlreadyOwned);
        }
        buckets.insert(
            name.to_string(),
            BucketConfiguration {
                owner_tag: "test".into(),
                region: region.to_string(),
                created_at: Utc::now(),
                public_access_block: None,
                encryption: None,
                versioning: None,
                lifecycle: None,
            },
        );
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(CreateBucketOutcome::Created)
    }

    async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        self.check(FaultyStep::Delete)?;
        self.buckets
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn put_public_access_block(
        &self,
        name: &str,
        block: &PublicAccessBlock,
    ) -> StorageResult<()> {
        self.update(name, FaultyStep::PublicAccessBlock, |c| {
            c.public_access_block = Some(*block)
        })
    }

    async fn put_bucket_encryption(
        &self,
        name: &str,
        encryption: &EncryptionConfiguration,
    ) -> StorageResult<()> {
        self.update(name, FaultyStep::Encryption, |c| {
            c.encryption = Some(encryption.clone())
        })
    }

    async fn put_bucket_versioning(
        &self,
        name: &str,
        status: VersioningStatus,
    ) -> StorageResult<()> {
        self.update(name, FaultyStep::Versioning, |c| c.versioning = Some(status))
    }

    async fn put_bucket_lifecycle(
        &self,
        name: &str,
        lifecycle: &LifecycleConfiguration,
    ) -> StorageResult<()> {
        self.update(name, FaultyStep::Lifecycle, |c| {
            c.lifecycle = Some(lifecycle.clone())
        })
    }

    async fn bucket_configuration(&self, name: &str) -> StorageResult<BucketConfiguration> {
        self.buckets
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}

#[derive(Default)]
pub struct StaticGroupDirectory {
    groups: HashMap<String, BTreeSet<String>>,
}

impl StaticGroupDirectory {
    pub fn with_member(mut self, identity: &str, group: &str) -> Self {
        self.groups
            .entry(identity.to_string())
            .or_default()
            .insert(group.to_string());
        self
    }
}

#[async_trait]
impl GroupDirectory for StaticGroupDirectory {
    async fn list_groups(&self, identity: &str) -> Result<BTreeSet<String>, DirectoryError> {
        Ok(self.groups.get(identity).cloned().unwrap_or_default())
    }
}

pub struct FailingGroupDirectory;

#[async_trait]
impl GroupDirectory for FailingGroupDirectory {
    async fn list_groups(&self, _identity: &str) -> Result<BTreeSet<String>, DirectoryError> {
        Err(DirectoryError::Unavailable("directory offline".into()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.subject).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Unavailable("topic offline".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// SQLite store with switchable write failures.
pub struct FaultyMetadataStore {
    pub inner: SqliteMetadataStore,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
}

impl FaultyMetadataStore {
    pub async fn new() -> Self {
        Self {
            inner: SqliteMetadataStore::new(db::memory_pool().await.unwrap()),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("injected failure".into())
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadataStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<BucketRecord>> {
        self.inner.get(key).await
    }

    async fn insert(&self, record: &BucketRecord) -> StoreResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.insert(record).await
    }

    async fn conditional_update(
        &self,
        prior: &BucketRecord,
        next: &BucketRecord,
    ) -> StoreResult<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.conditional_update(prior, next).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<BucketRecord>> {
        self.inner.list_by_owner(owner_id).await
    }

    async fn list_all(&self) -> StoreResult<Vec<BucketRecord>> {
        self.inner.list_all().await
    }

    async fn find_by_display_name(&self, display_name: &str) -> StoreResult<Vec<BucketRecord>> {
        self.inner.find_by_display_name(display_name).await
    }

    async fn find_by_resource_name(
        &self,
        resource_name: &str,
    ) -> StoreResult<Option<BucketRecord>> {
        self.inner.find_by_resource_name(resource_name).await
    }

    async fn scan_working_set(
        &self,
        after: Option<&RecordKey>,
        limit: usize,
    ) -> StoreResult<Vec<BucketRecord>> {
        self.inner.scan_working_set(after, limit).await
    }

    async fn deletion_history(&self) -> StoreResult<Vec<BucketRecord>> {
        self.inner.deletion_history().await
    }
}

pub fn user(id: &str) -> Actor {
    Actor::new(id, Some(format!("{id}@example.com")))
}
