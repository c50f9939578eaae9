//! src/services/object_storage.rs
//!
//! The object-storage boundary: container creation, existence probes,
//! deletion, and per-container configuration. `LocalObjectStorage` keeps each
//! container as a directory beneath `base_path/{bucket}` with its configuration
//! in `base_path/{bucket}/.bucket.json` and objects under
//! `base_path/{bucket}/objects/{key}`.

use crate::models::lifecycle_rules::LifecycleConfiguration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    NotFound(String),
    #[error("bucket `{0}` already exists and belongs to someone else")]
    AlreadyExists(String),
    #[error("access to bucket `{0}` denied")]
    AccessDenied(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("region `{0}` is not supported")]
    UnsupportedRegion(String),
    #[error("bucket configuration is unreadable: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// The only error that means "the container does not exist". Everything
    /// else is ambiguous and must not be read as a deletion.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateBucketOutcome {
    Created,
    /// The container was already there and belongs to this system.
    AlreadyOwned,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn all_blocked() -> Self {
        Self {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptionConfiguration {
    pub sse_algorithm: String,
}

impl Default for EncryptionConfiguration {
    fn default() -> Self {
        Self {
            sse_algorithm: "AES256".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningStatus {
    Enabled,
}

/// Everything a container knows about itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BucketConfiguration {
    pub owner_tag: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub public_access_block: Option<PublicAccessBlock>,
    pub encryption: Option<EncryptionConfiguration>,
    pub versioning: Option<VersioningStatus>,
    pub lifecycle: Option<LifecycleConfiguration>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Existence probe. `Ok(())` if the container exists, `NotFound` if it
    /// does not; any other error is inconclusive.
    async fn head_bucket(&self, name: &str) -> StorageResult<()>;

    async fn create_bucket(&self, name: &str, region: &str) -> StorageResult<CreateBucketOutcome>;

    /// Remove every object and then the container itself.
    async fn delete_bucket(&self, name: &str) -> StorageResult<()>;

    async fn put_public_access_block(
        &self,
        name: &str,
        block: &PublicAccessBlock,
    ) -> StorageResult<()>;

    async fn put_bucket_encryption(
        &self,
        name: &str,
        encryption: &EncryptionConfiguration,
    ) -> StorageResult<()>;

    async fn put_bucket_versioning(&self, name: &str, status: VersioningStatus)
    -> StorageResult<()>;

    async fn put_bucket_lifecycle(
        &self,
        name: &str,
        lifecycle: &LifecycleConfiguration,
    ) -> StorageResult<()>;

    async fn bucket_configuration(&self, name: &str) -> StorageResult<BucketConfiguration>;
}

const CONFIG_FILE: &str = ".bucket.json";
const OBJECTS_DIR: &str = "objects";
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const SUPPORTED_REGIONS: [&str; 16] = [
    "local",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "ap-southeast-1",
    "ap-northeast-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-northeast-2",
    "ap-northeast-3",
    "me-south-1",
];

/// Object storage on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalObjectStorage {
    /// Base directory on disk where containers live.
    pub base_path: PathBuf,

    /// Marker written into every container this instance creates; a container
    /// carrying a different tag is not ours to reuse.
    pub owner_tag: String,
}

impl LocalObjectStorage {
    pub fn new(base_path: impl Into<PathBuf>, owner_tag: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            owner_tag: owner_tag.into(),
        }
    }

    fn bucket_root(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.bucket_root(name).join(CONFIG_FILE)
    }

    fn objects_root(&self, name: &str) -> PathBuf {
        self.bucket_root(name).join(OBJECTS_DIR)
    }

    /// Map an I/O error on a container path into the storage taxonomy.
    fn classify(name: &str, err: io::Error) -> StorageError {
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            ErrorKind::PermissionDenied => StorageError::AccessDenied(name.to_string()),
            _ => StorageError::Io(err),
        }
    }

    async fn read_config(&self, name: &str) -> StorageResult<BucketConfiguration> {
        let raw = fs::read(self.config_path(name))
            .await
            .map_err(|err| Self::classify(name, err))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Write the configuration via a temp file and rename, so a crash never
    /// leaves a half-written document behind.
    async fn write_config(&self, name: &str, config: &BucketConfiguration) -> StorageResult<()> {
        let root = self.bucket_root(name);
        let tmp_path = root.join(format!(".tmp-{}", Uuid::new_v4()));
        let payload = serde_json::to_vec_pretty(config)?;

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|err| Self::classify(name, err))?;
        if let Err(err) = file.write_all(&payload).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, self.config_path(name)).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::classify(name, err));
        }
        Ok(())
    }

    async fn update_config<F>(&self, name: &str, apply: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BucketConfiguration) + Send,
    {
        let mut config = self.read_config(name).await?;
        apply(&mut config);
        self.write_config(name, &config).await
    }

    /// Keys of every object in a container, in lexicographic order.
    pub async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<String>> {
        self.head_bucket(bucket).await?;
        let root = self.objects_root(bucket);
        let mut keys = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(Self::classify(bucket, err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&root) {
                    keys.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn head_bucket(&self, name: &str) -> StorageResult<()> {
        let meta = fs::metadata(self.bucket_root(name))
            .await
            .map_err(|err| Self::classify(name, err))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StorageError::NotFound(name.to_string()))
        }
    }

    async fn create_bucket(&self, name: &str, region: &str) -> StorageResult<CreateBucketOutcome> {
        ensure_bucket_name_safe(name)?;
        let region = region.to_lowercase();
        ensure_region_valid(&region)?;

        fs::create_dir_all(&self.base_path).await?;
        match fs::create_dir(self.bucket_root(name)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return match self.read_config(name).await {
                    Ok(existing) if existing.owner_tag == self.owner_tag => {
                        debug!("bucket {} already exists and is ours", name);
                        Ok(CreateBucketOutcome::AlreadyOwned)
                    }
                    Ok(_) => Err(StorageError::AlreadyExists(name.to_string())),
                    // A directory without our marker is someone else's.
                    Err(StorageError::NotFound(_)) => {
                        Err(StorageError::AlreadyExists(name.to_string()))
                    }
                    Err(other) => Err(other),
                };
            }
            Err(err) => return Err(Self::classify(name, err)),
        }

        let config = BucketConfiguration {
            owner_tag: self.owner_tag.clone(),
            region,
            created_at: Utc::now(),
            public_access_block: None,
            encryption: None,
            versioning: None,
            lifecycle: None,
        };
        if let Err(err) = self.write_config(name, &config).await {
            let _ = fs::remove_dir_all(self.bucket_root(name)).await;
            return Err(err);
        }
        fs::create_dir_all(self.objects_root(name)).await?;
        Ok(CreateBucketOutcome::Created)
    }

    async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let keys = self.list_objects(name).await?;
        let objects_root = self.objects_root(name);
        for key in &keys {
            match fs::remove_file(objects_root.join(key)).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(Self::classify(name, err)),
            }
        }
        debug!("removed {} objects from {}", keys.len(), name);

        fs::remove_dir_all(self.bucket_root(name))
            .await
            .map_err(|err| Self::classify(name, err))
    }

    async fn put_public_access_block(
        &self,
        name: &str,
        block: &PublicAccessBlock,
    ) -> StorageResult<()> {
        let block = *block;
        self.update_config(name, move |config| config.public_access_block = Some(block))
            .await
    }

    async fn put_bucket_encryption(
        &self,
        name: &str,
        encryption: &EncryptionConfiguration,
    ) -> StorageResult<()> {
        let encryption = encryption.clone();
        self.update_config(name, move |config| config.encryption = Some(encryption))
            .await
    }

    async fn put_bucket_versioning(
        &self,
        name: &str,
        status: VersioningStatus,
    ) -> StorageResult<()> {
        self.update_config(name, move |config| config.versioning = Some(status))
            .await
    }

    async fn put_bucket_lifecycle(
        &self,
        name: &str,
        lifecycle: &LifecycleConfiguration,
    ) -> StorageResult<()> {
        let lifecycle = lifecycle.clone();
        self.update_config(name, move |config| config.lifecycle = Some(lifecycle))
            .await
    }

    async fn bucket_configuration(&self, name: &str) -> StorageResult<BucketConfiguration> {
        self.read_config(name).await
    }
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Validate region string against SUPPORTED_REGIONS (case-insensitive).
pub fn ensure_region_valid(region: &str) -> StorageResult<()> {
    if SUPPORTED_REGIONS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(region))
    {
        Ok(())
    } else {
        Err(StorageError::UnsupportedRegion(region.to_string()))
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
