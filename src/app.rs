//! Wires configuration into concrete collaborators and the shared HTTP state.

use crate::{
    config::AppConfig,
    services::{
        authorization::AuthorizationResolver,
        bucket_service::BucketService,
        group_directory::SqliteGroupDirectory,
        metadata_store::SqliteMetadataStore,
        notifier::{JsonLinesNotifier, Notifier, TracingNotifier},
        object_storage::LocalObjectStorage,
        provisioner::Provisioner,
        reconciler::Reconciler,
    },
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub buckets: Arc<BucketService>,
    pub reconciler: Arc<Reconciler>,
    pub db: Arc<SqlitePool>,
    /// Root of the bucket backend; checked by `/readyz`.
    pub storage_dir: PathBuf,
}

impl AppState {
    /// Build the service graph on top of an already migrated pool.
    pub fn build(cfg: &AppConfig, db: Arc<SqlitePool>) -> Self {
        let store = Arc::new(SqliteMetadataStore::new(db.clone()));
        let storage = Arc::new(LocalObjectStorage::new(&cfg.storage_dir, &cfg.environment));
        let provisioner = Provisioner::new(storage);
        let directory = Arc::new(SqliteGroupDirectory::new(db.clone()));
        let resolver = AuthorizationResolver::new(
            directory,
            cfg.super_admin_emails.iter().cloned(),
            &cfg.super_admin_group,
            &cfg.business_admin_group,
        );
        let notifier: Arc<dyn Notifier> = match &cfg.notification_log {
            Some(path) => Arc::new(JsonLinesNotifier::new(path)),
            None => Arc::new(TracingNotifier),
        };

        let reconciler = Reconciler::new(
            store.clone(),
            provisioner.clone(),
            notifier.clone(),
            cfg.scan_page_size,
        );
        let buckets = BucketService::new(
            store,
            provisioner,
            resolver,
            notifier,
            &cfg.environment,
            &cfg.region,
        );

        Self {
            buckets: Arc::new(buckets),
            reconciler: Arc::new(reconciler),
            db,
            storage_dir: PathBuf::from(&cfg.storage_dir),
        }
    }
}
