//! SQLite connection setup and the embedded schema migration.

use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{path::Path, sync::Arc};

const INIT_MIGRATION: &str = include_str!("../migrations/0001_init.sql");

/// Open the metadata database, creating its file and parent directory when
/// they do not exist yet.
pub async fn connect(database_url: &str) -> Result<Arc<SqlitePool>> {
    tracing::debug!("Connecting using raw URL => {}", database_url);

    if !database_url.contains(":memory:") {
        // Extract the local file path SQLx will use
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        tracing::debug!("Interpreted SQLite path => {}", db_path);

        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {:?}", parent))?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
            .with_context(|| format!("opening database file {}", db_path))?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .with_context(|| format!("connecting to {}", database_url))?;

    Ok(Arc::new(pool))
}

/// Single-connection in-memory database with the schema applied.
///
/// One connection only: every new connection to `sqlite::memory:` would get
/// its own empty database.
pub async fn memory_pool() -> Result<Arc<SqlitePool>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let pool = Arc::new(pool);
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run the SQLite migration embedded from `migrations/0001_init.sql`.
///
/// Every statement is idempotent, so this is safe on every startup.
pub async fn run_migrations(db: &Arc<SqlitePool>) -> Result<()> {
    let statements = INIT_MIGRATION
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt)
            .execute(&**db)
            .await
            .with_context(|| format!("executing migration statement: {}", stmt))?;
    }

    Ok(())
}
