//! Group membership lookups used to resolve admin roles.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::{collections::BTreeSet, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("group directory unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn list_groups(&self, identity: &str) -> Result<BTreeSet<String>, DirectoryError>;
}

/// Group memberships kept in the `group_memberships` table.
#[derive(Clone)]
pub struct SqliteGroupDirectory {
    pub db: Arc<SqlitePool>,
}

impl SqliteGroupDirectory {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Returns `true` if the membership was newly added.
    pub async fn add_member(&self, identity: &str, group: &str) -> Result<bool, DirectoryError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO group_memberships (identity, group_name) VALUES (?, ?)",
        )
        .bind(identity.trim().to_ascii_lowercase())
        .bind(group.trim())
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Returns `true` if a membership was removed.
    pub async fn remove_member(&self, identity: &str, group: &str) -> Result<bool, DirectoryError> {
        let result =
            sqlx::query("DELETE FROM group_memberships WHERE identity = ? AND group_name = ?")
                .bind(identity.trim().to_ascii_lowercase())
                .bind(group.trim())
                .execute(&*self.db)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn members(&self, group: &str) -> Result<Vec<String>, DirectoryError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT identity FROM group_memberships WHERE group_name = ? ORDER BY identity",
        )
        .bind(group.trim())
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl GroupDirectory for SqliteGroupDirectory {
    async fn list_groups(&self, identity: &str) -> Result<BTreeSet<String>, DirectoryError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT group_name FROM group_memberships WHERE identity = ?",
        )
        .bind(identity.trim().to_ascii_lowercase())
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
