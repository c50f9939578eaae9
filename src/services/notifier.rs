//! Best-effort, human-facing notifications.
//!
//! Publishing never fails the operation that triggered it: errors and slow
//! channels are logged and dropped.

use crate::models::{actor::Actor, bucket::BucketRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::{info, warn};

/// Upper bound on how long a publish may hold up the caller.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
}

impl Notification {
    pub fn created(record: &BucketRecord) -> Self {
        Self {
            subject: "S3 Bucket Created".into(),
            message: format!(
                "Bucket {} created for project {} by user {}",
                record.resource_name, record.display_name, record.owner_email
            ),
        }
    }

    pub fn deleted(record: &BucketRecord, actor: &Actor, should_heal: bool) -> Self {
        let outcome = if should_heal {
            "It will be recreated automatically."
        } else {
            "It will not be recreated."
        };
        Self {
            subject: format!("S3 Bucket Deleted - {}", record.display_name),
            message: format!(
                "Bucket {} for project '{}' was deleted by {}.\n\n{}",
                record.resource_name,
                record.display_name,
                actor.email.as_deref().unwrap_or(&actor.id),
                outcome
            ),
        }
    }

    pub fn healed(record: &BucketRecord, at: DateTime<Utc>) -> Self {
        Self {
            subject: format!("S3 Bucket Healed - {}", record.display_name),
            message: format!(
                "Bucket {} for project '{}' was automatically recreated.\n\nUser: {}\nTime: {}\n\n\
                 The bucket was deleted and has been restored with the same configuration.",
                record.resource_name,
                record.display_name,
                record.owner_email,
                at.to_rfc3339()
            ),
        }
    }

    pub fn restored(record: &BucketRecord) -> Self {
        Self {
            subject: format!("S3 Bucket Restored - {}", record.display_name),
            message: format!(
                "Bucket {} for project '{}' reappeared after deletion and is active again.",
                record.resource_name, record.display_name
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Publish without letting failure or latency leak into the caller.
pub async fn notify(notifier: &dyn Notifier, notification: Notification) {
    match tokio::time::timeout(PUBLISH_TIMEOUT, notifier.publish(&notification)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(subject = %notification.subject, error = %err, "failed to send notification")
        }
        Err(_) => warn!(subject = %notification.subject, "notification timed out"),
    }
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(subject = %notification.subject, "{}", notification.message);
        Ok(())
    }
}

/// Appends notifications as JSON lines to a file another process tails.
#[derive(Debug)]
pub struct JsonLinesNotifier {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct NotificationLine<'a> {
    sent_at: DateTime<Utc>,
    #[serde(flatten)]
    notification: &'a Notification,
}

impl JsonLinesNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Notifier for JsonLinesNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut line = serde_json::to_vec(&NotificationLine {
            sent_at: Utc::now(),
            notification,
        })?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::bucket::DesiredConfig, testing::RecordingNotifier};

    fn record() -> BucketRecord {
        BucketRecord::new(
            "u1",
            "u1@example.com",
            "team-alpha",
            "dev-team-alpha-1234abcd",
            "us-east-1",
            DesiredConfig::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn json_lines_notifier_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let notifier = JsonLinesNotifier::new(&path);

        notify(&notifier, Notification::created(&record())).await;
        notify(&notifier, Notification::healed(&record(), Utc::now())).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["subject"], "S3 Bucket Created");
        assert_eq!(lines[1]["subject"], "S3 Bucket Healed - team-alpha");
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let notifier = RecordingNotifier::failing();
        notify(&notifier, Notification::restored(&record())).await;
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn deletion_message_says_whether_it_heals() {
        let actor = Actor::new("ops", Some("ops@example.com".into()));
        let healing = Notification::deleted(&record(), &actor, true);
        assert!(healing.message.contains("recreated automatically"));
        assert!(healing.message.contains("ops@example.com"));
        let final_delete = Notification::deleted(&record(), &actor, false);
        assert!(final_delete.message.contains("will not be recreated"));
    }
}
