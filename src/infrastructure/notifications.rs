// Join notifications - outbound email to organizers, delivered off the request path

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::UserId;
use crate::error::{AppError, AppResult};
use crate::infrastructure::user_directory::UserDirectory;
use crate::models::Group;

const QUEUE_CAPACITY: usize = 1024;

/// Email sent to a group's organizer when someone joins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinNotification {
    pub to_email: String,
    pub organizer_name: String,
    pub joiner_name: String,
    pub group_title: String,
    pub sport_type: String,
    pub time: DateTime<Utc>,
    pub is_full: bool,
}

impl JoinNotification {
    pub fn subject(&self) -> String {
        if self.is_full {
            format!("{} joined {} (now full)", self.joiner_name, self.group_title)
        } else {
            format!("{} joined {}", self.joiner_name, self.group_title)
        }
    }
}

/// Outbound mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_join_notification(&self, notification: &JoinNotification) -> AppResult<()>;
}

/// Writes notifications to the log instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_join_notification(&self, notification: &JoinNotification) -> AppResult<()> {
        info!(
            to = %notification.to_email,
            subject = %notification.subject(),
            sport = %notification.sport_type,
            "Join notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory so callers can inspect deliveries
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<JoinNotification>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<JoinNotification> {
        self.sent.lock().await.clone()
    }

    /// Poll until at least `count` notifications arrived or `timeout` passed
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<JoinNotification> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent().await;
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_join_notification(&self, notification: &JoinNotification) -> AppResult<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

/// A committed join waiting to be turned into an email
#[derive(Debug, Clone)]
pub struct JoinNotice {
    pub group: Group,
    pub joiner_id: UserId,
}

/// Producer side of the notification queue. Enqueueing never blocks and
/// never fails the caller.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<JoinNotice>,
}

impl NotificationQueue {
    /// Start the delivery worker
    pub fn spawn(
        directory: Arc<UserDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<JoinNotice>(QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            info!("Notification worker started");
            while let Some(notice) = receiver.recv().await {
                let group_id = notice.group.id;
                if let Err(e) = deliver(&directory, mailer.as_ref(), notice).await {
                    warn!(group_id = %group_id, error = %e, "Failed to deliver join notification");
                }
            }
            info!("Notification worker stopped");
        });

        (Self { sender }, handle)
    }

    pub fn enqueue(&self, notice: JoinNotice) {
        let group_id = notice.group.id;
        if let Err(e) = self.sender.try_send(notice) {
            debug!(group_id = %group_id, error = %e, "Join notification dropped");
        }
    }
}

async fn deliver(
    directory: &UserDirectory,
    mailer: &dyn Mailer,
    notice: JoinNotice,
) -> AppResult<()> {
    let organizer = directory
        .get(&notice.group.creator_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Organizer {} not found", notice.group.creator_id))
        })?;
    let joiner = directory
        .get(&notice.joiner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", notice.joiner_id)))?;

    let notification = JoinNotification {
        to_email: organizer.email,
        organizer_name: organizer.name,
        joiner_name: joiner.name,
        group_title: notice.group.title.clone(),
        sport_type: notice.group.sport_type.clone(),
        time: notice.group.scheduled_time,
        is_full: notice.group.current_count >= notice.group.capacity,
    };
    mailer.send_join_notification(&notification).await
}
