// Group events - change notifications handed to the real-time fan-out layer

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::GroupId;
use crate::error::AppResult;
use crate::models::{Group, GroupStatus};

const CHANNEL_CAPACITY: usize = 256;

/// Domain events emitted after a group mutation commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    GroupCreated {
        group: Group,
    },
    GroupUpdated {
        id: GroupId,
        current_count: u32,
        status: GroupStatus,
    },
}

impl GroupEvent {
    pub fn updated(group: &Group) -> Self {
        GroupEvent::GroupUpdated {
            id: group.id,
            current_count: group.current_count,
            status: group.status,
        }
    }

    pub fn group_id(&self) -> GroupId {
        match self {
            GroupEvent::GroupCreated { group } => group.id,
            GroupEvent::GroupUpdated { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GroupEvent::GroupCreated { .. } => "group_created",
            GroupEvent::GroupUpdated { .. } => "group_updated",
        }
    }
}

/// Outbound publisher for group events.
///
/// Callers log and drop publish failures; an event that cannot be delivered
/// never rolls back the mutation that produced it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: GroupEvent) -> AppResult<()>;
}

/// In-process publisher backed by a tokio broadcast channel.
///
/// Only subscribers inside this process receive events.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<GroupEvent>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: GroupEvent) -> AppResult<()> {
        // No receivers is fine
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: GroupEvent) -> AppResult<()> {
        Ok(())
    }
}
