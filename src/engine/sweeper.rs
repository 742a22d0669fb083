// Expiry Sweeper - completes live groups whose scheduled time has passed

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::core::{Clock, GroupId};
use crate::engine::ledger::CapacityLedger;
use crate::error::AppResult;
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::events::{EventPublisher, GroupEvent};
use crate::infrastructure::group_locks::GroupLocks;
use crate::models::Group;

pub struct ExpirySweeper {
    database: Arc<dyn DatabaseInterface>,
    locks: Arc<GroupLocks>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
}

impl ExpirySweeper {
    pub fn new(
        database: Arc<dyn DatabaseInterface>,
        locks: Arc<GroupLocks>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            database,
            locks,
            clock,
            publisher,
        }
    }

    /// Complete every expired live group; returns how many were completed.
    /// A failure on one group is logged and the sweep moves on.
    pub async fn sweep_once(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let expired = self.database.expired_group_ids(now).await?;
        if expired.is_empty() {
            debug!("No expired groups");
            return Ok(0);
        }

        let mut completed = 0;
        for group_id in expired {
            match self.complete_group(group_id, now).await {
                Ok(Some(_)) => completed += 1,
                Ok(None) => debug!(group_id = %group_id, "Group no longer expirable"),
                Err(e) => error!(group_id = %group_id, error = %e, "Failed to complete group"),
            }
        }

        info!(completed, "Expiry sweep finished");
        Ok(completed)
    }

    async fn complete_group(&self, group_id: GroupId, now: DateTime<Utc>) -> AppResult<Option<Group>> {
        let _guard = self.locks.acquire(group_id).await;
        let mut tx = self.database.begin_transaction().await?;

        let group = match self.database.lock_group_tx(&mut tx, group_id).await? {
            Some(group) => group,
            None => return Ok(None),
        };
        // Re-check under the lock; a cancel may have landed since the scan
        if group.scheduled_time >= now {
            return Ok(None);
        }
        let mut ledger = CapacityLedger::of(&group);
        if !ledger.complete() {
            return Ok(None);
        }

        self.database.write_ledger_tx(&mut tx, group_id, &ledger, now).await?;
        let credited = self.database.credit_attendance_tx(&mut tx, group_id).await?;
        tx.commit().await?;

        let group = Group {
            status: ledger.status,
            updated_at: now,
            ..group
        };
        info!(group_id = %group_id, credited, "Group completed");

        if let Err(e) = self.publisher.publish(GroupEvent::updated(&group)).await {
            warn!(group_id = %group_id, error = %e, "Failed to publish group event");
        }
        Ok(Some(group))
    }

    /// Run the sweep now and then every `interval` on a single task.
    /// Ticks missed while a sweep is still running are skipped.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Expiry sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    error!(error = %e, "Expiry sweep failed");
                }
                let pruned = self.locks.prune();
                if pruned > 0 {
                    debug!(pruned, "Pruned idle group locks");
                }
            }
        })
    }
}
