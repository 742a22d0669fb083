// Group Lifecycle - join / leave / waitlist / create / cancel transitions
//
// Every mutation runs as: per-group lock -> storage transaction that claims
// the group row -> validate against the ledger -> write ledger and membership
// rows -> re-count JOINED rows -> commit -> publish. Events are published
// while the group lock is still held so their order matches commit order.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::core::{Clock, GroupId, UserId};
use crate::engine::ledger::CapacityLedger;
use crate::error::{AppError, AppResult, ConflictKind};
use crate::infrastructure::database::{DatabaseInterface, DatabaseTransaction};
use crate::infrastructure::entitlement::WaitlistEntitlement;
use crate::infrastructure::events::{EventPublisher, GroupEvent};
use crate::infrastructure::group_locks::GroupLocks;
use crate::infrastructure::id_generator::IdGenerator;
use crate::infrastructure::notifications::{JoinNotice, NotificationQueue};
use crate::models::{
    Group, GroupFilter, GroupWithMembers, Membership, MembershipStatus, NewGroup,
};

/// Result of a successful leave
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub group: Group,
    /// Waitlisted user moved into the freed slot, if any
    pub promoted: Option<UserId>,
}

pub struct GroupLifecycle {
    database: Arc<dyn DatabaseInterface>,
    locks: Arc<GroupLocks>,
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
    notifications: NotificationQueue,
    entitlement: Arc<dyn WaitlistEntitlement>,
}

impl GroupLifecycle {
    pub fn new(
        database: Arc<dyn DatabaseInterface>,
        locks: Arc<GroupLocks>,
        ids: Arc<IdGenerator>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
        notifications: NotificationQueue,
        entitlement: Arc<dyn WaitlistEntitlement>,
    ) -> Self {
        Self {
            database,
            locks,
            ids,
            clock,
            publisher,
            notifications,
            entitlement,
        }
    }

    /// Create a group with its creator as the first JOINED member
    #[instrument(skip(self, input), fields(sport = %input.sport_type, capacity = input.capacity))]
    pub async fn create_group(&self, creator: &UserId, input: NewGroup) -> AppResult<Group> {
        let now = self.clock.now();
        input.validate(now)?;

        // Checked before the transaction so its first statement is a write
        if self.database.get_user(creator).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", creator)));
        }

        let mut tx = self.database.begin_transaction().await?;
        let ledger = CapacityLedger::for_new_group(input.capacity);
        let group = Group {
            id: self.ids.next_id(),
            creator_id: creator.clone(),
            sport_type: input.sport_type,
            title: input.title,
            description: input.description,
            location: input.location,
            level: input.level,
            scheduled_time: input.scheduled_time,
            capacity: ledger.capacity,
            current_count: ledger.current_count,
            status: ledger.status,
            created_at: now,
            updated_at: now,
        };

        self.database.insert_group_tx(&mut tx, &group).await?;
        self.database
            .upsert_membership_tx(&mut tx, group.id, creator, MembershipStatus::Joined, now)
            .await?;
        self.verify_joined_count(&mut tx, group.id, &ledger).await?;
        tx.commit().await?;

        info!(group_id = %group.id, creator = %creator, status = %group.status, "Group created");
        self.emit(GroupEvent::GroupCreated {
            group: group.clone(),
        })
        .await;
        Ok(group)
    }

    /// Occupy a slot in an open group
    #[instrument(skip(self))]
    pub async fn join_group(&self, group_id: GroupId, user: &UserId) -> AppResult<Group> {
        let _guard = self.locks.acquire(group_id).await;
        let now = self.clock.now();
        let mut tx = self.database.begin_transaction().await?;

        let group = self.load_group(&mut tx, group_id).await?;
        if group.status.is_terminal() {
            return Err(ConflictKind::NotOpen.into());
        }
        if let Some(existing) = self.database.find_membership_tx(&mut tx, group_id, user).await? {
            if existing.status == MembershipStatus::Joined {
                return Err(ConflictKind::AlreadyJoined.into());
            }
        }
        self.ensure_user(&mut tx, user).await?;

        let mut ledger = CapacityLedger::of(&group);
        ledger.admit()?;

        self.database
            .upsert_membership_tx(&mut tx, group_id, user, MembershipStatus::Joined, now)
            .await?;
        self.database.write_ledger_tx(&mut tx, group_id, &ledger, now).await?;
        self.verify_joined_count(&mut tx, group_id, &ledger).await?;
        tx.commit().await?;

        let group = apply_ledger(group, &ledger, now);
        info!(
            group_id = %group_id,
            user_id = %user,
            current_count = group.current_count,
            status = %group.status,
            "User joined group"
        );
        self.emit(GroupEvent::updated(&group)).await;

        if &group.creator_id != user {
            self.notifications.enqueue(JoinNotice {
                group: group.clone(),
                joiner_id: user.clone(),
            });
        }
        Ok(group)
    }

    /// Give up a slot; the longest-waiting waitlisted user takes it
    #[instrument(skip(self))]
    pub async fn leave_group(&self, group_id: GroupId, user: &UserId) -> AppResult<LeaveOutcome> {
        let _guard = self.locks.acquire(group_id).await;
        let now = self.clock.now();
        let mut tx = self.database.begin_transaction().await?;

        let group = self.load_group(&mut tx, group_id).await?;
        if group.status.is_terminal() {
            return Err(ConflictKind::NotOpen.into());
        }
        let is_member = self
            .database
            .find_membership_tx(&mut tx, group_id, user)
            .await?
            .map(|m| m.status == MembershipStatus::Joined)
            .unwrap_or(false);
        if !is_member {
            return Err(ConflictKind::NotMember.into());
        }
        if &group.creator_id == user {
            return Err(ConflictKind::CreatorCannotLeave.into());
        }

        let mut ledger = CapacityLedger::of(&group);
        ledger.release()?;
        self.database.mark_left_tx(&mut tx, group_id, user).await?;

        let promoted = match self.database.next_waitlisted_tx(&mut tx, group_id).await? {
            Some(next) => {
                ledger.admit()?;
                self.database
                    .upsert_membership_tx(
                        &mut tx,
                        group_id,
                        &next.user_id,
                        MembershipStatus::Joined,
                        now,
                    )
                    .await?;
                Some(next.user_id)
            }
            None => None,
        };

        self.database.write_ledger_tx(&mut tx, group_id, &ledger, now).await?;
        self.verify_joined_count(&mut tx, group_id, &ledger).await?;
        tx.commit().await?;

        let group = apply_ledger(group, &ledger, now);
        match &promoted {
            Some(promoted) => info!(
                group_id = %group_id,
                user_id = %user,
                promoted = %promoted,
                current_count = group.current_count,
                "User left group, waitlist promoted"
            ),
            None => info!(
                group_id = %group_id,
                user_id = %user,
                current_count = group.current_count,
                "User left group"
            ),
        }
        self.emit(GroupEvent::updated(&group)).await;

        Ok(LeaveOutcome { group, promoted })
    }

    /// Queue for a slot. Does not touch the ledger.
    #[instrument(skip(self))]
    pub async fn waitlist_group(&self, group_id: GroupId, user: &UserId) -> AppResult<Membership> {
        if !self.entitlement.evaluate(user).await? {
            return Err(AppError::Forbidden(format!(
                "Waitlisting requires an entitlement ({})",
                self.entitlement.name()
            )));
        }

        let _guard = self.locks.acquire(group_id).await;
        let now = self.clock.now();
        let mut tx = self.database.begin_transaction().await?;

        let group = self.load_group(&mut tx, group_id).await?;
        if group.status.is_terminal() {
            return Err(ConflictKind::NotOpen.into());
        }
        match self.database.find_membership_tx(&mut tx, group_id, user).await? {
            Some(m) if m.status == MembershipStatus::Joined => {
                return Err(ConflictKind::AlreadyJoined.into())
            }
            Some(m) if m.status == MembershipStatus::Waitlist => {
                return Err(ConflictKind::AlreadyWaitlisted.into())
            }
            _ => {}
        }
        self.ensure_user(&mut tx, user).await?;

        self.database
            .upsert_membership_tx(&mut tx, group_id, user, MembershipStatus::Waitlist, now)
            .await?;
        self.verify_joined_count(&mut tx, group_id, &CapacityLedger::of(&group))
            .await?;
        tx.commit().await?;

        info!(group_id = %group_id, user_id = %user, "User waitlisted");
        Ok(Membership {
            group_id,
            user_id: user.clone(),
            status: MembershipStatus::Waitlist,
            joined_at: now,
        })
    }

    /// Cancel a live group. Only its creator may do this.
    #[instrument(skip(self))]
    pub async fn cancel_group(&self, group_id: GroupId, user: &UserId) -> AppResult<Group> {
        let _guard = self.locks.acquire(group_id).await;
        let now = self.clock.now();
        let mut tx = self.database.begin_transaction().await?;

        let group = self.load_group(&mut tx, group_id).await?;
        if &group.creator_id != user {
            return Err(AppError::Forbidden(
                "Only the organizer can cancel a group".to_string(),
            ));
        }

        let mut ledger = CapacityLedger::of(&group);
        ledger.cancel()?;
        self.database.write_ledger_tx(&mut tx, group_id, &ledger, now).await?;
        tx.commit().await?;

        let group = apply_ledger(group, &ledger, now);
        info!(group_id = %group_id, "Group cancelled");
        self.emit(GroupEvent::updated(&group)).await;
        Ok(group)
    }

    pub async fn get_group(&self, group_id: GroupId) -> AppResult<GroupWithMembers> {
        let group = self
            .database
            .get_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", group_id)))?;
        let members = self.database.list_members(group_id).await?;
        Ok(GroupWithMembers { group, members })
    }

    pub async fn list_groups(&self, filter: &GroupFilter) -> AppResult<Vec<Group>> {
        self.database.list_groups(filter).await
    }

    /// Groups the user is joined to or waitlisted on
    pub async fn list_user_groups(&self, user: &UserId) -> AppResult<Vec<(Group, Membership)>> {
        self.database.list_groups_for_user(user).await
    }

    async fn load_group(&self, tx: &mut DatabaseTransaction, group_id: GroupId) -> AppResult<Group> {
        self.database
            .lock_group_tx(tx, group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", group_id)))
    }

    async fn ensure_user(&self, tx: &mut DatabaseTransaction, user: &UserId) -> AppResult<()> {
        match self.database.get_user_tx(tx, user).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("User {} not found", user))),
        }
    }

    /// The denormalized counter must match the JOINED rows before commit
    async fn verify_joined_count(
        &self,
        tx: &mut DatabaseTransaction,
        group_id: GroupId,
        ledger: &CapacityLedger,
    ) -> AppResult<()> {
        let joined = self.database.count_joined_tx(tx, group_id).await?;
        if joined != ledger.current_count || !ledger.is_consistent() {
            error!(
                group_id = %group_id,
                joined,
                current_count = ledger.current_count,
                capacity = ledger.capacity,
                status = %ledger.status,
                "Capacity ledger diverged from memberships"
            );
            return Err(AppError::Internal(format!(
                "Ledger of group {} does not match its members",
                group_id
            )));
        }
        debug!(group_id = %group_id, joined, "Ledger verified");
        Ok(())
    }

    async fn emit(&self, event: GroupEvent) {
        let name = event.name();
        let group_id = event.group_id();
        if let Err(e) = self.publisher.publish(event).await {
            warn!(group_id = %group_id, event = name, error = %e, "Failed to publish group event");
        }
    }
}

fn apply_ledger(group: Group, ledger: &CapacityLedger, now: chrono::DateTime<chrono::Utc>) -> Group {
    Group {
        current_count: ledger.current_count,
        status: ledger.status,
        updated_at: now,
        ..group
    }
}
