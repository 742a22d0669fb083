// Database Interface - typed transactional repository for the meetup engine
// The lifecycle state machine performs every read-check-write sequence through
// the `_tx` methods so that ledger and membership rows change in one unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::core::{GroupId, UserId};
use crate::engine::ledger::CapacityLedger;
use crate::error::{AppError, AppResult};
use crate::models::{
    AttendedSession, Badge, Group, GroupFilter, Membership, MembershipStatus, UserBadge,
    UserProfile,
};

/// Transaction wrapper for database operations
pub struct DatabaseTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl DatabaseTransaction {
    pub fn new_sqlite(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit the transaction
    pub async fn commit(self) -> AppResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    /// Rollback the transaction. Dropping an uncommitted transaction also rolls back.
    pub async fn rollback(self) -> AppResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to rollback transaction: {}", e)))
    }
}

/// Database interface trait for the meetup engine
#[async_trait]
pub trait DatabaseInterface: Send + Sync {
    // Transaction management
    async fn begin_transaction(&self) -> AppResult<DatabaseTransaction>;

    /// Verify storage connectivity
    async fn health_check(&self) -> AppResult<()>;

    // User profiles
    async fn upsert_user(&self, id: &UserId, email: &str, name: &str, now: DateTime<Utc>)
        -> AppResult<UserProfile>;
    async fn set_premium(&self, id: &UserId, is_premium: bool) -> AppResult<()>;
    async fn get_user(&self, id: &UserId) -> AppResult<Option<UserProfile>>;
    async fn get_user_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &UserId,
    ) -> AppResult<Option<UserProfile>>;

    // Groups
    async fn get_group(&self, id: GroupId) -> AppResult<Option<Group>>;
    async fn list_groups(&self, filter: &GroupFilter) -> AppResult<Vec<Group>>;
    async fn list_groups_for_user(&self, user: &UserId) -> AppResult<Vec<(Group, Membership)>>;
    async fn count_groups_created_by(&self, user: &UserId) -> AppResult<u64>;
    /// Ids of live groups whose scheduled time is before `now`
    async fn expired_group_ids(&self, now: DateTime<Utc>) -> AppResult<Vec<GroupId>>;

    async fn insert_group_tx(&self, tx: &mut DatabaseTransaction, group: &Group) -> AppResult<()>;
    /// Claim the group's write lock for the rest of the transaction and read it
    async fn lock_group_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: GroupId,
    ) -> AppResult<Option<Group>>;
    /// Persist the ledger triple of a group
    async fn write_ledger_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: GroupId,
        ledger: &CapacityLedger,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    // Memberships
    async fn find_membership_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
        user: &UserId,
    ) -> AppResult<Option<Membership>>;
    /// Insert or overwrite the (group, user) row, stamping `joined_at`
    async fn upsert_membership_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
        user: &UserId,
        status: MembershipStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;
    async fn mark_left_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
        user: &UserId,
    ) -> AppResult<()>;
    /// Longest-waiting WAITLIST row of a group
    async fn next_waitlisted_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
    ) -> AppResult<Option<Membership>>;
    async fn count_joined_tx(&self, tx: &mut DatabaseTransaction, group: GroupId) -> AppResult<u32>;
    async fn list_members(&self, group: GroupId) -> AppResult<Vec<Membership>>;
    /// JOINED memberships of a user with their group's sport and time
    async fn find_memberships_by_user(&self, user: &UserId) -> AppResult<Vec<AttendedSession>>;

    /// Credit one attended group to every JOINED member; returns members credited
    async fn credit_attendance_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
    ) -> AppResult<u64>;

    // Badges
    async fn list_badges(&self) -> AppResult<Vec<Badge>>;
    async fn unlocked_badge_codes(&self, user: &UserId) -> AppResult<Vec<String>>;
    async fn list_user_badges(&self, user: &UserId) -> AppResult<Vec<UserBadge>>;
    /// Insert the user badge unless present; true when this call inserted it
    async fn unlock_badge_if_absent(
        &self,
        user: &UserId,
        badge_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
}
