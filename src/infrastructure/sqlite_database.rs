use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::core::{from_millis, to_millis, GroupId, UserId};
use crate::engine::ledger::CapacityLedger;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{DatabaseInterface, DatabaseTransaction};
use crate::models::{
    AttendedSession, Badge, Group, GroupFilter, GroupStatus, Membership, MembershipStatus,
    UserBadge, UserProfile,
};
use crate::stats::badges::BADGE_CATALOG;

const GROUP_COLUMNS: &str = "g.id AS id, g.creator_id AS creator_id, g.sport_type AS sport_type, \
     g.title AS title, g.description AS description, g.location AS location, g.level AS level, \
     g.scheduled_time AS scheduled_time, g.capacity AS capacity, g.current_count AS current_count, \
     g.status AS status, g.created_at AS created_at, g.updated_at AS updated_at";

const USER_COLUMNS: &str = "id, email, name, is_premium, attended_count";

/// SQLite implementation of the database interface
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Connect to a file-backed database (created if missing)
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                AppError::ConfigurationError(format!("Invalid database url {}: {}", database_url, e))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(8))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.initialize().await?;
        info!(database_url, max_connections, "SQLite database ready");
        Ok(db)
    }

    /// In-memory database for tests. Every pooled connection would get its own
    /// private database, so the pool is pinned to one long-lived connection.
    pub async fn new_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::ConfigurationError(format!("Invalid in-memory url: {}", e)))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Create tables and indexes, seed the badge catalog
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                is_premium INTEGER NOT NULL DEFAULT 0,
                attended_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create users table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meetup_groups (
                id INTEGER PRIMARY KEY,
                creator_id TEXT NOT NULL REFERENCES users(id),
                sport_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                location TEXT NOT NULL,
                level TEXT NOT NULL,
                scheduled_time INTEGER NOT NULL,
                capacity INTEGER NOT NULL CHECK (capacity >= 1),
                current_count INTEGER NOT NULL CHECK (current_count >= 0 AND current_count <= capacity),
                status TEXT NOT NULL CHECK (status IN ('OPEN', 'FULL', 'CANCELLED', 'COMPLETED')),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create groups table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memberships (
                group_id INTEGER NOT NULL REFERENCES meetup_groups(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                status TEXT NOT NULL CHECK (status IN ('JOINED', 'WAITLIST', 'LEFT')),
                joined_at INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (group_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create memberships table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS badges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create badges table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_badges (
                user_id TEXT NOT NULL REFERENCES users(id),
                badge_id INTEGER NOT NULL REFERENCES badges(id),
                unlocked_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, badge_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create user badges table: {}", e))
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_groups_status_time ON meetup_groups(status, scheduled_time)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create groups status index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_groups_creator ON meetup_groups(creator_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create groups creator index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memberships_user_status ON memberships(user_id, status)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create memberships user index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memberships_waitlist ON memberships(group_id, status, joined_at, seq)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create memberships waitlist index: {}", e)))?;

        for entry in BADGE_CATALOG {
            sqlx::query("INSERT OR IGNORE INTO badges (code, name, description) VALUES (?, ?, ?)")
                .bind(entry.code)
                .bind(entry.name)
                .bind(entry.description)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to seed badge {}: {}", entry.code, e))
                })?;
        }

        Ok(())
    }
}

fn to_u32(value: i64, column: &str) -> AppResult<u32> {
    u32::try_from(value).map_err(|_| {
        AppError::DatabaseError(format!("Column {} holds out-of-range value {}", column, value))
    })
}

fn column_err(column: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(format!("Failed to read column {}: {}", column, e))
}

fn time_column(row: &SqliteRow, column: &str) -> AppResult<DateTime<Utc>> {
    from_millis(row.try_get(column).map_err(|e| column_err(column, e))?)
}

fn group_from_row(row: &SqliteRow) -> AppResult<Group> {
    let status: String = row.try_get("status").map_err(|e| column_err("status", e))?;
    Ok(Group {
        id: GroupId(row.try_get("id").map_err(|e| column_err("id", e))?),
        creator_id: UserId::new_unchecked(
            row.try_get::<String, _>("creator_id")
                .map_err(|e| column_err("creator_id", e))?,
        ),
        sport_type: row.try_get("sport_type").map_err(|e| column_err("sport_type", e))?,
        title: row.try_get("title").map_err(|e| column_err("title", e))?,
        description: row.try_get("description").map_err(|e| column_err("description", e))?,
        location: row.try_get("location").map_err(|e| column_err("location", e))?,
        level: row.try_get("level").map_err(|e| column_err("level", e))?,
        scheduled_time: time_column(row, "scheduled_time")?,
        capacity: to_u32(
            row.try_get("capacity").map_err(|e| column_err("capacity", e))?,
            "capacity",
        )?,
        current_count: to_u32(
            row.try_get("current_count")
                .map_err(|e| column_err("current_count", e))?,
            "current_count",
        )?,
        status: status.parse()?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
    })
}

fn membership_from_row(row: &SqliteRow) -> AppResult<Membership> {
    let status: String = row.try_get("status").map_err(|e| column_err("status", e))?;
    Ok(Membership {
        group_id: GroupId(row.try_get("group_id").map_err(|e| column_err("group_id", e))?),
        user_id: UserId::new_unchecked(
            row.try_get::<String, _>("user_id")
                .map_err(|e| column_err("user_id", e))?,
        ),
        status: status.parse()?,
        joined_at: time_column(row, "joined_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> AppResult<UserProfile> {
    Ok(UserProfile {
        id: UserId::new_unchecked(row.try_get::<String, _>("id").map_err(|e| column_err("id", e))?),
        email: row.try_get("email").map_err(|e| column_err("email", e))?,
        name: row.try_get("name").map_err(|e| column_err("name", e))?,
        is_premium: row.try_get("is_premium").map_err(|e| column_err("is_premium", e))?,
        attended_count: to_u32(
            row.try_get("attended_count")
                .map_err(|e| column_err("attended_count", e))?,
            "attended_count",
        )?,
    })
}

fn badge_from_row(row: &SqliteRow) -> AppResult<Badge> {
    Ok(Badge {
        id: row.try_get("id").map_err(|e| column_err("id", e))?,
        code: row.try_get("code").map_err(|e| column_err("code", e))?,
        name: row.try_get("name").map_err(|e| column_err("name", e))?,
        description: row.try_get("description").map_err(|e| column_err("description", e))?,
    })
}

#[async_trait]
impl DatabaseInterface for SqliteDatabase {
    async fn begin_transaction(&self) -> AppResult<DatabaseTransaction> {
        let tx =
            self.pool.begin().await.map_err(|e| {
                AppError::DatabaseError(format!("Failed to begin transaction: {}", e))
            })?;
        Ok(DatabaseTransaction::new_sqlite(tx))
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    async fn upsert_user(
        &self,
        id: &UserId,
        email: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<UserProfile> {
        let now = to_millis(now);
        sqlx::query(
            "INSERT INTO users (id, email, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET email = excluded.email, name = excluded.name, updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(email)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to upsert user {}: {}", id, e)))?;

        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after upsert", id)))
    }

    async fn set_premium(&self, id: &UserId, is_premium: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET is_premium = ? WHERE id = ?")
            .bind(is_premium)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to update premium flag for {}: {}", id, e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get user {}: {}", id, e)))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &UserId,
    ) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(tx.conn())
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get user {} in transaction: {}", id, e))
            })?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_group(&self, id: GroupId) -> AppResult<Option<Group>> {
        let row = sqlx::query(&format!("SELECT {} FROM meetup_groups g WHERE g.id = ?", GROUP_COLUMNS))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get group {}: {}", id, e)))?;

        row.as_ref().map(group_from_row).transpose()
    }

    async fn list_groups(&self, filter: &GroupFilter) -> AppResult<Vec<Group>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM meetup_groups g WHERE 1 = 1",
            GROUP_COLUMNS
        ));

        if let Some(sport) = &filter.sport_type {
            qb.push(" AND g.sport_type = ");
            qb.push_bind(sport.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND g.status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(after) = filter.scheduled_after {
            qb.push(" AND g.scheduled_time > ");
            qb.push_bind(to_millis(after));
        }

        qb.push(" ORDER BY g.scheduled_time ASC");

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list groups: {}", e)))?;

        rows.iter().map(group_from_row).collect()
    }

    async fn list_groups_for_user(&self, user: &UserId) -> AppResult<Vec<(Group, Membership)>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, m.group_id AS group_id, m.user_id AS user_id, m.status AS membership_status, m.joined_at AS joined_at
             FROM memberships m JOIN meetup_groups g ON g.id = m.group_id
             WHERE m.user_id = ? AND m.status != 'LEFT'
             ORDER BY g.scheduled_time ASC",
            GROUP_COLUMNS
        ))
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to list groups for user {}: {}", user, e))
        })?;

        rows.iter()
            .map(|row| {
                let group = group_from_row(row)?;
                let status: String = row
                    .try_get("membership_status")
                    .map_err(|e| column_err("membership_status", e))?;
                let membership = Membership {
                    group_id: group.id,
                    user_id: user.clone(),
                    status: status.parse()?,
                    joined_at: time_column(row, "joined_at")?,
                };
                Ok((group, membership))
            })
            .collect()
    }

    async fn count_groups_created_by(&self, user: &UserId) -> AppResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM meetup_groups WHERE creator_id = ?")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to count groups created by {}: {}", user, e))
            })?;
        let n: i64 = row.try_get("n").map_err(|e| column_err("n", e))?;
        Ok(n as u64)
    }

    async fn expired_group_ids(&self, now: DateTime<Utc>) -> AppResult<Vec<GroupId>> {
        let rows = sqlx::query(
            "SELECT id FROM meetup_groups WHERE status IN ('OPEN', 'FULL') AND scheduled_time < ? ORDER BY scheduled_time ASC",
        )
        .bind(to_millis(now))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to find expired groups: {}", e)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>("id")
                    .map(GroupId)
                    .map_err(|e| column_err("id", e))
            })
            .collect()
    }

    async fn insert_group_tx(&self, tx: &mut DatabaseTransaction, group: &Group) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO meetup_groups (id, creator_id, sport_type, title, description, location, level, scheduled_time, capacity, current_count, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(group.id.value())
        .bind(group.creator_id.as_str())
        .bind(&group.sport_type)
        .bind(&group.title)
        .bind(&group.description)
        .bind(&group.location)
        .bind(&group.level)
        .bind(to_millis(group.scheduled_time))
        .bind(group.capacity as i64)
        .bind(group.current_count as i64)
        .bind(group.status.as_str())
        .bind(to_millis(group.created_at))
        .bind(to_millis(group.updated_at))
        .execute(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create group {} in transaction: {}", group.id, e))
        })?;
        Ok(())
    }

    async fn lock_group_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: GroupId,
    ) -> AppResult<Option<Group>> {
        // A write as the first statement takes SQLite's write lock up front,
        // so the read below can never be invalidated by a concurrent writer.
        let claimed = sqlx::query("UPDATE meetup_groups SET updated_at = updated_at WHERE id = ?")
            .bind(id.value())
            .execute(tx.conn())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to lock group {}: {}", id, e)))?;

        if claimed.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query(&format!("SELECT {} FROM meetup_groups g WHERE g.id = ?", GROUP_COLUMNS))
            .bind(id.value())
            .fetch_optional(tx.conn())
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to read locked group {}: {}", id, e))
            })?;

        row.as_ref().map(group_from_row).transpose()
    }

    async fn write_ledger_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: GroupId,
        ledger: &CapacityLedger,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE meetup_groups SET current_count = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(ledger.current_count as i64)
        .bind(ledger.status.as_str())
        .bind(to_millis(now))
        .bind(id.value())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to update ledger of group {}: {}", id, e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Group {} not found", id)));
        }
        Ok(())
    }

    async fn find_membership_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
        user: &UserId,
    ) -> AppResult<Option<Membership>> {
        let row = sqlx::query(
            "SELECT group_id, user_id, status, joined_at FROM memberships WHERE group_id = ? AND user_id = ?",
        )
        .bind(group.value())
        .bind(user.as_str())
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to get membership of {} in group {}: {}",
                user, group, e
            ))
        })?;

        row.as_ref().map(membership_from_row).transpose()
    }

    async fn upsert_membership_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
        user: &UserId,
        status: MembershipStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        // Every (re-)entry takes a fresh seq so equal joined_at values keep
        // the order in which users entered, not when their row was first created
        sqlx::query(
            "INSERT INTO memberships (group_id, user_id, status, joined_at, seq)
             VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM memberships))
             ON CONFLICT(group_id, user_id) DO UPDATE
             SET status = excluded.status, joined_at = excluded.joined_at, seq = excluded.seq",
        )
        .bind(group.value())
        .bind(user.as_str())
        .bind(status.as_str())
        .bind(to_millis(at))
        .execute(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to upsert membership of {} in group {}: {}",
                user, group, e
            ))
        })?;
        Ok(())
    }

    async fn mark_left_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
        user: &UserId,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE memberships SET status = 'LEFT' WHERE group_id = ? AND user_id = ?",
        )
        .bind(group.value())
        .bind(user.as_str())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to mark {} as left in group {}: {}",
                user, group, e
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Membership of {} in group {} not found",
                user, group
            )));
        }
        Ok(())
    }

    async fn next_waitlisted_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
    ) -> AppResult<Option<Membership>> {
        let row = sqlx::query(
            "SELECT group_id, user_id, status, joined_at FROM memberships
             WHERE group_id = ? AND status = 'WAITLIST'
             ORDER BY joined_at ASC, seq ASC
             LIMIT 1",
        )
        .bind(group.value())
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to read waitlist of group {}: {}", group, e))
        })?;

        row.as_ref().map(membership_from_row).transpose()
    }

    async fn count_joined_tx(&self, tx: &mut DatabaseTransaction, group: GroupId) -> AppResult<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM memberships WHERE group_id = ? AND status = 'JOINED'",
        )
        .bind(group.value())
        .fetch_one(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to count members of group {}: {}", group, e))
        })?;
        to_u32(row.try_get("n").map_err(|e| column_err("n", e))?, "n")
    }

    async fn list_members(&self, group: GroupId) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query(
            "SELECT group_id, user_id, status, joined_at FROM memberships
             WHERE group_id = ? AND status != 'LEFT'
             ORDER BY joined_at ASC, seq ASC",
        )
        .bind(group.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to list members of group {}: {}", group, e))
        })?;

        rows.iter().map(membership_from_row).collect()
    }

    async fn find_memberships_by_user(&self, user: &UserId) -> AppResult<Vec<AttendedSession>> {
        let rows = sqlx::query(
            "SELECT m.group_id AS group_id, g.sport_type AS sport_type, g.scheduled_time AS scheduled_time
             FROM memberships m JOIN meetup_groups g ON g.id = m.group_id
             WHERE m.user_id = ? AND m.status = 'JOINED'
             ORDER BY g.scheduled_time DESC",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to get memberships of {}: {}", user, e))
        })?;

        rows.iter()
            .map(|row| {
                Ok(AttendedSession {
                    group_id: GroupId(row.try_get("group_id").map_err(|e| column_err("group_id", e))?),
                    sport_type: row.try_get("sport_type").map_err(|e| column_err("sport_type", e))?,
                    scheduled_time: time_column(row, "scheduled_time")?,
                })
            })
            .collect()
    }

    async fn credit_attendance_tx(
        &self,
        tx: &mut DatabaseTransaction,
        group: GroupId,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE users SET attended_count = attended_count + 1
             WHERE id IN (SELECT user_id FROM memberships WHERE group_id = ? AND status = 'JOINED')",
        )
        .bind(group.value())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to credit attendance for group {}: {}",
                group, e
            ))
        })?;
        Ok(result.rows_affected())
    }

    async fn list_badges(&self) -> AppResult<Vec<Badge>> {
        let rows = sqlx::query("SELECT id, code, name, description FROM badges ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list badges: {}", e)))?;

        rows.iter().map(badge_from_row).collect()
    }

    async fn unlocked_badge_codes(&self, user: &UserId) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT b.code AS code FROM user_badges ub JOIN badges b ON b.id = ub.badge_id WHERE ub.user_id = ?",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to get unlocked badges of {}: {}", user, e))
        })?;

        rows.iter()
            .map(|row| row.try_get("code").map_err(|e| column_err("code", e)))
            .collect()
    }

    async fn list_user_badges(&self, user: &UserId) -> AppResult<Vec<UserBadge>> {
        let rows = sqlx::query(
            "SELECT b.id AS id, b.code AS code, b.name AS name, b.description AS description, ub.unlocked_at AS unlocked_at
             FROM user_badges ub JOIN badges b ON b.id = ub.badge_id
             WHERE ub.user_id = ?
             ORDER BY ub.unlocked_at ASC, b.id ASC",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to list badges of {}: {}", user, e))
        })?;

        rows.iter()
            .map(|row| {
                Ok(UserBadge {
                    badge: badge_from_row(row)?,
                    unlocked_at: time_column(row, "unlocked_at")?,
                })
            })
            .collect()
    }

    async fn unlock_badge_if_absent(
        &self,
        user: &UserId,
        badge_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_badges (user_id, badge_id, unlocked_at) VALUES (?, ?, ?)",
        )
        .bind(user.as_str())
        .bind(badge_id)
        .bind(to_millis(at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to unlock badge {} for {}: {}", badge_id, user, e))
        })?;
        Ok(result.rows_affected() == 1)
    }
}
