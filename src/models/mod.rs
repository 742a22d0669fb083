// Domain models - groups, memberships, profiles and badges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{GroupId, UserId};
use crate::error::{AppError, AppResult};

/// Group status. OPEN and FULL are the live states, CANCELLED and COMPLETED
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    Open,
    Full,
    Cancelled,
    Completed,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Open => "OPEN",
            GroupStatus::Full => "FULL",
            GroupStatus::Cancelled => "CANCELLED",
            GroupStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, GroupStatus::Open | GroupStatus::Full)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(GroupStatus::Open),
            "FULL" => Ok(GroupStatus::Full),
            "CANCELLED" => Ok(GroupStatus::Cancelled),
            "COMPLETED" => Ok(GroupStatus::Completed),
            other => Err(AppError::Validation(format!("Unknown group status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    Joined,
    Waitlist,
    Left,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Joined => "JOINED",
            MembershipStatus::Waitlist => "WAITLIST",
            MembershipStatus::Left => "LEFT",
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JOINED" => Ok(MembershipStatus::Joined),
            "WAITLIST" => Ok(MembershipStatus::Waitlist),
            "LEFT" => Ok(MembershipStatus::Left),
            other => Err(AppError::Validation(format!(
                "Unknown membership status: {}",
                other
            ))),
        }
    }
}

/// A scheduled, capacity-bounded sports meetup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub creator_id: UserId,
    pub sport_type: String,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub level: String,
    pub scheduled_time: DateTime<Utc>,
    pub capacity: u32,
    pub current_count: u32,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroup {
    pub sport_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub location: String,
    pub level: String,
    pub capacity: u32,
}

impl NewGroup {
    pub fn validate(&self, now: DateTime<Utc>) -> AppResult<()> {
        if self.capacity < 1 {
            return Err(AppError::Validation("Capacity must be at least 1".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        if self.sport_type.trim().is_empty() {
            return Err(AppError::Validation("Sport type is required".to_string()));
        }
        if self.location.trim().is_empty() {
            return Err(AppError::Validation("Location is required".to_string()));
        }
        if self.scheduled_time <= now {
            return Err(AppError::Validation(
                "Scheduled time must be in the future".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
}

/// One JOINED membership of a user, carrying the group fields the
/// statistics and badge engines read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendedSession {
    pub group_id: GroupId,
    pub sport_type: String,
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupWithMembers {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<Membership>,
}

/// Filter for listing groups
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupFilter {
    pub sport_type: Option<String>,
    pub status: Option<GroupStatus>,
    /// Only groups scheduled after this instant
    pub scheduled_after: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

/// Profile of a user verified by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub is_premium: bool,
    pub attended_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBadge {
    pub badge: Badge,
    pub unlocked_at: DateTime<Utc>,
}
