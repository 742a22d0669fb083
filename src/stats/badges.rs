// Badge Evaluator - unlocks achievements whose counting threshold is met

use chrono::{FixedOffset, Timelike};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{Clock, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::models::{AttendedSession, Badge, UserBadge};

/// Sessions starting before this local hour count as early morning
pub const EARLY_MORNING_HOUR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeRule {
    JoinedAtLeast(u64),
    CreatedAtLeast(u64),
    DistinctSportsAtLeast(u64),
    EarlyMorningAtLeast(u64),
    AttendedAtLeast(u64),
}

impl BadgeRule {
    pub fn is_satisfied(&self, counters: &BadgeCounters) -> bool {
        match *self {
            BadgeRule::JoinedAtLeast(n) => counters.joined >= n,
            BadgeRule::CreatedAtLeast(n) => counters.created >= n,
            BadgeRule::DistinctSportsAtLeast(n) => counters.distinct_sports >= n,
            BadgeRule::EarlyMorningAtLeast(n) => counters.early_morning >= n,
            BadgeRule::AttendedAtLeast(n) => counters.attended >= n,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BadgeDefinition {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub rule: BadgeRule,
}

pub const BADGE_CATALOG: &[BadgeDefinition] = &[
    BadgeDefinition {
        code: "first_step",
        name: "First Step",
        description: "Join your first group",
        rule: BadgeRule::JoinedAtLeast(1),
    },
    BadgeDefinition {
        code: "social_butterfly",
        name: "Social Butterfly",
        description: "Join 10 groups",
        rule: BadgeRule::JoinedAtLeast(10),
    },
    BadgeDefinition {
        code: "team_leader",
        name: "Team Leader",
        description: "Organize 5 groups",
        rule: BadgeRule::CreatedAtLeast(5),
    },
    BadgeDefinition {
        code: "iron_man",
        name: "Iron Man",
        description: "Play 3 different sports",
        rule: BadgeRule::DistinctSportsAtLeast(3),
    },
    BadgeDefinition {
        code: "early_bird",
        name: "Early Bird",
        description: "Join 5 groups that start before 8am",
        rule: BadgeRule::EarlyMorningAtLeast(5),
    },
    BadgeDefinition {
        code: "consistent",
        name: "Consistent",
        description: "Attend 5 completed groups",
        rule: BadgeRule::AttendedAtLeast(5),
    },
];

/// Aggregate counters the badge rules are evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BadgeCounters {
    pub joined: u64,
    pub created: u64,
    pub distinct_sports: u64,
    pub early_morning: u64,
    pub attended: u64,
}

impl BadgeCounters {
    pub fn from_sessions(
        sessions: &[AttendedSession],
        created: u64,
        attended: u64,
        offset: FixedOffset,
    ) -> Self {
        let sports: HashSet<String> = sessions
            .iter()
            .map(|s| s.sport_type.trim().to_lowercase())
            .collect();
        let early_morning = sessions
            .iter()
            .filter(|s| s.scheduled_time.with_timezone(&offset).hour() < EARLY_MORNING_HOUR)
            .count();

        Self {
            joined: sessions.len() as u64,
            created,
            distinct_sports: sports.len() as u64,
            early_morning: early_morning as u64,
            attended,
        }
    }
}

/// Codes of catalog badges satisfied by `counters` and not in `unlocked`
pub fn newly_earned(counters: &BadgeCounters, unlocked: &HashSet<String>) -> Vec<&'static str> {
    BADGE_CATALOG
        .iter()
        .filter(|def| !unlocked.contains(def.code) && def.rule.is_satisfied(counters))
        .map(|def| def.code)
        .collect()
}

pub struct BadgeEvaluator {
    database: Arc<dyn DatabaseInterface>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl BadgeEvaluator {
    pub fn new(database: Arc<dyn DatabaseInterface>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            database,
            clock,
            offset,
        }
    }

    /// Unlock every badge whose threshold is now met. Returns only the badges
    /// this call unlocked; calling again without new activity returns nothing.
    pub async fn check_and_unlock(&self, user: &UserId) -> AppResult<Vec<Badge>> {
        let profile = self
            .database
            .get_user(user)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user)))?;

        let unlocked: HashSet<String> = self
            .database
            .unlocked_badge_codes(user)
            .await?
            .into_iter()
            .collect();
        if unlocked.len() >= BADGE_CATALOG.len() {
            return Ok(Vec::new());
        }

        let sessions = self.database.find_memberships_by_user(user).await?;
        let created = self.database.count_groups_created_by(user).await?;
        let counters =
            BadgeCounters::from_sessions(&sessions, created, profile.attended_count as u64, self.offset);

        let earned = newly_earned(&counters, &unlocked);
        if earned.is_empty() {
            return Ok(Vec::new());
        }

        let catalog: HashMap<String, Badge> = self
            .database
            .list_badges()
            .await?
            .into_iter()
            .map(|badge| (badge.code.clone(), badge))
            .collect();

        let now = self.clock.now();
        let mut newly_unlocked = Vec::new();
        for code in earned {
            let badge = match catalog.get(code) {
                Some(badge) => badge,
                None => {
                    warn!(code, "Badge missing from catalog table");
                    continue;
                }
            };
            // A concurrent evaluation may have inserted it first
            if self.database.unlock_badge_if_absent(user, badge.id, now).await? {
                info!(user_id = %user, badge = code, "Badge unlocked");
                newly_unlocked.push(badge.clone());
            }
        }
        Ok(newly_unlocked)
    }

    pub async fn list_badges(&self) -> AppResult<Vec<Badge>> {
        self.database.list_badges().await
    }

    pub async fn list_user_badges(&self, user: &UserId) -> AppResult<Vec<UserBadge>> {
        self.database.list_user_badges(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GroupId;
    use chrono::{DateTime, TimeZone, Utc};

    fn session(sport: &str, time: DateTime<Utc>) -> AttendedSession {
        AttendedSession {
            group_id: GroupId(1),
            sport_type: sport.to_string(),
            scheduled_time: time,
        }
    }

    #[test]
    fn catalog_codes_are_unique() {
        let codes: HashSet<_> = BADGE_CATALOG.iter().map(|d| d.code).collect();
        assert_eq!(codes.len(), BADGE_CATALOG.len());
    }

    #[test]
    fn counters_from_sessions() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let sessions = vec![
            session("Tennis", Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap()),
            session("tennis", Utc.with_ymd_and_hms(2024, 1, 2, 18, 0, 0).unwrap()),
            session("yoga", Utc.with_ymd_and_hms(2024, 1, 3, 6, 30, 0).unwrap()),
        ];
        let counters = BadgeCounters::from_sessions(&sessions, 2, 4, utc);
        assert_eq!(
            counters,
            BadgeCounters {
                joined: 3,
                created: 2,
                distinct_sports: 2,
                early_morning: 2,
                attended: 4,
            }
        );

        // 07:00 UTC is 09:00 in UTC+2
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(BadgeCounters::from_sessions(&sessions, 0, 0, plus_two).early_morning, 1);
    }

    #[test]
    fn thresholds_and_already_unlocked() {
        let counters = BadgeCounters {
            joined: 3,
            created: 0,
            distinct_sports: 3,
            early_morning: 0,
            attended: 5,
        };
        let earned = newly_earned(&counters, &HashSet::new());
        assert_eq!(earned, vec!["first_step", "iron_man", "consistent"]);

        let unlocked: HashSet<String> = ["first_step".to_string()].into_iter().collect();
        assert_eq!(newly_earned(&counters, &unlocked), vec!["iron_man", "consistent"]);
    }
}
