// Statistics Aggregator - activity hours, calories, sport mix and streaks
// derived on demand from a user's JOINED membership history.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::{Clock, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::models::AttendedSession;
use crate::stats::streak::compute_streak;

/// Every session counts as two hours; actual check-in times are not tracked
pub const SESSION_HOURS: f64 = 2.0;

const DEFAULT_KCAL_PER_HOUR: u32 = 400;
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Estimated kcal burned per hour of a sport
pub fn kcal_per_hour(sport: &str) -> u32 {
    let normalized = sport.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "soccer" | "football" => 600,
        "basketball" => 550,
        "tennis" => 500,
        "badminton" => 450,
        "volleyball" => 400,
        "running" => 700,
        "swimming" => 550,
        "cycling" => 500,
        "table_tennis" => 300,
        "yoga" => 250,
        "gym" => 450,
        _ => DEFAULT_KCAL_PER_HOUR,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SportShare {
    pub sport: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyHours {
    pub day: &'static str,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub weekly_hours: f64,
    pub monthly_hours: f64,
    pub total_calories: u32,
    pub total_sessions: u32,
    pub sport_distribution: Vec<SportShare>,
    /// Monday through Sunday of the current week
    pub weekly_data: Vec<DailyHours>,
}

fn local_midnight(date: NaiveDate, offset: &FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local - Duration::seconds(offset.local_minus_utc() as i64)))
}

/// Aggregate the sessions scheduled before `now`.
///
/// Week (Monday 00:00) and month boundaries are taken in `offset`. Streak
/// dates use the UTC calendar date of each session.
pub fn aggregate(sessions: &[AttendedSession], now: DateTime<Utc>, offset: FixedOffset) -> UserStats {
    let local_today = now.with_timezone(&offset).date_naive();
    let week_start = local_midnight(
        local_today - Duration::days(local_today.weekday().num_days_from_monday() as i64),
        &offset,
    );
    let month_start = local_midnight(local_today.with_day(1).unwrap_or(local_today), &offset);

    let mut weekly_hours = 0.0;
    let mut monthly_hours = 0.0;
    let mut total_calories = 0;
    let mut total_sessions = 0;
    let mut by_sport: BTreeMap<String, u32> = BTreeMap::new();
    let mut daily = [0.0_f64; 7];

    let past: Vec<&AttendedSession> = sessions.iter().filter(|s| s.scheduled_time < now).collect();
    for session in &past {
        total_sessions += 1;
        total_calories += kcal_per_hour(&session.sport_type) * SESSION_HOURS as u32;
        *by_sport.entry(session.sport_type.clone()).or_insert(0) += 1;

        if session.scheduled_time >= month_start {
            monthly_hours += SESSION_HOURS;
        }
        if session.scheduled_time >= week_start {
            weekly_hours += SESSION_HOURS;
            let weekday = session
                .scheduled_time
                .with_timezone(&offset)
                .weekday()
                .num_days_from_monday() as usize;
            daily[weekday] += SESSION_HOURS;
        }
    }

    let mut sport_distribution: Vec<SportShare> = by_sport
        .into_iter()
        .map(|(sport, count)| SportShare { sport, count })
        .collect();
    sport_distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sport.cmp(&b.sport)));

    let streak = compute_streak(
        past.iter().map(|s| s.scheduled_time.date_naive()),
        now.date_naive(),
    );

    UserStats {
        current_streak: streak.current,
        longest_streak: streak.longest,
        weekly_hours,
        monthly_hours,
        total_calories,
        total_sessions,
        sport_distribution,
        weekly_data: WEEKDAYS
            .iter()
            .zip(daily)
            .map(|(day, hours)| DailyHours { day, hours })
            .collect(),
    }
}

/// Per-request statistics for a user; nothing is cached
pub struct StatsService {
    database: Arc<dyn DatabaseInterface>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl StatsService {
    pub fn new(database: Arc<dyn DatabaseInterface>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            database,
            clock,
            offset,
        }
    }

    pub async fn user_stats(&self, user: &UserId) -> AppResult<UserStats> {
        if self.database.get_user(user).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user)));
        }
        let sessions = self.database.find_memberships_by_user(user).await?;
        debug!(user_id = %user, sessions = sessions.len(), "Aggregating user stats");
        Ok(aggregate(&sessions, self.clock.now(), self.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GroupId;

    fn session(sport: &str, time: DateTime<Utc>) -> AttendedSession {
        AttendedSession {
            group_id: GroupId(1),
            sport_type: sport.to_string(),
            scheduled_time: time,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    // Wednesday
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn calorie_table_with_default() {
        assert_eq!(kcal_per_hour("Basketball"), 550);
        assert_eq!(kcal_per_hour("table tennis"), 300);
        assert_eq!(kcal_per_hour("curling"), 400);
    }

    #[test]
    fn future_sessions_are_ignored() {
        let stats = aggregate(&[session("tennis", now() + Duration::hours(1))], now(), utc());
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.total_calories, 0);
        assert!(stats.sport_distribution.is_empty());
    }

    #[test]
    fn week_and_month_windows() {
        let sessions = vec![
            // Monday of this week
            session("tennis", Utc.with_ymd_and_hms(2024, 5, 13, 9, 0, 0).unwrap()),
            // Sunday before, same month
            session("tennis", Utc.with_ymd_and_hms(2024, 5, 12, 9, 0, 0).unwrap()),
            // Previous month
            session("running", Utc.with_ymd_and_hms(2024, 4, 30, 9, 0, 0).unwrap()),
        ];
        let stats = aggregate(&sessions, now(), utc());

        assert_eq!(stats.weekly_hours, 2.0);
        assert_eq!(stats.monthly_hours, 4.0);
        assert_eq!(stats.total_calories, 500 * 2 * 2 + 700 * 2);
        assert_eq!(stats.weekly_data.len(), 7);
        assert_eq!(stats.weekly_data[0].day, "Mon");
        assert_eq!(stats.weekly_data[0].hours, 2.0);
        assert_eq!(
            stats.sport_distribution,
            vec![
                SportShare { sport: "tennis".into(), count: 2 },
                SportShare { sport: "running".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn week_start_follows_local_offset() {
        // Sunday 23:30 UTC is already Monday in UTC+2
        let late_sunday = Utc.with_ymd_and_hms(2024, 5, 12, 23, 30, 0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();

        let local = aggregate(&[session("yoga", late_sunday)], now(), plus_two);
        assert_eq!(local.weekly_hours, 2.0);
        assert_eq!(local.weekly_data[0].hours, 2.0);

        let utc_stats = aggregate(&[session("yoga", late_sunday)], now(), utc());
        assert_eq!(utc_stats.weekly_hours, 0.0);
    }

    #[test]
    fn streak_from_sessions() {
        let sessions: Vec<_> = (1..=3)
            .map(|d| session("gym", now() - Duration::days(d)))
            .collect();
        let stats = aggregate(&sessions, now(), utc());
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.longest_streak, 3);
    }
}
