#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use campus_meetup::{
    app_state::AppState,
    config::Config,
    core::{Clock, ManualClock, UserId},
    error::{AppError, ConflictKind},
    infrastructure::{DatabaseInterface, RecordingMailer, SqliteDatabase},
    models::{GroupWithMembers, MembershipStatus, NewGroup},
};

pub struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
}

/// Wednesday noon UTC
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
}

pub async fn harness() -> Harness {
    let database = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
    harness_with(Config::for_tests(), database)
}

pub fn harness_with(config: Config, database: Arc<dyn DatabaseInterface>) -> Harness {
    let clock = Arc::new(ManualClock::new(start_time()));
    let mailer = Arc::new(RecordingMailer::new());
    let state = AppState::build(config, database, clock.clone(), mailer.clone()).unwrap();
    Harness {
        state,
        clock,
        mailer,
    }
}

impl Harness {
    pub async fn user(&self, id: &str) -> UserId {
        let user = UserId::from(id);
        self.state
            .directory
            .upsert(&user, &format!("{}@uni.edu", id), id, self.clock.now())
            .await
            .unwrap();
        user
    }

    pub async fn premium_user(&self, id: &str) -> UserId {
        let user = self.user(id).await;
        self.state.directory.set_premium(&user, true).await.unwrap();
        user
    }

    pub fn new_group(&self, sport: &str, capacity: u32) -> NewGroup {
        new_group(sport, capacity, self.clock.now() + Duration::days(1))
    }

    /// Group plus the invariants every committed state must satisfy
    pub async fn checked_group(&self, id: campus_meetup::core::GroupId) -> GroupWithMembers {
        let view = self.state.lifecycle.get_group(id).await.unwrap();
        let joined = view
            .members
            .iter()
            .filter(|m| m.status == MembershipStatus::Joined)
            .count() as u32;
        assert_eq!(view.group.current_count, joined, "counter diverged from members");
        assert!(view.group.current_count <= view.group.capacity);
        view
    }
}

pub fn new_group(sport: &str, capacity: u32, at: DateTime<Utc>) -> NewGroup {
    NewGroup {
        sport_type: sport.to_string(),
        title: format!("{} meetup", sport),
        description: Some("Bring water".to_string()),
        scheduled_time: at,
        location: "Campus rec center".to_string(),
        level: "intermediate".to_string(),
        capacity,
    }
}

pub fn assert_conflict<T: std::fmt::Debug>(result: Result<T, AppError>, kind: ConflictKind) {
    match result {
        Err(AppError::Conflict(actual)) => assert_eq!(actual, kind),
        other => panic!("expected conflict {:?}, got {:?}", kind, other),
    }
}
