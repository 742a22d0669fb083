mod common;

use chrono::Duration;
use std::time::Duration as StdDuration;

use campus_meetup::{
    core::{Clock, GroupId},
    error::{AppError, ConflictKind},
    infrastructure::GroupEvent,
    models::{GroupStatus, MembershipStatus},
};
use common::{assert_conflict, harness, new_group};

#[tokio::test]
async fn test_fill_group_to_capacity() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("basketball", 4))
        .await
        .unwrap();
    assert_eq!(group.current_count, 1);
    assert_eq!(group.status, GroupStatus::Open);

    for name in ["a", "b", "c"] {
        let user = h.user(name).await;
        h.state.lifecycle.join_group(group.id, &user).await.unwrap();
    }

    let view = h.checked_group(group.id).await;
    assert_eq!(view.group.current_count, 4);
    assert_eq!(view.group.status, GroupStatus::Full);

    let late = h.user("late").await;
    assert_conflict(h.state.lifecycle.join_group(group.id, &late).await, ConflictKind::GroupFull);
    assert_eq!(h.checked_group(group.id).await.group.current_count, 4);
}

#[tokio::test]
async fn test_leave_reopens_without_waitlist() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("soccer", 4))
        .await
        .unwrap();
    let mut members = Vec::new();
    for name in ["a", "b", "c"] {
        let user = h.user(name).await;
        h.state.lifecycle.join_group(group.id, &user).await.unwrap();
        members.push(user);
    }

    let outcome = h.state.lifecycle.leave_group(group.id, &members[1]).await.unwrap();
    assert_eq!(outcome.promoted, None);
    assert_eq!(outcome.group.current_count, 3);
    assert_eq!(outcome.group.status, GroupStatus::Open);

    let view = h.checked_group(group.id).await;
    assert_eq!(view.group.status, GroupStatus::Open);
    assert!(view.members.iter().all(|m| m.user_id != members[1]));
}

#[tokio::test]
async fn test_leave_promotes_waitlisted_user() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let waiting = h.premium_user("waiting").await;

    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("tennis", 2))
        .await
        .unwrap();
    h.state.lifecycle.join_group(group.id, &member).await.unwrap();
    h.state.lifecycle.waitlist_group(group.id, &waiting).await.unwrap();

    let before = h.checked_group(group.id).await;
    assert_eq!(before.group.status, GroupStatus::Full);
    assert_eq!(before.group.current_count, 2);

    let outcome = h.state.lifecycle.leave_group(group.id, &member).await.unwrap();
    assert_eq!(outcome.promoted, Some(waiting.clone()));
    assert_eq!(outcome.group.current_count, 2);
    assert_eq!(outcome.group.status, GroupStatus::Full);

    let after = h.checked_group(group.id).await;
    let promoted = after.members.iter().find(|m| m.user_id == waiting).unwrap();
    assert_eq!(promoted.status, MembershipStatus::Joined);
}

#[tokio::test]
async fn test_promotion_is_first_come_first_served() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let first = h.premium_user("first").await;
    let second = h.premium_user("second").await;

    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("badminton", 2))
        .await
        .unwrap();
    h.state.lifecycle.join_group(group.id, &member).await.unwrap();

    h.state.lifecycle.waitlist_group(group.id, &first).await.unwrap();
    h.clock.advance(Duration::minutes(1));
    h.state.lifecycle.waitlist_group(group.id, &second).await.unwrap();

    let outcome = h.state.lifecycle.leave_group(group.id, &member).await.unwrap();
    assert_eq!(outcome.promoted, Some(first.clone()));

    let view = h.checked_group(group.id).await;
    let still_waiting = view.members.iter().find(|m| m.user_id == second).unwrap();
    assert_eq!(still_waiting.status, MembershipStatus::Waitlist);

    // Next free slot goes to the remaining waitlisted user
    let outcome = h.state.lifecycle.leave_group(group.id, &first).await.unwrap();
    assert_eq!(outcome.promoted, Some(second));
    h.checked_group(group.id).await;
}

#[tokio::test]
async fn test_returning_user_queues_behind_earlier_waitlister() {
    // The clock never moves, so every joined_at below is identical
    let h = harness().await;
    let creator = h.user("creator").await;
    let returning = h.premium_user("returning").await;
    let m = h.user("m").await;
    let n = h.user("n").await;
    let first = h.premium_user("first").await;

    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("volleyball", 3))
        .await
        .unwrap();
    h.state.lifecycle.join_group(group.id, &returning).await.unwrap();
    h.state.lifecycle.leave_group(group.id, &returning).await.unwrap();
    h.state.lifecycle.join_group(group.id, &m).await.unwrap();
    h.state.lifecycle.join_group(group.id, &n).await.unwrap();

    h.state.lifecycle.waitlist_group(group.id, &first).await.unwrap();
    h.state.lifecycle.waitlist_group(group.id, &returning).await.unwrap();

    let outcome = h.state.lifecycle.leave_group(group.id, &m).await.unwrap();
    assert_eq!(outcome.promoted, Some(first));
    assert_eq!(outcome.group.status, GroupStatus::Full);

    let outcome = h.state.lifecycle.leave_group(group.id, &n).await.unwrap();
    assert_eq!(outcome.promoted, Some(returning));
    h.checked_group(group.id).await;
}

#[tokio::test]
async fn test_sweeper_completes_expired_group() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, new_group("volleyball", 6, h.clock.now() + Duration::minutes(30)))
        .await
        .unwrap();
    h.state.lifecycle.join_group(group.id, &member).await.unwrap();

    // Not expired yet
    assert_eq!(h.state.sweeper.sweep_once().await.unwrap(), 0);

    h.clock.advance(Duration::minutes(90));
    assert_eq!(h.state.sweeper.sweep_once().await.unwrap(), 1);
    assert_eq!(h.checked_group(group.id).await.group.status, GroupStatus::Completed);

    // Idempotent
    assert_eq!(h.state.sweeper.sweep_once().await.unwrap(), 0);

    let latecomer = h.user("latecomer").await;
    assert_conflict(
        h.state.lifecycle.join_group(group.id, &latecomer).await,
        ConflictKind::NotOpen,
    );
    assert_conflict(h.state.lifecycle.leave_group(group.id, &member).await, ConflictKind::NotOpen);

    // Attendance credited exactly once to every member
    for user in [&creator, &member] {
        let profile = h.state.database.get_user(user).await.unwrap().unwrap();
        assert_eq!(profile.attended_count, 1);
    }
    let profile = h.state.database.get_user(&latecomer).await.unwrap().unwrap();
    assert_eq!(profile.attended_count, 0);
}

#[tokio::test]
async fn test_sweeper_skips_cancelled_groups() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, new_group("yoga", 4, h.clock.now() + Duration::minutes(10)))
        .await
        .unwrap();
    h.state.lifecycle.cancel_group(group.id, &creator).await.unwrap();

    h.clock.advance(Duration::hours(1));
    assert_eq!(h.state.sweeper.sweep_once().await.unwrap(), 0);
    assert_eq!(h.checked_group(group.id).await.group.status, GroupStatus::Cancelled);
}

#[tokio::test]
async fn test_join_rejections() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("running", 5))
        .await
        .unwrap();

    let missing = h.state.lifecycle.join_group(GroupId(404), &member).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    assert_conflict(h.state.lifecycle.join_group(group.id, &creator).await, ConflictKind::AlreadyJoined);

    h.state.lifecycle.join_group(group.id, &member).await.unwrap();
    assert_conflict(h.state.lifecycle.join_group(group.id, &member).await, ConflictKind::AlreadyJoined);

    let stranger = campus_meetup::core::UserId::from("never-signed-in");
    let unknown = h.state.lifecycle.join_group(group.id, &stranger).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    assert_eq!(h.checked_group(group.id).await.group.current_count, 2);
}

#[tokio::test]
async fn test_leave_rejections_and_rejoin() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let outsider = h.user("outsider").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("cycling", 3))
        .await
        .unwrap();

    assert_conflict(
        h.state.lifecycle.leave_group(group.id, &creator).await,
        ConflictKind::CreatorCannotLeave,
    );
    assert_conflict(h.state.lifecycle.leave_group(group.id, &outsider).await, ConflictKind::NotMember);

    h.state.lifecycle.join_group(group.id, &member).await.unwrap();
    h.state.lifecycle.leave_group(group.id, &member).await.unwrap();
    assert_conflict(h.state.lifecycle.leave_group(group.id, &member).await, ConflictKind::NotMember);

    // LEFT can be re-entered
    let rejoined = h.state.lifecycle.join_group(group.id, &member).await.unwrap();
    assert_eq!(rejoined.current_count, 2);
    h.checked_group(group.id).await;
}

#[tokio::test]
async fn test_waitlist_rules() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let free = h.user("free").await;
    let premium = h.premium_user("premium").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("swimming", 3))
        .await
        .unwrap();

    let denied = h.state.lifecycle.waitlist_group(group.id, &free).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let missing = h.state.lifecycle.waitlist_group(GroupId(404), &premium).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let membership = h.state.lifecycle.waitlist_group(group.id, &premium).await.unwrap();
    assert_eq!(membership.status, MembershipStatus::Waitlist);
    assert_conflict(
        h.state.lifecycle.waitlist_group(group.id, &premium).await,
        ConflictKind::AlreadyWaitlisted,
    );

    let view = h.checked_group(group.id).await;
    assert_eq!(view.group.current_count, 1);
    assert_eq!(view.group.status, GroupStatus::Open);

    // A waitlisted user may still take a free slot directly
    h.state.lifecycle.join_group(group.id, &premium).await.unwrap();
    assert_conflict(
        h.state.lifecycle.waitlist_group(group.id, &premium).await,
        ConflictKind::AlreadyJoined,
    );
    let view = h.checked_group(group.id).await;
    let active = view.members.iter().filter(|m| m.user_id == premium).count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_single_seat_group_starts_full() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let other = h.user("other").await;
    let waiting = h.premium_user("waiting").await;

    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("table tennis", 1))
        .await
        .unwrap();
    assert_eq!(group.status, GroupStatus::Full);
    assert_eq!(group.current_count, 1);

    assert_conflict(h.state.lifecycle.join_group(group.id, &other).await, ConflictKind::GroupFull);
    h.state.lifecycle.waitlist_group(group.id, &waiting).await.unwrap();
    assert_eq!(h.checked_group(group.id).await.group.current_count, 1);
}

#[tokio::test]
async fn test_full_group_can_be_cancelled() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("soccer", 2))
        .await
        .unwrap();
    let full = h.state.lifecycle.join_group(group.id, &member).await.unwrap();
    assert_eq!(full.status, GroupStatus::Full);

    let cancelled = h.state.lifecycle.cancel_group(group.id, &creator).await.unwrap();
    assert_eq!(cancelled.status, GroupStatus::Cancelled);
    assert_eq!(cancelled.current_count, 2);
    assert_eq!(h.checked_group(group.id).await.group.status, GroupStatus::Cancelled);
}

#[tokio::test]
async fn test_create_validation() {
    let h = harness().await;
    let creator = h.user("creator").await;

    let zero = h.state.lifecycle.create_group(&creator, h.new_group("gym", 0)).await;
    assert!(matches!(zero, Err(AppError::Validation(_))));

    let past = new_group("gym", 4, h.clock.now() - Duration::hours(1));
    let past = h.state.lifecycle.create_group(&creator, past).await;
    assert!(matches!(past, Err(AppError::Validation(_))));

    let ghost = campus_meetup::core::UserId::from("ghost");
    let unknown = h.state.lifecycle.create_group(&ghost, h.new_group("gym", 4)).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_cancel_group() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let waiting = h.premium_user("waiting").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("tennis", 4))
        .await
        .unwrap();
    h.state.lifecycle.join_group(group.id, &member).await.unwrap();

    let forbidden = h.state.lifecycle.cancel_group(group.id, &member).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let cancelled = h.state.lifecycle.cancel_group(group.id, &creator).await.unwrap();
    assert_eq!(cancelled.status, GroupStatus::Cancelled);
    assert_eq!(cancelled.current_count, 2);

    assert_conflict(h.state.lifecycle.cancel_group(group.id, &creator).await, ConflictKind::NotOpen);
    assert_conflict(h.state.lifecycle.join_group(group.id, &waiting).await, ConflictKind::NotOpen);
    assert_conflict(h.state.lifecycle.leave_group(group.id, &member).await, ConflictKind::NotOpen);
    assert_conflict(h.state.lifecycle.waitlist_group(group.id, &waiting).await, ConflictKind::NotOpen);
    h.checked_group(group.id).await;
}

#[tokio::test]
async fn test_events_follow_mutations() {
    let h = harness().await;
    let mut events = h.state.publisher.subscribe();
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let waiting = h.premium_user("waiting").await;

    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("basketball", 2))
        .await
        .unwrap();
    match events.recv().await.unwrap() {
        GroupEvent::GroupCreated { group: created } => assert_eq!(created.id, group.id),
        other => panic!("unexpected event {:?}", other),
    }

    h.state.lifecycle.join_group(group.id, &member).await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        GroupEvent::GroupUpdated {
            id: group.id,
            current_count: 2,
            status: GroupStatus::Full,
        }
    );

    // Waitlisting does not touch the ledger and publishes nothing
    h.state.lifecycle.waitlist_group(group.id, &waiting).await.unwrap();

    // Leave with promotion publishes one event with the final state
    h.state.lifecycle.leave_group(group.id, &member).await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        GroupEvent::GroupUpdated {
            id: group.id,
            current_count: 2,
            status: GroupStatus::Full,
        }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_join_notifies_organizer() {
    let h = harness().await;
    let creator = h.user("organizer").await;
    let joiner = h.user("joiner").await;
    let group = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("soccer", 2))
        .await
        .unwrap();

    h.state.lifecycle.join_group(group.id, &joiner).await.unwrap();

    let sent = h.mailer.wait_for(1, StdDuration::from_secs(2)).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "organizer@uni.edu");
    assert_eq!(sent[0].organizer_name, "organizer");
    assert_eq!(sent[0].joiner_name, "joiner");
    assert_eq!(sent[0].group_title, group.title);
    assert_eq!(sent[0].sport_type, "soccer");
    assert_eq!(sent[0].time, group.scheduled_time);
    assert!(sent[0].is_full);
}

#[tokio::test]
async fn test_group_queries() {
    let h = harness().await;
    let creator = h.user("creator").await;
    let member = h.user("member").await;
    let tennis = h
        .state
        .lifecycle
        .create_group(&creator, h.new_group("tennis", 4))
        .await
        .unwrap();
    let yoga = h
        .state
        .lifecycle
        .create_group(&creator, new_group("yoga", 4, h.clock.now() + Duration::days(2)))
        .await
        .unwrap();
    h.state.lifecycle.join_group(yoga.id, &member).await.unwrap();

    let all = h
        .state
        .lifecycle
        .list_groups(&Default::default())
        .await
        .unwrap();
    assert_eq!(all.iter().map(|g| g.id).collect::<Vec<_>>(), vec![tennis.id, yoga.id]);

    let filter = campus_meetup::models::GroupFilter {
        sport_type: Some("yoga".to_string()),
        ..Default::default()
    };
    let only_yoga = h.state.lifecycle.list_groups(&filter).await.unwrap();
    assert_eq!(only_yoga.len(), 1);
    assert_eq!(only_yoga[0].id, yoga.id);

    let mine = h.state.lifecycle.list_user_groups(&member).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].0.id, yoga.id);
    assert_eq!(mine[0].1.status, MembershipStatus::Joined);

    let missing = h.state.lifecycle.get_group(GroupId(1)).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}
