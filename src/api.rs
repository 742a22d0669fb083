// HTTP binding of the meetup engine

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::{
    app_state::AppState,
    core::{GroupId, UserId},
    error::{AppError, AppResult},
    infrastructure::middleware::{viewer_context_middleware, Vc},
    models::{Badge, Group, GroupFilter, GroupStatus, GroupWithMembers, Membership,
        MembershipStatus, NewGroup, UserBadge, UserProfile},
    stats::UserStats,
};

#[derive(Debug, Deserialize)]
pub struct ListGroupsQuery {
    pub sport_type: Option<String>,
    pub status: Option<GroupStatus>,
    /// Only groups scheduled in the future
    #[serde(default)]
    pub upcoming: bool,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub group: Group,
    pub new_badges: Vec<Badge>,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub group: Group,
    pub promoted: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct UserGroupView {
    #[serde(flatten)]
    pub group: Group,
    pub membership_status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PremiumRequest {
    pub is_premium: bool,
}

fn require_admin(state: &AppState, vc: &Vc) -> AppResult<()> {
    let user = vc.require_user()?;
    if !state.config.is_admin(user) {
        return Err(AppError::Forbidden("Administrator access required".to_string()));
    }
    Ok(())
}

pub async fn health_handler(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.database.health_check().await?;
    Ok(Json(json!({"status": "ok"})))
}

pub async fn list_groups_handler(
    State(state): State<AppState>,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Vec<Group>>, AppError> {
    let filter = GroupFilter {
        sport_type: query.sport_type,
        status: query.status,
        scheduled_after: query.upcoming.then(|| state.clock.now()),
        limit: query.limit,
    };
    Ok(Json(state.lifecycle.list_groups(&filter).await?))
}

pub async fn create_group_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(input): Json<NewGroup>,
) -> Result<(StatusCode, Json<Group>), AppError> {
    let user = vc.require_user()?;
    let group = state.lifecycle.create_group(user, input).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<GroupWithMembers>, AppError> {
    Ok(Json(state.lifecycle.get_group(GroupId(id)).await?))
}

pub async fn join_group_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<JoinResponse>, AppError> {
    let user = vc.require_user()?;
    let group = state.lifecycle.join_group(GroupId(id), user).await?;

    // The join is committed; badge evaluation failures only cost the badges
    let new_badges = match state.badges.check_and_unlock(user).await {
        Ok(badges) => badges,
        Err(e) => {
            warn!(user_id = %user, error = %e, "Post-join badge evaluation failed");
            Vec::new()
        }
    };
    Ok(Json(JoinResponse { group, new_badges }))
}

pub async fn leave_group_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<LeaveResponse>, AppError> {
    let user = vc.require_user()?;
    let outcome = state.lifecycle.leave_group(GroupId(id), user).await?;
    Ok(Json(LeaveResponse {
        group: outcome.group,
        promoted: outcome.promoted,
    }))
}

pub async fn waitlist_group_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Membership>, AppError> {
    let user = vc.require_user()?;
    Ok(Json(state.lifecycle.waitlist_group(GroupId(id), user).await?))
}

pub async fn cancel_group_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Group>, AppError> {
    let user = vc.require_user()?;
    Ok(Json(state.lifecycle.cancel_group(GroupId(id), user).await?))
}

pub async fn me_handler(State(state): State<AppState>, vc: Vc) -> Result<Json<UserProfile>, AppError> {
    let user = vc.require_user()?;
    state
        .directory
        .get(user)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user)))
}

pub async fn my_groups_handler(
    State(state): State<AppState>,
    vc: Vc,
) -> Result<Json<Vec<UserGroupView>>, AppError> {
    let user = vc.require_user()?;
    let groups = state
        .lifecycle
        .list_user_groups(user)
        .await?
        .into_iter()
        .map(|(group, membership)| UserGroupView {
            group,
            membership_status: membership.status,
            joined_at: membership.joined_at,
        })
        .collect();
    Ok(Json(groups))
}

pub async fn my_stats_handler(State(state): State<AppState>, vc: Vc) -> Result<Json<UserStats>, AppError> {
    let user = vc.require_user()?;
    Ok(Json(state.stats.user_stats(user).await?))
}

pub async fn user_stats_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<UserStats>, AppError> {
    Ok(Json(state.stats.user_stats(&UserId::new_unchecked(id)).await?))
}

pub async fn check_badges_handler(
    State(state): State<AppState>,
    vc: Vc,
) -> Result<Json<Vec<Badge>>, AppError> {
    let user = vc.require_user()?;
    Ok(Json(state.badges.check_and_unlock(user).await?))
}

pub async fn user_badges_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Vec<UserBadge>>, AppError> {
    Ok(Json(state.badges.list_user_badges(&UserId::new_unchecked(id)).await?))
}

pub async fn list_badges_handler(State(state): State<AppState>) -> Result<Json<Vec<Badge>>, AppError> {
    Ok(Json(state.badges.list_badges().await?))
}

pub async fn sweep_handler(State(state): State<AppState>, vc: Vc) -> Result<Json<Value>, AppError> {
    require_admin(&state, &vc)?;
    let completed = state.sweeper.sweep_once().await?;
    Ok(Json(json!({"completed": completed})))
}

pub async fn set_premium_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<PremiumRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &vc)?;
    let user = UserId::new(id).map_err(|e| AppError::Validation(e.to_string()))?;
    state.directory.set_premium(&user, body.is_premium).await?;
    Ok(Json(json!({"id": user, "is_premium": body.is_premium})))
}

pub fn create_meetup_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))

        // Groups
        .route("/groups", get(list_groups_handler).post(create_group_handler))
        .route("/groups/{id}", get(get_group_handler))
        .route("/groups/{id}/join", post(join_group_handler))
        .route("/groups/{id}/leave", post(leave_group_handler))
        .route("/groups/{id}/waitlist", post(waitlist_group_handler))
        .route("/groups/{id}/cancel", post(cancel_group_handler))

        // Users, statistics and badges
        .route("/users/me", get(me_handler))
        .route("/users/me/groups", get(my_groups_handler))
        .route("/users/me/stats", get(my_stats_handler))
        .route("/users/me/badges/check", post(check_badges_handler))
        .route("/users/{id}/stats", get(user_stats_handler))
        .route("/users/{id}/badges", get(user_badges_handler))
        .route("/badges", get(list_badges_handler))

        // Administration
        .route("/admin/sweep", post(sweep_handler))
        .route("/admin/users/{id}/premium", put(set_premium_handler))

        .layer(middleware::from_fn_with_state(state.clone(), viewer_context_middleware))
        .with_state(state)
}
