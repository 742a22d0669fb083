// Waitlist entitlement - policy gate evaluated before a user may waitlist

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::UserId;
use crate::error::AppResult;
use crate::infrastructure::user_directory::UserDirectory;

#[async_trait]
pub trait WaitlistEntitlement: Send + Sync {
    /// Whether `user` may join waitlists
    async fn evaluate(&self, user: &UserId) -> AppResult<bool>;

    fn name(&self) -> &str;
}

/// Waitlisting is a premium feature; unknown users are denied
pub struct PremiumOnly {
    directory: Arc<UserDirectory>,
}

impl PremiumOnly {
    pub fn new(directory: Arc<UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl WaitlistEntitlement for PremiumOnly {
    async fn evaluate(&self, user: &UserId) -> AppResult<bool> {
        Ok(self
            .directory
            .get(user)
            .await?
            .map(|profile| profile.is_premium)
            .unwrap_or(false))
    }

    fn name(&self) -> &str {
        "premium_only"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl WaitlistEntitlement for AllowAll {
    async fn evaluate(&self, _user: &UserId) -> AppResult<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "allow_all"
    }
}
