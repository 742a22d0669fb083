// User directory - cached profile lookups in front of the database

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::UserId;
use crate::error::AppResult;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::database::DatabaseInterface;
use crate::models::UserProfile;

/// Profiles are read for every notification and every entitlement check,
/// so they are kept in an LRU cache. Writes go through and refresh it.
pub struct UserDirectory {
    database: Arc<dyn DatabaseInterface>,
    cache: Mutex<Cache<UserId, UserProfile>>,
}

impl UserDirectory {
    pub fn new(database: Arc<dyn DatabaseInterface>, capacity: usize) -> Self {
        Self {
            database,
            cache: Mutex::new(Cache::new(capacity)),
        }
    }

    pub async fn get(&self, id: &UserId) -> AppResult<Option<UserProfile>> {
        if let Some(profile) = self.cache.lock().await.get(id) {
            return Ok(Some(profile));
        }

        let profile = self.database.get_user(id).await?;
        if let Some(profile) = &profile {
            debug!(user_id = %id, "Cached user profile");
            self.cache.lock().await.insert(id.clone(), profile.clone());
        }
        Ok(profile)
    }

    /// Record the identity provider's view of a user
    pub async fn upsert(
        &self,
        id: &UserId,
        email: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<UserProfile> {
        let profile = self.database.upsert_user(id, email, name, now).await?;
        self.cache.lock().await.insert(id.clone(), profile.clone());
        Ok(profile)
    }

    pub async fn set_premium(&self, id: &UserId, is_premium: bool) -> AppResult<()> {
        self.database.set_premium(id, is_premium).await?;
        self.invalidate(id).await;
        Ok(())
    }

    /// Forget a cached profile, e.g. after its attended count changed
    pub async fn invalidate(&self, id: &UserId) {
        self.cache.lock().await.remove(id);
    }
}
