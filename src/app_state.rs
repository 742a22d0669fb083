use anyhow::anyhow;
use std::sync::Arc;

use crate::{
    config::Config,
    core::{Clock, SystemClock},
    engine::{ExpirySweeper, GroupLifecycle},
    infrastructure::{
        AllowAll, BroadcastPublisher, DatabaseInterface, GroupLocks, IdGenerator, LogMailer,
        Mailer, NotificationQueue, PremiumOnly, SqliteDatabase, UserDirectory, WaitlistEntitlement,
    },
    stats::{BadgeEvaluator, StatsService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub database: Arc<dyn DatabaseInterface>,
    pub directory: Arc<UserDirectory>,
    pub publisher: Arc<BroadcastPublisher>,
    pub lifecycle: Arc<GroupLifecycle>,
    pub sweeper: Arc<ExpirySweeper>,
    pub stats: Arc<StatsService>,
    pub badges: Arc<BadgeEvaluator>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let database =
            SqliteDatabase::connect(&config.database.url, config.database.max_connections).await?;
        Self::build(config, Arc::new(database), Arc::new(SystemClock), Arc::new(LogMailer))
    }

    /// Wire the engine around an existing database. Spawns the notification
    /// worker, so it must run inside a tokio runtime.
    pub fn build(
        config: Config,
        database: Arc<dyn DatabaseInterface>,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let offset = config
            .local_offset()
            .ok_or_else(|| anyhow!("Invalid local UTC offset"))?;
        let ids = Arc::new(IdGenerator::new(config.engine.node_id)?);
        let locks = Arc::new(GroupLocks::new());
        let directory = Arc::new(UserDirectory::new(database.clone(), config.cache.capacity));
        let publisher = Arc::new(BroadcastPublisher::new());

        let entitlement: Arc<dyn WaitlistEntitlement> = if config.engine.waitlist_requires_premium
        {
            Arc::new(PremiumOnly::new(directory.clone()))
        } else {
            Arc::new(AllowAll)
        };

        let (notifications, _worker) = NotificationQueue::spawn(directory.clone(), mailer);

        let lifecycle = Arc::new(GroupLifecycle::new(
            database.clone(),
            locks.clone(),
            ids,
            clock.clone(),
            publisher.clone(),
            notifications,
            entitlement,
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            database.clone(),
            locks,
            clock.clone(),
            publisher.clone(),
        ));
        let stats = Arc::new(StatsService::new(database.clone(), clock.clone(), offset));
        let badges = Arc::new(BadgeEvaluator::new(database.clone(), clock.clone(), offset));

        Ok(Self {
            config,
            clock,
            database,
            directory,
            publisher,
            lifecycle,
            sweeper,
            stats,
            badges,
        })
    }
}
