// Infrastructure - storage, ids, caching, locks and outbound side effects

pub mod cache;
pub mod database;
pub mod entitlement;
pub mod events;
pub mod group_locks;
pub mod id_generator;
pub mod middleware;
pub mod notifications;
pub mod sqlite_database;
pub mod user_directory;

pub use database::{DatabaseInterface, DatabaseTransaction};
pub use entitlement::{AllowAll, PremiumOnly, WaitlistEntitlement};
pub use events::{BroadcastPublisher, EventPublisher, GroupEvent, NoopPublisher};
pub use group_locks::GroupLocks;
pub use id_generator::IdGenerator;
pub use notifications::{JoinNotification, LogMailer, Mailer, NotificationQueue, RecordingMailer};
pub use sqlite_database::SqliteDatabase;
pub use user_directory::UserDirectory;
