// Derived statistics and gamification

pub mod aggregator;
pub mod badges;
pub mod streak;

pub use aggregator::{aggregate, StatsService, UserStats};
pub use badges::{BadgeEvaluator, BADGE_CATALOG};
pub use streak::{compute_streak, Streak};
