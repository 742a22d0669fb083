use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::core::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Snowflake node id, below 1024
    pub node_id: u16,
    pub sweep_interval_secs: u64,
    /// Offset used for week/month boundaries and the early-morning badge
    pub local_utc_offset_minutes: i32,
    pub waitlist_requires_premium: bool,
    pub admin_user_ids: Vec<String>,
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/meetup.db".to_string()),
                max_connections: var_or("DB_MAX_CONNECTIONS", 10),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: var_or("SERVER_PORT", 3000),
            },
            cache: CacheConfig {
                capacity: var_or("CACHE_CAPACITY", 1000),
            },
            engine: EngineConfig {
                node_id: var_or("NODE_ID", 0),
                sweep_interval_secs: var_or("SWEEP_INTERVAL_SECS", 60),
                local_utc_offset_minutes: var_or("LOCAL_UTC_OFFSET_MINUTES", 0),
                waitlist_requires_premium: var_or("WAITLIST_REQUIRES_PREMIUM", true),
                admin_user_ids: env::var("ADMIN_USER_IDS")
                    .map(|v| parse_list(&v))
                    .unwrap_or_default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine.node_id >= 1024 {
            anyhow::bail!("NODE_ID must be below 1024, got {}", self.engine.node_id);
        }
        if self.local_offset().is_none() {
            anyhow::bail!(
                "LOCAL_UTC_OFFSET_MINUTES out of range: {}",
                self.engine.local_utc_offset_minutes
            );
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn local_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.engine.local_utc_offset_minutes.checked_mul(60)?)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.engine.sweep_interval_secs.max(1))
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.engine.admin_user_ids.iter().any(|id| id == user.as_str())
    }

    /// In-memory defaults used by tests and embedded setups
    pub fn for_tests() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            cache: CacheConfig { capacity: 64 },
            engine: EngineConfig {
                node_id: 1,
                sweep_interval_secs: 60,
                local_utc_offset_minutes: 0,
                waitlist_requires_premium: true,
                admin_user_ids: vec!["admin".to_string()],
            },
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
