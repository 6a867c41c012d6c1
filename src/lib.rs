pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use anyhow::Result;

use crate::config::rate_limits::RateLimits;
use crate::config::AppConfig;
use crate::infra::{cache::RedisCache, db::Db, mailer::Mailer};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub mailer: Mailer,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub search_page_size: i64,
    pub rate_limits: RateLimits,
    pub reminder_interval_seconds: u64,
    pub reminder_lock_ttl_seconds: u64,
}

impl AppState {
    /// Connect every backing service named by the config.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let db = Db::connect(config).await?;
        let cache = RedisCache::connect(&config.redis_url).await?;
        let mailer = Mailer::from_config(config)?;

        Ok(Self {
            db,
            cache,
            mailer,
            paseto_access_key: config.paseto_access_key,
            access_ttl_minutes: config.access_ttl_minutes,
            search_page_size: config.search_page_size,
            rate_limits: config.rate_limits,
            reminder_interval_seconds: config.reminder_interval_seconds,
            reminder_lock_ttl_seconds: config.reminder_lock_ttl_seconds,
        })
    }
}
