use anyhow::Result;
use redis::AsyncCommands;

use crate::config::rate_limits::{current_window, PublicAction, RateLimits};
use crate::infra::cache::RedisCache;

pub struct RateLimitInfo {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(cache: RedisCache, limits: RateLimits) -> Self {
        Self { cache, limits }
    }

    /// Quota check for an anonymous client, keyed by IP address.
    pub async fn check_ip_rate_limit(&self, ip: &str, action: PublicAction) -> Result<RateLimitInfo> {
        let limit = self.limits.limit_for(action);
        let key = window_key(ip, action);

        let mut conn = self.cache.client().get_multiplexed_async_connection().await?;
        let count: u32 = conn.get(&key).await.unwrap_or(0);

        if count >= limit {
            tracing::debug!(
                ip = ip,
                action = action.as_str(),
                count = count,
                limit = limit,
                "IP rate limit exceeded"
            );
            return Ok(RateLimitInfo {
                limited: true,
                limit,
                remaining: 0,
            });
        }

        Ok(RateLimitInfo {
            limited: false,
            limit,
            remaining: limit - count,
        })
    }

    pub async fn increment_ip(&self, ip: &str, action: PublicAction) -> Result<()> {
        let key = window_key(ip, action);
        let window_seconds = action.window().seconds();

        let mut conn = self.cache.client().get_multiplexed_async_connection().await?;

        let count: u32 = conn.get(&key).await.unwrap_or(0);
        let _: () = conn.incr(&key, 1).await?;

        // Set expiration on first increment
        if count == 0 {
            let _: () = conn.expire(&key, window_seconds as i64).await?;
        }

        Ok(())
    }
}

fn window_key(ip: &str, action: PublicAction) -> String {
    format!(
        "ratelimit:ip:{}:{}:{}",
        ip,
        action.as_str(),
        current_window(action.window().seconds())
    )
}
