use redis::Client as RedisClient;
use shared::rate_limit::{get_rate_limit_key, RateLimitCheck, RateLimitType};
use std::time::Duration;

use crate::error::Error;

/// Counts one attempt for `identifier` and fails once the window's budget is spent.
/// Redis being unreachable lets the request through.
pub async fn enforce(redis: &RedisClient, limit_type: RateLimitType, identifier: &str) -> Result<(), Error> {
    let key = get_rate_limit_key(limit_type, identifier);
    enforce_key(
        redis,
        &key,
        limit_type.get_max_attempts(),
        limit_type.get_window(),
        limit_type.get_error_message(),
    )
    .await
}

pub async fn enforce_key(
    redis: &RedisClient,
    key: &str,
    max_attempts: u32,
    window: Duration,
    message: &'static str,
) -> Result<(), Error> {
    let mut conn = match redis.get_async_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("Rate limiter skipped, redis unavailable: {}", e);
            return Ok(());
        }
    };

    let attempts: Option<u32> = redis::cmd("GET")
        .arg(key)
        .query_async(&mut conn)
        .await
        .unwrap_or(None);

    let check = RateLimitCheck::with_max(attempts.unwrap_or(0), max_attempts);
    if check.is_locked {
        tracing::warn!("Rate limit hit for {}", key);
        return Err(Error::RateLimited(message));
    }

    // INCR keeps the window that started with the first attempt.
    let current: u32 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
    if current == 1 {
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window.as_secs())
            .query_async(&mut conn)
            .await?;
    }
    tracing::trace!("{} has {} attempts left", key, check.remaining_attempts.saturating_sub(1));

    Ok(())
}
