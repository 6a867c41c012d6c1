use anyhow::Result;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::notifications::{NotificationService, ReminderReport};
use crate::infra::{cache::RedisCache, db::Db, mailer::Mailer};

const LOCK_KEY: &str = "lock:reminder-sweep";

/// Outcome of one scheduled invocation.
#[derive(Debug)]
pub enum SweepOutcome {
    Completed(ReminderReport),
    /// Another process held the sweep lock.
    Skipped,
}

/// Run one reminder sweep under a Redis lock so overlapping schedulers
/// never sweep at the same time.
pub async fn run_once(
    db: &Db,
    cache: &RedisCache,
    mailer: &Mailer,
    lock_ttl_seconds: u64,
    now: OffsetDateTime,
) -> Result<SweepOutcome> {
    let token = Uuid::new_v4().to_string();
    if !cache.try_lock(LOCK_KEY, &token, lock_ttl_seconds).await? {
        info!("reminder sweep already running elsewhere, skipping");
        return Ok(SweepOutcome::Skipped);
    }

    let result = NotificationService::new(db.clone(), mailer.clone())
        .send_upcoming_reminders(now)
        .await;

    if let Err(err) = cache.release_lock(LOCK_KEY, &token).await {
        warn!(error = ?err, "failed to release reminder lock");
    }

    Ok(SweepOutcome::Completed(result?))
}

/// Sweep forever at a fixed interval. Failures are logged and retried next tick.
pub async fn run(
    db: Db,
    cache: RedisCache,
    mailer: Mailer,
    interval_seconds: u64,
    lock_ttl_seconds: u64,
) -> Result<()> {
    info!(interval_seconds, "reminder worker started");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    loop {
        ticker.tick().await;
        if let Err(err) = run_once(
            &db,
            &cache,
            &mailer,
            lock_ttl_seconds,
            OffsetDateTime::now_utc(),
        )
        .await
        {
            error!(error = ?err, "reminder sweep failed");
        }
    }
}
