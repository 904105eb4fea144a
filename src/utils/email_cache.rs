use std::time::Duration;

use anyhow::Result;
use futures_util::{StreamExt, TryStreamExt};
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

/// Registered emails seen recently (login, register, warmup). Absence means
/// "ask the database", never "available".
static TAKEN: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000)
        .time_to_idle(Duration::from_secs(24 * 60 * 60))
        .build()
});

fn key(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn mark_taken(email: &str) {
    TAKEN.insert(key(email), ()).await;
}

pub async fn is_taken(email: &str) -> bool {
    TAKEN.contains_key(&key(email))
}

/// Preloads users who logged in within the last `days`, `batch_size` rows at a time.
pub async fn warmup_email_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut batches = sqlx::query_scalar::<_, String>(
        "SELECT email FROM users WHERE last_login_at >= NOW() - INTERVAL ? DAY",
    )
    .bind(days)
    .fetch(pool)
    .try_chunks(batch_size.max(1));

    let mut loaded = 0usize;
    while let Some(batch) = batches.next().await {
        let batch = batch.map_err(|e| e.1)?;
        loaded += batch.len();
        futures::future::join_all(batch.iter().map(|email| mark_taken(email))).await;
    }

    log::info!("Email cache warmup complete: {} users active in the last {} days", loaded, days);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn lookups_ignore_case_and_padding() {
        assert!(!is_taken("cache.test@agency.gov").await);
        mark_taken(" Cache.Test@Agency.gov").await;
        assert!(is_taken("cache.test@agency.gov").await);
    }
}
