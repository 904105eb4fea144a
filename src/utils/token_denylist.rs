use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use futures_util::StreamExt;
use moka::Expiry;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

/// Keeps each revoked jti until the token itself would have expired.
struct UntilTokenExpiry;

impl Expiry<String, i64> for UntilTokenExpiry {
    fn expire_after_create(&self, _jti: &String, exp: &i64, _created_at: Instant) -> Option<Duration> {
        let left = (*exp - Utc::now().timestamp()).max(0) as u64;
        Some(Duration::from_secs(left))
    }
}

/// jti -> token expiry (unix seconds)
static REVOKED: Lazy<Cache<String, i64>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(1_000_000)
        .expire_after(UntilTokenExpiry)
        .build()
});

pub async fn revoke(jti: &str, exp: i64) {
    REVOKED.insert(jti.to_string(), exp).await;
}

pub async fn is_revoked(jti: &str) -> bool {
    REVOKED.get(jti).await.is_some()
}

/// Reloads revocations that are still relevant after a restart.
pub async fn warmup_denylist(pool: &MySqlPool) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT jti, CAST(UNIX_TIMESTAMP(expires_at) AS SIGNED)
        FROM revoked_tokens
        WHERE expires_at > NOW()
        "#,
    )
    .fetch(pool);

    let mut total = 0usize;
    while let Some(row) = stream.next().await {
        let (jti, exp) = row?;
        revoke(&jti, exp).await;
        total += 1;
    }

    log::info!("Token denylist warmup complete: {} revoked tokens", total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn revoked_jti_is_reported() {
        let exp = Utc::now().timestamp() + 600;
        assert!(!is_revoked("jti-denylist-test").await);
        revoke("jti-denylist-test", exp).await;
        assert!(is_revoked("jti-denylist-test").await);
    }
}
