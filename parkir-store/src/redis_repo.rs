use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parkir_core::repository::QrTokenRepository;
use parkir_core::{LedgerError, LedgerResult};
use redis::RedisResult;
use uuid::Uuid;

/// Redis-backed rate limiting and QR replay guard.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    used_token_ttl_seconds: u64,
}

impl RedisClient {
    /// `used_token_ttl_seconds` should outlive the QR validity window so a
    /// used marker never expires before the token itself does.
    pub fn new(connection_string: &str, used_token_ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            used_token_ttl_seconds: used_token_ttl_seconds.max(1),
        })
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }

    async fn set_once(&self, key: &str, value: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX: only the first writer gets "OK"
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(self.used_token_ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("DEL").arg(key).query_async::<i64>(&mut conn).await?;
        Ok(())
    }
}

fn used_key(jti: Uuid) -> String {
    format!("qr:used:{}", jti)
}

#[async_trait]
impl QrTokenRepository for RedisClient {
    async fn mark_used(&self, jti: Uuid, used_at: DateTime<Utc>) -> LedgerResult<bool> {
        self.set_once(&used_key(jti), &used_at.to_rfc3339())
            .await
            .map_err(|e| LedgerError::Storage(format!("redis: {}", e)))
    }

    async fn release_use(&self, jti: Uuid) -> LedgerResult<()> {
        self.delete(&used_key(jti))
            .await
            .map_err(|e| LedgerError::Storage(format!("redis: {}", e)))
    }
}
