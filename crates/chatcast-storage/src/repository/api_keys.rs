//! API key repository
//!
//! Keys are looked up by prefix and verified against the stored hash by the
//! caller, so the plaintext never reaches the database.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ApiKey;

/// API key repository
#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    /// Create a new API key repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find candidate keys by prefix
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_prefix = $1")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
    }

    /// Stamp a key's last use
    pub async fn update_last_used(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
