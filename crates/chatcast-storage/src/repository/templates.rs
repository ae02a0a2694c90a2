//! Template repository
//!
//! Templates are created and edited elsewhere; the pipeline only reads them.

use chatcast_common::types::{ChannelId, TemplateId};
use sqlx::PgPool;

use crate::models::Template;

/// Template repository
#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    /// Create a new template repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a template by ID
    pub async fn get(&self, id: TemplateId) -> Result<Option<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a template by name and language within a channel
    pub async fn find_by_name(
        &self,
        channel_id: ChannelId,
        name: &str,
        language: &str,
    ) -> Result<Option<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>(
            "SELECT * FROM templates WHERE channel_id = $1 AND name = $2 AND language = $3",
        )
        .bind(channel_id)
        .bind(name)
        .bind(language)
        .fetch_optional(&self.pool)
        .await
    }
}
