use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use super::LeadStore;
use crate::error::AppResult;
use crate::types::{Answers, ConversationState, TenantChannelConfig};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies the embedded migrations.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }
}

fn parse_answers(raw: &str) -> Answers {
    // Older rows may hold non-string JSON values; keep them as their JSON text.
    let value: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
    value
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let text = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_conversation_row(row: sqlx::postgres::PgRow) -> ConversationState {
    ConversationState {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        customer_phone: row.get("customer_phone"),
        current_node: row.get("current_node"),
        answers: parse_answers(&row.get::<String, _>("answers")),
        slug: row.get("slug"),
        handoff_to_human: row.get("handoff_to_human"),
        last_inbound_at: row
            .get::<Option<String>, _>("last_inbound_at")
            .unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn find_tenant_channel(&self, phone_number_id: &str) -> AppResult<Option<TenantChannelConfig>> {
        let row = sqlx::query(
            "SELECT tenant_id, phone_number_id, access_token, graph_version \
             FROM tenant_whatsapp WHERE phone_number_id = $1 LIMIT 1",
        )
        .bind(phone_number_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| TenantChannelConfig {
            tenant_id: row.get("tenant_id"),
            phone_number_id: row.get("phone_number_id"),
            access_token: row.get("access_token"),
            graph_version: row.get("graph_version"),
        }))
    }

    async fn load_tenant_tree(&self, tenant_id: &str) -> AppResult<Option<Value>> {
        let raw = sqlx::query_scalar::<_, String>("SELECT tree FROM tenant_trees WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn dedupe_seen(&self, message_id: &str) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, String>("SELECT id FROM wa_inbound_dedupe WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn dedupe_insert(&self, message_id: &str, tenant_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO wa_inbound_dedupe (id, tenant_id, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(message_id)
        .bind(tenant_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn load_conversation(&self, tenant_id: &str, customer_phone: &str) -> AppResult<Option<ConversationState>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, customer_phone, current_node, answers, slug, handoff_to_human, \
                    last_inbound_at, created_at, updated_at \
             FROM conversations WHERE tenant_id = $1 AND customer_phone = $2 LIMIT 1",
        )
        .bind(tenant_id)
        .bind(customer_phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(parse_conversation_row))
    }

    async fn upsert_conversation(&self, state: &ConversationState) -> AppResult<()> {
        let answers = serde_json::to_string(&state.answers)?;
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, tenant_id, customer_phone, current_node, answers, slug,
                handoff_to_human, last_inbound_at, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            ON CONFLICT (tenant_id, customer_phone) DO UPDATE SET
                current_node = EXCLUDED.current_node,
                answers = EXCLUDED.answers,
                slug = COALESCE(NULLIF(conversations.slug, ''), EXCLUDED.slug),
                handoff_to_human = conversations.handoff_to_human OR EXCLUDED.handoff_to_human,
                last_inbound_at = EXCLUDED.last_inbound_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&state.id)
        .bind(&state.tenant_id)
        .bind(&state.customer_phone)
        .bind(&state.current_node)
        .bind(answers)
        .bind(&state.slug)
        .bind(state.handoff_to_human)
        .bind(&state.last_inbound_at)
        .bind(&state.created_at)
        .bind(&state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn slug_taken(&self, tenant_id: &str, slug: &str) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, String>(
            "SELECT id FROM conversations WHERE tenant_id = $1 AND slug = $2 LIMIT 1",
        )
        .bind(tenant_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_column_tolerates_legacy_values() {
        let answers = parse_answers(r#"{"name":"Ana","age":31,"vip":true}"#);
        assert_eq!(answers.get("name").map(String::as_str), Some("Ana"));
        assert_eq!(answers.get("age").map(String::as_str), Some("31"));
        assert_eq!(answers.get("vip").map(String::as_str), Some("true"));
    }

    #[test]
    fn unreadable_answers_become_empty() {
        assert!(parse_answers("not json").is_empty());
        assert!(parse_answers("[]").is_empty());
    }
}
