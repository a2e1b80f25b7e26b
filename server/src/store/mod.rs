//! Persistence seam for the conversation engine.
//!
//! The engine owns conversations and dedupe records; tenant channel rows and
//! saved trees belong to the dashboard and are only read here.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppResult;
use crate::types::{ConversationState, TenantChannelConfig};

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find_tenant_channel(&self, phone_number_id: &str) -> AppResult<Option<TenantChannelConfig>>;

    /// Raw JSON tree saved for the tenant, if any.
    async fn load_tenant_tree(&self, tenant_id: &str) -> AppResult<Option<Value>>;

    async fn dedupe_seen(&self, message_id: &str) -> AppResult<bool>;

    /// Records a message id. Returns `false` when another delivery already
    /// recorded it (unique-key conflict).
    async fn dedupe_insert(&self, message_id: &str, tenant_id: &str) -> AppResult<bool>;

    async fn load_conversation(&self, tenant_id: &str, customer_phone: &str) -> AppResult<Option<ConversationState>>;

    /// Insert-or-update keyed by `(tenant_id, customer_phone)`. Last writer
    /// wins, except that a set handoff flag and an assigned slug are never
    /// cleared.
    async fn upsert_conversation(&self, state: &ConversationState) -> AppResult<()>;

    async fn slug_taken(&self, tenant_id: &str, slug: &str) -> AppResult<bool>;
}
