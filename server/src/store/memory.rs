use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::LeadStore;
use crate::error::{AppError, AppResult};
use crate::types::{ConversationState, TenantChannelConfig};

/// In-process store for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    channels: RwLock<HashMap<String, TenantChannelConfig>>,
    trees: RwLock<HashMap<String, Value>>,
    dedupe: RwLock<HashMap<String, String>>,
    conversations: RwLock<HashMap<(String, String), ConversationState>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_channel(&self, channel: TenantChannelConfig) {
        self.channels
            .write()
            .await
            .insert(channel.phone_number_id.clone(), channel);
    }

    pub async fn insert_tree(&self, tenant_id: &str, tree: Value) {
        self.trees.write().await.insert(tenant_id.to_string(), tree);
    }

    pub async fn insert_conversation(&self, state: ConversationState) {
        self.conversations
            .write()
            .await
            .insert((state.tenant_id.clone(), state.customer_phone.clone()), state);
    }

    pub async fn conversation(&self, tenant_id: &str, customer_phone: &str) -> Option<ConversationState> {
        self.conversations
            .read()
            .await
            .get(&(tenant_id.to_string(), customer_phone.to_string()))
            .cloned()
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn dedupe_tenant(&self, message_id: &str) -> Option<String> {
        self.dedupe.read().await.get(message_id).cloned()
    }

    /// Makes every operation fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AppError::StoreUnavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn find_tenant_channel(&self, phone_number_id: &str) -> AppResult<Option<TenantChannelConfig>> {
        self.check()?;
        Ok(self.channels.read().await.get(phone_number_id).cloned())
    }

    async fn load_tenant_tree(&self, tenant_id: &str) -> AppResult<Option<Value>> {
        self.check()?;
        Ok(self.trees.read().await.get(tenant_id).cloned())
    }

    async fn dedupe_seen(&self, message_id: &str) -> AppResult<bool> {
        self.check()?;
        Ok(self.dedupe.read().await.contains_key(message_id))
    }

    async fn dedupe_insert(&self, message_id: &str, tenant_id: &str) -> AppResult<bool> {
        self.check()?;
        let mut dedupe = self.dedupe.write().await;
        if dedupe.contains_key(message_id) {
            return Ok(false);
        }
        dedupe.insert(message_id.to_string(), tenant_id.to_string());
        Ok(true)
    }

    async fn load_conversation(&self, tenant_id: &str, customer_phone: &str) -> AppResult<Option<ConversationState>> {
        self.check()?;
        Ok(self.conversation(tenant_id, customer_phone).await)
    }

    async fn upsert_conversation(&self, state: &ConversationState) -> AppResult<()> {
        self.check()?;
        let key = (state.tenant_id.clone(), state.customer_phone.clone());
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(&key) {
            Some(existing) => {
                existing.current_node = state.current_node.clone();
                existing.answers = state.answers.clone();
                existing.handoff_to_human |= state.handoff_to_human;
                if existing.slug.is_empty() {
                    existing.slug = state.slug.clone();
                }
                existing.last_inbound_at = state.last_inbound_at.clone();
                existing.updated_at = state.updated_at.clone();
            }
            None => {
                conversations.insert(key, state.clone());
            }
        }
        Ok(())
    }

    async fn slug_taken(&self, tenant_id: &str, slug: &str) -> AppResult<bool> {
        self.check()?;
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .any(|c| c.tenant_id == tenant_id && c.slug == slug))
    }
}
