use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, WebhookConfig};
use crate::engine::advance;
use crate::error::{AppError, AppResult};
use crate::inbound::{extract_input, first_message, InboundMessage};
use crate::outbound::WhatsAppClient;
use crate::signature::{verify_signature, SIGNATURE_HEADER};
use crate::slug::ensure_slug;
use crate::store::LeadStore;
use crate::tenant::TenantResolver;
use crate::tree::{default_tree, DecisionTree};
use crate::types::{ConversationState, SendCredentials, VerifyQuery, WebhookEnvelope, START_NODE};

pub struct AppState {
    pub webhook: WebhookConfig,
    pub store: Arc<dyn LeadStore>,
    pub tenants: TenantResolver,
    pub whatsapp: WhatsAppClient,
    pub default_tree: Arc<DecisionTree>,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn LeadStore>) -> AppResult<Self> {
        Ok(Self {
            webhook: config.webhook.clone(),
            store,
            tenants: TenantResolver::new(config.defaults.clone()),
            whatsapp: WhatsAppClient::new(&config.outbound)?,
            default_tree: Arc::new(default_tree()),
        })
    }
}

/// What one POST delivery ended up doing. Every variant is acknowledged 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    Duplicate,
    HandedOff,
    Advanced {
        from_node: String,
        to_node: String,
        repeat: bool,
        delivered: bool,
    },
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            webhook_path,
            get(whatsapp_webhook_verify).post(whatsapp_webhook_event),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "now": now_iso() }))
}

async fn whatsapp_webhook_verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    if query.mode.as_deref() != Some("subscribe") {
        return StatusCode::OK.into_response();
    }

    let expected = state.webhook.verify_token.as_deref().unwrap_or("");
    let provided = query.verify_token.as_deref().unwrap_or("");
    if !expected.is_empty() && provided == expected {
        info!("webhook subscription verified");
        return (StatusCode::OK, query.challenge.unwrap_or_default()).into_response();
    }

    warn!("webhook subscription rejected: verify token mismatch");
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

async fn whatsapp_webhook_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_event(&state, &headers, &body).await {
        Ok(outcome) => {
            debug!(?outcome, "webhook handled");
            (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
        }
        Err(AppError::InvalidSignature) => {
            warn!("rejected webhook with invalid signature");
            AppError::InvalidSignature.into_response()
        }
        Err(err) => {
            error!(error = %err, "webhook processing failed");
            err.into_response()
        }
    }
}

/// Runs one delivery through verify, parse, tenant, dedupe, conversation,
/// engine, persist and dispatch. Only a bad signature or missing send
/// credentials come back as errors; storage hiccups degrade to defaults.
pub async fn handle_event(state: &AppState, headers: &HeaderMap, body: &[u8]) -> AppResult<EventOutcome> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !verify_signature(state.webhook.app_secret.as_deref(), signature, body) {
        return Err(AppError::InvalidSignature);
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!(error = %err, "ignoring unparseable webhook body");
            return Ok(EventOutcome::Ignored);
        }
    };
    let Some(inbound) = first_message(&envelope) else {
        debug!(object = %envelope.object, "no customer message in webhook");
        return Ok(EventOutcome::Ignored);
    };

    let creds = state
        .tenants
        .resolve(state.store.as_ref(), inbound.phone_number_id.as_deref())
        .await?;

    if let Some(message_id) = inbound.message_id.as_deref() {
        if !claim_message(state.store.as_ref(), message_id, &creds.tenant_id).await {
            info!(tenant_id = %creds.tenant_id, message_id, "duplicate delivery skipped");
            return Ok(EventOutcome::Duplicate);
        }
    }

    let existing = match state
        .store
        .load_conversation(&creds.tenant_id, &inbound.from)
        .await
    {
        Ok(found) => found,
        Err(err) => {
            warn!(
                tenant_id = %creds.tenant_id,
                phone = %inbound.from,
                error = %err,
                "conversation lookup failed, treating as new"
            );
            None
        }
    };
    if existing.as_ref().is_some_and(|c| c.handoff_to_human) {
        info!(tenant_id = %creds.tenant_id, phone = %inbound.from, "conversation handed off, bot silent");
        return Ok(EventOutcome::HandedOff);
    }

    let tree = tree_for_tenant(state, &creds.tenant_id).await;
    let outcome = run_turn(state, &tree, &creds, &inbound, existing, Utc::now()).await;
    Ok(outcome)
}

async fn run_turn(
    state: &AppState,
    tree: &DecisionTree,
    creds: &SendCredentials,
    inbound: &InboundMessage,
    existing: Option<ConversationState>,
    now: DateTime<Utc>,
) -> EventOutcome {
    let tenant_id = creds.tenant_id.as_str();
    let (current, answers) = match &existing {
        Some(conversation) => (conversation.current_node.clone(), conversation.answers.clone()),
        None => (START_NODE.to_string(), Default::default()),
    };

    let input = extract_input(&inbound.message);
    let step = advance(tree, &current, &input, answers);
    let next = tree.node(&step.next_node);

    let slug = ensure_slug(
        state.store.as_ref(),
        tenant_id,
        &inbound.from,
        existing.as_ref().map(|c| c.slug.as_str()),
        now,
    )
    .await;

    let stamp = now.to_rfc3339();
    let conversation = ConversationState {
        id: existing
            .as_ref()
            .map(|c| c.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        tenant_id: tenant_id.to_string(),
        customer_phone: inbound.from.clone(),
        current_node: step.next_node.clone(),
        answers: step.answers,
        slug,
        handoff_to_human: next.is_terminal(),
        last_inbound_at: stamp.clone(),
        created_at: existing
            .as_ref()
            .map(|c| c.created_at.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| stamp.clone()),
        updated_at: stamp,
    };
    if let Err(err) = state.store.upsert_conversation(&conversation).await {
        warn!(
            tenant_id,
            phone = %inbound.from,
            node = %conversation.current_node,
            error = %err,
            "conversation upsert failed"
        );
    }

    // A repeat leaves next_node on the current key, so the same prompt goes out again.
    info!(
        tenant_id,
        phone = %inbound.from,
        message_id = inbound.message_id.as_deref().unwrap_or(""),
        from_node = %current,
        to_node = %step.next_node,
        repeat = step.repeat,
        handoff = conversation.handoff_to_human,
        "dialogue advanced"
    );
    let delivered = state
        .whatsapp
        .dispatch(creds, &inbound.from, &step.next_node, next)
        .await;

    EventOutcome::Advanced {
        from_node: current,
        to_node: step.next_node,
        repeat: step.repeat,
        delivered,
    }
}

/// Check-then-insert on the message id. Returns `false` when the id was
/// already processed; storage errors let the message through.
async fn claim_message(store: &dyn LeadStore, message_id: &str, tenant_id: &str) -> bool {
    match store.dedupe_seen(message_id).await {
        Ok(true) => return false,
        Ok(false) => {}
        Err(err) => warn!(message_id, error = %err, "dedupe lookup failed"),
    }
    match store.dedupe_insert(message_id, tenant_id).await {
        Ok(inserted) => inserted,
        Err(err) => {
            warn!(message_id, error = %err, "dedupe insert failed");
            true
        }
    }
}

async fn tree_for_tenant(state: &AppState, tenant_id: &str) -> Arc<DecisionTree> {
    match state.store.load_tenant_tree(tenant_id).await {
        Ok(Some(raw)) => match DecisionTree::from_json(raw) {
            Ok(tree) => Arc::new(tree),
            Err(err) => {
                warn!(tenant_id, error = %err, "stored tree rejected, using default tree");
                state.default_tree.clone()
            }
        },
        Ok(None) => state.default_tree.clone(),
        Err(err) => {
            warn!(tenant_id, error = %err, "tree lookup failed, using default tree");
            state.default_tree.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefaultCredentials, OutboundConfig};
    use crate::store::MemoryStore;
    use axum::http::HeaderValue;

    fn state(store: Arc<MemoryStore>, secret: Option<&str>) -> AppState {
        let config = AppConfig {
            port: 0,
            webhook_path: "/hook".to_string(),
            database_url: None,
            webhook: WebhookConfig {
                app_secret: secret.map(str::to_string),
                verify_token: None,
            },
            defaults: DefaultCredentials {
                access_token: Some("env-token".to_string()),
                graph_version: "v22.0".to_string(),
                phone_number_id: None,
            },
            // Nothing listens here; sends fail fast and are only logged.
            outbound: OutboundConfig {
                graph_base_url: "http://127.0.0.1:9".to_string(),
                ..OutboundConfig::default()
            },
        };
        AppState::new(&config, store).unwrap()
    }

    fn text_event(id: &str, body: &str) -> Vec<u8> {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "111" },
                "messages": [{ "from": "5215550001234", "id": id, "type": "text", "text": { "body": body } }]
            }}]}]
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_any_work() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store.clone(), Some("secret"));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("sha256=00"));

        let err = handle_event(&state, &headers, &text_event("m1", "hi")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
        assert_eq!(store.conversation_count().await, 0);
        assert!(store.dedupe_tenant("m1").await.is_none());
    }

    #[tokio::test]
    async fn garbage_and_status_callbacks_are_ignored() {
        let state = state(Arc::new(MemoryStore::new()), None);
        let headers = HeaderMap::new();
        assert_eq!(handle_event(&state, &headers, b"not json").await.unwrap(), EventOutcome::Ignored);

        let statuses = json!({ "entry": [{ "changes": [{ "value": { "statuses": [{ "id": "x" }] } }] }] });
        let outcome = handle_event(&state, &headers, statuses.to_string().as_bytes()).await.unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn first_turn_creates_conversation_and_repeats_start() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store.clone(), None);
        let outcome = handle_event(&state, &HeaderMap::new(), &text_event("m1", "hi")).await.unwrap();

        assert!(matches!(
            outcome,
            EventOutcome::Advanced { ref to_node, repeat: true, delivered: false, .. } if to_node == "start"
        ));
        let saved = store.conversation("default", "5215550001234").await.unwrap();
        assert_eq!(saved.current_node, "start");
        assert!(!saved.handoff_to_human);
        assert_eq!(saved.slug, format!("lead-1234-{}", Utc::now().format("%d-%m")));
        assert_eq!(store.dedupe_tenant("m1").await.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn same_message_id_is_processed_once() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store.clone(), None);
        let body = text_event("m1", "hi");
        handle_event(&state, &HeaderMap::new(), &body).await.unwrap();
        let second = handle_event(&state, &HeaderMap::new(), &body).await.unwrap();
        assert_eq!(second, EventOutcome::Duplicate);
    }

    #[tokio::test]
    async fn invalid_tenant_tree_falls_back_to_default() {
        let store = Arc::new(MemoryStore::new());
        store.insert_tree("default", json!({ "start": { "type": "text", "text": "x" } })).await;
        let state = state(store, None);
        let tree = tree_for_tenant(&state, "default").await;
        assert!(Arc::ptr_eq(&tree, &state.default_tree));
    }
}
