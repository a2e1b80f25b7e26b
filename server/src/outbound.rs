//! Renders dialogue nodes as WhatsApp Cloud API messages and sends them.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::config::OutboundConfig;
use crate::error::{AppError, AppResult};
use crate::types::{DialogueNode, NodeOption, SendCredentials};

const DEFAULT_LIST_BUTTON: &str = "Choose";
const DEFAULT_LIST_SECTION: &str = "Options";

/// Builds the `/messages` request body for a node prompt.
pub fn render_node(node: &DialogueNode, to: &str) -> Value {
    let mut payload = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
    });

    match node {
        DialogueNode::Message(_) | DialogueNode::Terminal(_) => {
            payload["type"] = json!("text");
            payload["text"] = json!({
                "preview_url": false,
                "body": node.prompt(),
            });
        }
        DialogueNode::ButtonChoice(buttons) => {
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "button",
                "body": { "text": buttons.text },
                "action": {
                    "buttons": buttons
                        .options
                        .iter()
                        .map(|o| json!({ "type": "reply", "reply": { "id": o.id, "title": o.title } }))
                        .collect::<Vec<_>>(),
                },
            });
        }
        DialogueNode::ListChoice(list) => {
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "list",
                "body": { "text": list.text },
                "action": {
                    "button": list.button_label.as_deref().unwrap_or(DEFAULT_LIST_BUTTON),
                    "sections": [{
                        "title": list.section_title.as_deref().unwrap_or(DEFAULT_LIST_SECTION),
                        "rows": list_rows(&list.options),
                    }],
                },
            });
        }
    }
    payload
}

fn list_rows(options: &[NodeOption]) -> Vec<Value> {
    options
        .iter()
        .map(|o| json!({ "id": o.id, "title": o.title }))
        .collect()
}

/// Graph API client shared by all requests.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    base_url: String,
    attempts: u32,
}

impl WhatsAppClient {
    pub fn new(config: &OutboundConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            attempts: config.attempts.max(1),
        })
    }

    fn messages_url(&self, creds: &SendCredentials) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url, creds.graph_version, creds.phone_number_id
        )
    }

    /// POSTs one message. Transient failures (429, 5xx gateway errors,
    /// transport errors) are retried up to the configured attempt count.
    pub async fn send(&self, creds: &SendCredentials, payload: &Value) -> AppResult<()> {
        let url = self.messages_url(creds);
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt - 1))).await;
            }

            let response = match self
                .http
                .post(&url)
                .bearer_auth(&creds.access_token)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(attempt, tenant_id = %creds.tenant_id, error = %err, "whatsapp request failed");
                    last_error = Some(AppError::Http(err));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                debug!(attempt, status = %status, "whatsapp message accepted");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            let err = AppError::Delivery {
                status: status.as_u16(),
                body,
            };
            if !is_transient(status) {
                return Err(err);
            }
            warn!(attempt, status = %status, "transient whatsapp error");
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| AppError::Delivery {
            status: 0,
            body: "no send attempt made".to_string(),
        }))
    }

    /// Renders and sends a node prompt. Failures are logged, never returned:
    /// the webhook must still be acknowledged once state has advanced.
    pub async fn dispatch(&self, creds: &SendCredentials, to: &str, node_key: &str, node: &DialogueNode) -> bool {
        let payload = render_node(node, to);
        match self.send(creds, &payload).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    tenant_id = %creds.tenant_id,
                    to,
                    node = node_key,
                    error = %err,
                    "whatsapp send failed"
                );
                false
            }
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}
