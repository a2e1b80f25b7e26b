use serde_json::Value;

use crate::types::{UserInput, WebhookEnvelope};

/// The first customer message of a webhook delivery, with its routing data.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: String,
    pub message_id: Option<String>,
    pub phone_number_id: Option<String>,
    pub message: Value,
}

/// Picks `entry[0].changes[0].value.messages[0]`. Status callbacks and other
/// events without a message yield `None`.
pub fn first_message(envelope: &WebhookEnvelope) -> Option<InboundMessage> {
    let value = envelope.entry.first()?.changes.first()?.value.as_ref()?;
    let message = value.messages.first()?;

    let from = message
        .get("from")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if from.is_empty() {
        return None;
    }
    let message_id = message
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let phone_number_id = value
        .metadata
        .as_ref()
        .map(|m| m.phone_number_id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    Some(InboundMessage {
        from: from.to_string(),
        message_id,
        phone_number_id,
        message: message.clone(),
    })
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Normalizes a raw WhatsApp message into the id/text pair the engine reads.
pub fn extract_input(message: &Value) -> UserInput {
    match str_at(message, "type").unwrap_or("") {
        "interactive" => {
            let interactive = message.get("interactive").unwrap_or(&Value::Null);
            let reply = interactive
                .get("button_reply")
                .or_else(|| interactive.get("list_reply"));
            match reply {
                Some(reply) => UserInput {
                    id: str_at(reply, "id").map(str::to_string),
                    text: str_at(reply, "title").map(str::to_string),
                },
                None => UserInput::default(),
            }
        }
        "button" => {
            let Some(button) = message.get("button") else {
                return UserInput::default();
            };
            let text = str_at(button, "text").map(str::to_string);
            let id = str_at(button, "payload")
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .or_else(|| text.clone());
            UserInput { id, text }
        }
        "text" => UserInput {
            id: None,
            text: message
                .get("text")
                .and_then(|t| str_at(t, "body"))
                .map(|body| body.trim().to_string()),
        },
        _ => UserInput::default(),
    }
}
