use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node key every conversation starts from.
pub const START_NODE: &str = "start";
/// Node key of the closing message; reaching it hands the lead to a human.
pub const END_NODE: &str = "end";

/// One selectable option of a button or list node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOption {
    pub id: String,
    pub title: String,
    pub next: String,
}

/// Free-text prompt. Any reply advances to `next`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNode {
    pub text: String,
    pub save_as: String,
    pub next: String,
}

/// Prompt answered with one of up to three reply buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    pub options: Vec<NodeOption>,
}

/// Prompt answered by picking a row from a single-section list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    pub options: Vec<NodeOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalNode {
    pub text: String,
}

/// One step of a tenant's scripted dialogue.
///
/// Serialized with a `type` tag (`text`, `buttons`, `list`, `end`) so trees
/// saved from the dashboard deserialize directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DialogueNode {
    #[serde(rename = "text")]
    Message(MessageNode),
    #[serde(rename = "buttons")]
    ButtonChoice(ButtonNode),
    #[serde(rename = "list")]
    ListChoice(ListNode),
    #[serde(rename = "end")]
    Terminal(TerminalNode),
}

impl DialogueNode {
    pub fn prompt(&self) -> &str {
        match self {
            DialogueNode::Message(node) => &node.text,
            DialogueNode::ButtonChoice(node) => &node.text,
            DialogueNode::ListChoice(node) => &node.text,
            DialogueNode::Terminal(node) => &node.text,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DialogueNode::Terminal(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DialogueNode::Message(_) => "text",
            DialogueNode::ButtonChoice(_) => "buttons",
            DialogueNode::ListChoice(_) => "list",
            DialogueNode::Terminal(_) => "end",
        }
    }

    /// Every node key this node can transition to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            DialogueNode::Message(node) => vec![node.next.as_str()],
            DialogueNode::ButtonChoice(node) => {
                node.options.iter().map(|o| o.next.as_str()).collect()
            }
            DialogueNode::ListChoice(node) => {
                node.options.iter().map(|o| o.next.as_str()).collect()
            }
            DialogueNode::Terminal(_) => vec![],
        }
    }
}

/// Answers collected so far, keyed by the `saveAs` of the node that asked.
pub type Answers = HashMap<String, String>;

/// Normalized customer reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub id: Option<String>,
    pub text: Option<String>,
}

/// Outcome of one dialogue turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub next_node: String,
    pub answers: Answers,
    pub repeat: bool,
}

/// Persisted dialogue state for one customer of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    pub tenant_id: String,
    pub customer_phone: String,
    pub current_node: String,
    pub answers: Answers,
    pub slug: String,
    pub handoff_to_human: bool,
    pub last_inbound_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-tenant WhatsApp channel row. Empty credential fields fall back to
/// the process defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantChannelConfig {
    pub tenant_id: String,
    pub phone_number_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub graph_version: Option<String>,
}

/// Everything needed to call the Graph API on behalf of a tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct SendCredentials {
    pub tenant_id: String,
    pub access_token: String,
    pub graph_version: String,
    pub phone_number_id: String,
}

impl std::fmt::Debug for SendCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("access_token", &"<redacted>")
            .field("graph_version", &self.graph_version)
            .field("phone_number_id", &self.phone_number_id)
            .finish()
    }
}

// --- WhatsApp Cloud API webhook envelope ---

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: Option<WebhookValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub metadata: Option<WebhookMetadata>,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub statuses: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub display_phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}
