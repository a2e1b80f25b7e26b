use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::types::{
    ButtonNode, DialogueNode, ListNode, MessageNode, NodeOption, TerminalNode, END_NODE,
    START_NODE,
};

/// A tenant's dialogue graph, keyed by node id.
///
/// Trees are only built through [`DecisionTree::new`] or
/// [`DecisionTree::from_json`], so every instance has a `start` node and an
/// `end` terminal and every transition points at a known key.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: HashMap<String, DialogueNode>,
}

impl DecisionTree {
    pub fn new(nodes: HashMap<String, DialogueNode>) -> AppResult<Self> {
        validate(&nodes)?;
        Ok(Self { nodes })
    }

    pub fn from_json(value: Value) -> AppResult<Self> {
        let nodes: HashMap<String, DialogueNode> = serde_json::from_value(value)
            .map_err(|e| AppError::InvalidTree(format!("unreadable tree: {e}")))?;
        Self::new(nodes)
    }

    /// Resolves a key to its node. Unknown keys resolve to `start` so a stale
    /// `current_node` restarts the dialogue instead of wedging it.
    pub fn node(&self, key: &str) -> &DialogueNode {
        self.nodes
            .get(key)
            .unwrap_or_else(|| &self.nodes[START_NODE])
    }

    /// The key [`DecisionTree::node`] actually resolved `key` to.
    pub fn resolve_key<'a>(&self, key: &'a str) -> &'a str {
        if self.nodes.contains_key(key) {
            key
        } else {
            START_NODE
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn validate(nodes: &HashMap<String, DialogueNode>) -> AppResult<()> {
    if !nodes.contains_key(START_NODE) {
        return Err(AppError::InvalidTree("missing 'start' node".to_string()));
    }
    match nodes.get(END_NODE) {
        Some(node) if node.is_terminal() => {}
        Some(node) => {
            return Err(AppError::InvalidTree(format!(
                "'end' must be a terminal node, found '{}'",
                node.type_name()
            )))
        }
        None => return Err(AppError::InvalidTree("missing 'end' node".to_string())),
    }

    for (key, node) in nodes {
        match node {
            DialogueNode::Message(message) if message.save_as.trim().is_empty() => {
                return Err(AppError::InvalidTree(format!(
                    "text node '{key}' needs a saveAs key"
                )));
            }
            DialogueNode::ButtonChoice(ButtonNode { options, .. })
            | DialogueNode::ListChoice(ListNode { options, .. }) => {
                if options.is_empty() {
                    return Err(AppError::InvalidTree(format!(
                        "node '{key}' has no options"
                    )));
                }
                let mut seen = HashSet::new();
                if let Some(dup) = options.iter().find(|o| !seen.insert(o.id.as_str())) {
                    return Err(AppError::InvalidTree(format!(
                        "node '{key}' repeats option id '{}'",
                        dup.id
                    )));
                }
            }
            _ => {}
        }

        if let Some(missing) = node.targets().into_iter().find(|t| !nodes.contains_key(*t)) {
            return Err(AppError::InvalidTree(format!(
                "node '{key}' points at unknown node '{missing}'"
            )));
        }
    }
    Ok(())
}

fn option(id: &str, title: &str, next: &str) -> NodeOption {
    NodeOption {
        id: id.to_string(),
        title: title.to_string(),
        next: next.to_string(),
    }
}

/// The stock lead-qualification tree used when a tenant has not saved one.
pub fn default_tree() -> DecisionTree {
    let mut nodes = HashMap::new();
    nodes.insert(
        START_NODE.to_string(),
        DialogueNode::ButtonChoice(ButtonNode {
            text: "Hola! Soy el asistente virtual. Como podemos ayudarte hoy?".to_string(),
            save_as: Some("intent".to_string()),
            options: vec![
                option("demo", "Quiero una demo", "name"),
                option("support", "Soporte", "issue"),
            ],
        }),
    );
    nodes.insert(
        "name".to_string(),
        DialogueNode::Message(MessageNode {
            text: "Cual es tu nombre?".to_string(),
            save_as: "name".to_string(),
            next: "email".to_string(),
        }),
    );
    nodes.insert(
        "email".to_string(),
        DialogueNode::Message(MessageNode {
            text: "Perfecto. Cual es tu correo electronico?".to_string(),
            save_as: "email".to_string(),
            next: END_NODE.to_string(),
        }),
    );
    nodes.insert(
        "issue".to_string(),
        DialogueNode::ListChoice(ListNode {
            text: "Elige el tipo de soporte que necesitas:".to_string(),
            save_as: Some("supportType".to_string()),
            options: vec![
                option("billing", "Facturacion", "details"),
                option("tech", "Problema tecnico", "details"),
            ],
            button_label: Some("Ver opciones".to_string()),
            section_title: Some("Soporte".to_string()),
        }),
    );
    nodes.insert(
        "details".to_string(),
        DialogueNode::Message(MessageNode {
            text: "Cuentame mas detalles para poder ayudarte.".to_string(),
            save_as: "details".to_string(),
            next: END_NODE.to_string(),
        }),
    );
    nodes.insert(
        END_NODE.to_string(),
        DialogueNode::Terminal(TerminalNode {
            text: "Gracias. Un miembro de nuestro equipo te contactara pronto.".to_string(),
        }),
    );

    DecisionTree { nodes }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_tree_is_valid() {
        let tree = default_tree();
        assert!(validate(&tree.nodes).is_ok());
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn unknown_keys_resolve_to_start() {
        let tree = default_tree();
        assert_eq!(tree.node("nope"), tree.node(START_NODE));
        assert_eq!(tree.resolve_key("nope"), START_NODE);
        assert_eq!(tree.resolve_key("email"), "email");
    }

    #[test]
    fn parses_dashboard_json() {
        let tree = DecisionTree::from_json(json!({
            "start": {
                "type": "list",
                "text": "Pick one",
                "saveAs": "choice",
                "buttonLabel": "Open",
                "sectionTitle": "Things",
                "options": [{ "id": "a", "title": "A", "next": "ask" }]
            },
            "ask": { "type": "text", "text": "Why?", "saveAs": "why", "next": "end" },
            "end": { "type": "end", "text": "Bye" }
        }))
        .unwrap();

        match tree.node(START_NODE) {
            DialogueNode::ListChoice(list) => {
                assert_eq!(list.button_label.as_deref(), Some("Open"));
                assert_eq!(list.save_as.as_deref(), Some("choice"));
            }
            other => panic!("unexpected node {other:?}"),
        }
        assert!(tree.node("end").is_terminal());
    }

    #[test]
    fn rejects_dangling_transitions() {
        let err = DecisionTree::from_json(json!({
            "start": { "type": "text", "text": "Hi", "saveAs": "x", "next": "missing" },
            "end": { "type": "end", "text": "Bye" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown node 'missing'"));
    }

    #[test]
    fn rejects_trees_without_entry_or_terminal() {
        assert!(DecisionTree::from_json(json!({
            "end": { "type": "end", "text": "Bye" }
        }))
        .is_err());
        assert!(DecisionTree::from_json(json!({
            "start": { "type": "text", "text": "Hi", "saveAs": "x", "next": "end" },
            "end": { "type": "text", "text": "Hi", "saveAs": "y", "next": "start" }
        }))
        .is_err());
    }

    #[test]
    fn rejects_duplicate_option_ids_and_empty_save_as() {
        assert!(DecisionTree::from_json(json!({
            "start": {
                "type": "buttons",
                "text": "Pick",
                "options": [
                    { "id": "a", "title": "A", "next": "end" },
                    { "id": "a", "title": "B", "next": "end" }
                ]
            },
            "end": { "type": "end", "text": "Bye" }
        }))
        .is_err());
        assert!(DecisionTree::from_json(json!({
            "start": { "type": "text", "text": "Hi", "saveAs": " ", "next": "end" },
            "end": { "type": "end", "text": "Bye" }
        }))
        .is_err());
    }

    #[test]
    fn rejects_unknown_node_types() {
        assert!(DecisionTree::from_json(json!({
            "start": { "type": "carousel", "text": "Hi" },
            "end": { "type": "end", "text": "Bye" }
        }))
        .is_err());
    }
}
