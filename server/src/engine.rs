use crate::tree::DecisionTree;
use crate::types::{Advance, Answers, DialogueNode, NodeOption, UserInput, END_NODE};

/// Runs one dialogue turn.
///
/// Unmatched button/list replies re-prompt the same node (`repeat`) rather
/// than failing. Unknown `current` keys behave exactly like `start`.
pub fn advance(tree: &DecisionTree, current: &str, input: &UserInput, answers: Answers) -> Advance {
    let current = tree.resolve_key(current);
    let mut answers = answers;

    match tree.node(current) {
        DialogueNode::Message(node) => {
            if let Some(text) = non_empty(&input.text) {
                answers.insert(node.save_as.clone(), text.to_string());
            }
            Advance {
                next_node: node.next.clone(),
                answers,
                repeat: false,
            }
        }
        DialogueNode::ButtonChoice(node) => {
            choose(current, &node.options, node.save_as.as_deref(), input, answers)
        }
        DialogueNode::ListChoice(node) => {
            choose(current, &node.options, node.save_as.as_deref(), input, answers)
        }
        DialogueNode::Terminal(_) => Advance {
            next_node: END_NODE.to_string(),
            answers,
            repeat: false,
        },
    }
}

fn choose(
    current: &str,
    options: &[NodeOption],
    save_as: Option<&str>,
    input: &UserInput,
    mut answers: Answers,
) -> Advance {
    let selected = non_empty(&input.id).or_else(|| non_empty(&input.text));
    let chosen = selected.and_then(|id| options.iter().find(|o| o.id == id));

    match chosen {
        Some(option) => {
            if let Some(key) = save_as {
                answers.insert(key.to_string(), option.title.clone());
            }
            Advance {
                next_node: option.next.clone(),
                answers,
                repeat: false,
            }
        }
        None => Advance {
            next_node: current.to_string(),
            answers,
            repeat: true,
        },
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::default_tree;
    use crate::types::START_NODE;

    fn text(value: &str) -> UserInput {
        UserInput {
            id: None,
            text: Some(value.to_string()),
        }
    }

    fn id(value: &str) -> UserInput {
        UserInput {
            id: Some(value.to_string()),
            text: None,
        }
    }

    #[test]
    fn message_nodes_store_text_and_advance() {
        let tree = default_tree();
        for key in ["name", "email", "details"] {
            let DialogueNode::Message(node) = tree.node(key) else {
                panic!("{key} should be a text node");
            };
            let result = advance(&tree, key, &text("anything"), Answers::new());
            assert_eq!(result.next_node, node.next);
            assert_eq!(result.answers.get(&node.save_as).map(String::as_str), Some("anything"));
            assert!(!result.repeat);
        }
    }

    #[test]
    fn message_nodes_advance_without_text() {
        let tree = default_tree();
        let result = advance(&tree, "name", &id("demo"), Answers::new());
        assert_eq!(result.next_node, "email");
        assert!(result.answers.is_empty());
        assert!(!result.repeat);
    }

    #[test]
    fn every_option_leads_to_its_target() {
        let tree = default_tree();
        for key in [START_NODE, "issue"] {
            let options = match tree.node(key) {
                DialogueNode::ButtonChoice(node) => node.options.clone(),
                DialogueNode::ListChoice(node) => node.options.clone(),
                other => panic!("unexpected node {other:?}"),
            };
            for option in options {
                let result = advance(&tree, key, &id(&option.id), Answers::new());
                assert_eq!(result.next_node, option.next);
                assert!(!result.repeat);
            }
        }
    }

    #[test]
    fn unmatched_selection_repeats_current_node() {
        let tree = default_tree();
        for key in [START_NODE, "issue"] {
            let result = advance(&tree, key, &id("not-an-option"), Answers::new());
            assert!(result.repeat);
            assert_eq!(result.next_node, key);
            assert!(result.answers.is_empty());
        }
    }

    #[test]
    fn option_match_is_exact_and_case_sensitive() {
        let tree = default_tree();
        assert!(advance(&tree, START_NODE, &id("Demo"), Answers::new()).repeat);
        assert!(advance(&tree, START_NODE, &text("Quiero una demo"), Answers::new()).repeat);
        assert!(!advance(&tree, START_NODE, &text("demo"), Answers::new()).repeat);
    }

    #[test]
    fn selected_title_is_saved_under_save_as() {
        let tree = default_tree();
        let result = advance(&tree, START_NODE, &id("demo"), Answers::new());
        assert_eq!(result.next_node, "name");
        assert_eq!(result.answers.get("intent").map(String::as_str), Some("Quiero una demo"));

        let result = advance(&tree, "issue", &id("tech"), result.answers);
        assert_eq!(result.next_node, "details");
        assert_eq!(result.answers.get("supportType").map(String::as_str), Some("Problema tecnico"));
        assert_eq!(result.answers.len(), 2);
    }

    #[test]
    fn empty_id_falls_back_to_text() {
        let tree = default_tree();
        let input = UserInput {
            id: Some(String::new()),
            text: Some("support".to_string()),
        };
        let result = advance(&tree, START_NODE, &input, Answers::new());
        assert_eq!(result.next_node, "issue");
    }

    #[test]
    fn terminal_node_stays_terminal() {
        let tree = default_tree();
        let mut answers = Answers::new();
        answers.insert("name".to_string(), "Ana".to_string());
        for input in [text("hola"), id("demo"), UserInput::default()] {
            let result = advance(&tree, END_NODE, &input, answers.clone());
            assert_eq!(result.next_node, END_NODE);
            assert_eq!(result.answers, answers);
            assert!(!result.repeat);
        }
    }

    #[test]
    fn unknown_node_behaves_like_start() {
        let tree = default_tree();
        for input in [id("demo"), id("support"), text("hi"), UserInput::default()] {
            let from_unknown = advance(&tree, "stale-node", &input, Answers::new());
            let from_start = advance(&tree, START_NODE, &input, Answers::new());
            assert_eq!(from_unknown, from_start);
        }
    }

    #[test]
    fn existing_answers_are_carried_forward() {
        let tree = default_tree();
        let mut answers = Answers::new();
        answers.insert("intent".to_string(), "Quiero una demo".to_string());
        let result = advance(&tree, "name", &text("Ana"), answers);
        assert_eq!(result.answers.len(), 2);
        assert_eq!(result.answers.get("name").map(String::as_str), Some("Ana"));
    }
}
