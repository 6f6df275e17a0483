//! Graph validation — run before every scenario walk (and by the CLI
//! `validate` subcommand).
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the scenario.
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. Exactly one `start` node exists.
//!
//! Cycles are *legal* — flows loop back through conditions on purpose —
//! so unlike a classic DAG check there is no acyclicity rule. The
//! executor's iteration ceiling and per-condition `maxLoops` keep
//! traversal finite.

use std::collections::HashSet;

use crate::models::{NodeKind, ScenarioGraph};
use crate::EngineError;

/// Parse a stored JSON definition into a validated graph.
pub fn parse_graph(definition: &serde_json::Value) -> Result<ScenarioGraph, EngineError> {
    let graph: ScenarioGraph = serde_json::from_value(definition.clone())
        .map_err(|e| EngineError::InvalidDefinition(e.to_string()))?;
    validate_graph(&graph)?;
    Ok(graph)
}

/// Validate a scenario graph's structural invariants.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
/// - [`EngineError::NoStartNode`] / [`EngineError::MultipleStartNodes`]
///   if there is not exactly one start node.
pub fn validate_graph(graph: &ScenarioGraph) -> Result<(), EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints
    // -----------------------------------------------------------------------
    for edge in &graph.edges {
        if !seen_ids.contains(edge.from.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !seen_ids.contains(edge.to.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Exactly one start node
    // -----------------------------------------------------------------------
    let start_count = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Start)
        .count();
    match start_count {
        0 => Err(EngineError::NoStartNode),
        1 => Ok(()),
        n => Err(EngineError::MultipleStartNodes(n)),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, ScenarioNode};
    use serde_json::Value;

    fn make_node(id: &str, kind: NodeKind) -> ScenarioNode {
        ScenarioNode {
            id: id.to_string(),
            name: None,
            kind,
            params: Value::Null,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }

    fn make_graph(nodes: Vec<ScenarioNode>, edges: Vec<Edge>) -> ScenarioGraph {
        ScenarioGraph { nodes, edges }
    }

    #[test]
    fn valid_linear_graph_passes() {
        let graph = make_graph(
            vec![
                make_node("s", NodeKind::Start),
                make_node("a", NodeKind::Action),
                make_node("e", NodeKind::End),
            ],
            vec![edge("s", "a"), edge("a", "e")],
        );
        validate_graph(&graph).expect("should be valid");
    }

    #[test]
    fn cyclic_graph_is_valid() {
        // s → a → c → a  (loop back through the condition)
        let graph = make_graph(
            vec![
                make_node("s", NodeKind::Start),
                make_node("a", NodeKind::Action),
                make_node("c", NodeKind::Condition),
            ],
            vec![edge("s", "a"), edge("a", "c"), edge("c", "a")],
        );
        validate_graph(&graph).expect("cycles are allowed");
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let graph = make_graph(
            vec![
                make_node("s", NodeKind::Start),
                make_node("s", NodeKind::Action),
            ],
            vec![],
        );
        assert!(matches!(
            validate_graph(&graph),
            Err(EngineError::DuplicateNodeId(id)) if id == "s"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let graph = make_graph(
            vec![make_node("s", NodeKind::Start)],
            vec![edge("s", "ghost")],
        );
        assert!(matches!(
            validate_graph(&graph),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn missing_start_node_is_rejected() {
        let graph = make_graph(vec![make_node("a", NodeKind::Action)], vec![]);
        assert!(matches!(validate_graph(&graph), Err(EngineError::NoStartNode)));
    }

    #[test]
    fn two_start_nodes_are_rejected() {
        let graph = make_graph(
            vec![
                make_node("s1", NodeKind::Start),
                make_node("s2", NodeKind::Start),
            ],
            vec![],
        );
        assert!(matches!(
            validate_graph(&graph),
            Err(EngineError::MultipleStartNodes(2))
        ));
    }

    #[test]
    fn legacy_branch_field_deserializes_as_label() {
        let graph = parse_graph(&serde_json::json!({
            "nodes": [
                { "id": "s", "kind": "start" },
                { "id": "c", "kind": "condition" },
                { "id": "e", "kind": "end" }
            ],
            "edges": [
                { "from": "s", "to": "c" },
                { "from": "c", "to": "e", "branch": "yes" }
            ]
        }))
        .expect("should parse");

        assert_eq!(graph.edges[1].label.as_deref(), Some("yes"));
    }
}
