//! Next-node resolution — a pure function over a node and the graph's
//! edges. All branching policy lives here; the executor just follows
//! the returned id.

use crate::models::{Edge, NodeKind, ScenarioNode};

/// Resolve the node to visit after `node`.
///
/// For condition nodes, `condition_result` (the just-evaluated boolean)
/// selects the edge labeled "yes" or "no". Partially wired graphs often
/// carry a single unlabeled edge out of a condition; when no label
/// matches, the first outgoing edge is taken regardless of label so
/// those graphs still make progress. Returns `None` when the node has
/// no outgoing edge, which ends the scenario run.
pub fn next_node(
    node: &ScenarioNode,
    edges: &[Edge],
    condition_result: Option<bool>,
) -> Option<String> {
    let outgoing: Vec<&Edge> = edges.iter().filter(|e| e.from == node.id).collect();

    if node.kind == NodeKind::Condition {
        let wanted = if condition_result.unwrap_or(true) {
            "yes"
        } else {
            "no"
        };

        let labeled = outgoing.iter().find(|e| {
            e.label
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(wanted))
        });

        return labeled
            .or(outgoing.first())
            .map(|e| e.to.clone());
    }

    outgoing.first().map(|e| e.to.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> ScenarioNode {
        ScenarioNode {
            id: id.into(),
            name: None,
            kind,
            params: serde_json::Value::Null,
        }
    }

    fn edge(from: &str, to: &str, label: Option<&str>) -> Edge {
        Edge {
            from: from.into(),
            to: to.into(),
            label: label.map(String::from),
        }
    }

    #[test]
    fn action_node_follows_first_outgoing_edge() {
        let edges = vec![edge("a", "b", None), edge("a", "c", None)];
        assert_eq!(
            next_node(&node("a", NodeKind::Action), &edges, None),
            Some("b".into())
        );
    }

    #[test]
    fn condition_true_takes_yes_branch() {
        let edges = vec![
            edge("c", "no_target", Some("no")),
            edge("c", "yes_target", Some("yes")),
        ];
        assert_eq!(
            next_node(&node("c", NodeKind::Condition), &edges, Some(true)),
            Some("yes_target".into())
        );
    }

    #[test]
    fn condition_false_takes_no_branch() {
        let edges = vec![
            edge("c", "yes_target", Some("yes")),
            edge("c", "no_target", Some("no")),
        ];
        assert_eq!(
            next_node(&node("c", NodeKind::Condition), &edges, Some(false)),
            Some("no_target".into())
        );
    }

    #[test]
    fn condition_label_match_is_case_insensitive() {
        let edges = vec![edge("c", "t", Some("Yes"))];
        assert_eq!(
            next_node(&node("c", NodeKind::Condition), &edges, Some(true)),
            Some("t".into())
        );
    }

    #[test]
    fn condition_with_only_unlabeled_edge_takes_it_either_way() {
        let edges = vec![edge("c", "next", None)];
        let c = node("c", NodeKind::Condition);
        assert_eq!(next_node(&c, &edges, Some(true)), Some("next".into()));
        assert_eq!(next_node(&c, &edges, Some(false)), Some("next".into()));
    }

    #[test]
    fn condition_with_wrong_label_falls_back_to_first_edge() {
        // Only a "yes" edge is wired; a false result still navigates.
        let edges = vec![edge("c", "only", Some("yes"))];
        assert_eq!(
            next_node(&node("c", NodeKind::Condition), &edges, Some(false)),
            Some("only".into())
        );
    }

    #[test]
    fn no_outgoing_edges_returns_none() {
        let edges = vec![edge("other", "x", None)];
        assert_eq!(next_node(&node("a", NodeKind::Action), &edges, None), None);
    }
}
