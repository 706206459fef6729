//! Tree structure validation.
//!
//! Runs before the reasoning call so a structurally broken tree fails fast
//! instead of burning an expensive external request. Missing required
//! fields are fatal for the evaluation (`InvalidTree`); dangling child
//! references are reported but tolerated — the reasoning service can still
//! walk the nodes that exist.

use std::collections::HashSet;

use verdict_core::error::{Result, VerdictError};
use verdict_core::types::TreeNode;

/// Structure report for a validated tree.
#[derive(Debug, Clone)]
pub struct TreeReport {
    pub node_count: usize,
    /// Nodes never referenced as a child.
    pub root_ids: Vec<String>,
    pub leaf_count: usize,
    /// `(node_id, missing_child_id)` pairs — tolerated, not fatal.
    pub dangling: Vec<(String, String)>,
}

/// Validate the nodes of one tree.
///
/// The caller guarantees `nodes` is non-empty (an empty fetch is
/// `TreeNotFound`, a different failure).
pub fn validate(nodes: &[TreeNode]) -> Result<TreeReport> {
    for node in nodes {
        if node.node_id.is_empty()
            || node.tree_id.is_empty()
            || node.content.is_empty()
            || node.criteria.is_empty()
        {
            return Err(VerdictError::InvalidTree(format!(
                "node ({}, {}) is missing required fields",
                node.node_id, node.tree_id
            )));
        }
    }

    let ids: HashSet<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();

    let mut referenced = HashSet::new();
    let mut dangling = Vec::new();
    for node in nodes {
        for child_id in node.children.values() {
            referenced.insert(child_id.as_str());
            if !ids.contains(child_id.as_str()) {
                dangling.push((node.node_id.clone(), child_id.clone()));
            }
        }
    }

    if !dangling.is_empty() {
        tracing::warn!(
            "⚠️ Tree {} has {} dangling child reference(s): {:?}",
            nodes[0].tree_id,
            dangling.len(),
            dangling
        );
    }

    let root_ids: Vec<String> = nodes
        .iter()
        .filter(|n| !referenced.contains(n.node_id.as_str()))
        .map(|n| n.node_id.clone())
        .collect();
    let leaf_count = nodes.iter().filter(|n| n.is_leaf()).count();

    Ok(TreeReport {
        node_count: nodes.len(),
        root_ids,
        leaf_count,
        dangling,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node(node_id: &str, children: &[(&str, &str)]) -> TreeNode {
        TreeNode {
            node_id: node_id.into(),
            tree_id: "t1".into(),
            content: format!("node {node_id}"),
            criteria: format!("criteria for {node_id}"),
            children: children
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_valid_tree() {
        let nodes = vec![
            node("n1", &[("yes", "n2"), ("no", "n3")]),
            node("n2", &[]),
            node("n3", &[]),
        ];
        let report = validate(&nodes).unwrap();
        assert_eq!(report.node_count, 3);
        assert_eq!(report.root_ids, vec!["n1"]);
        assert_eq!(report.leaf_count, 2);
        assert!(report.dangling.is_empty());
    }

    #[test]
    fn test_missing_criteria_is_fatal() {
        let mut bad = node("n1", &[]);
        bad.criteria = String::new();
        let err = validate(&[bad]).unwrap_err();
        assert!(matches!(err, VerdictError::InvalidTree(_)));
    }

    #[test]
    fn test_dangling_reference_is_reported_not_fatal() {
        let nodes = vec![node("n1", &[("yes", "n2"), ("no", "ghost")]), node("n2", &[])];
        let report = validate(&nodes).unwrap();
        assert_eq!(report.dangling, vec![("n1".to_string(), "ghost".to_string())]);
    }

    #[test]
    fn test_empty_children_map() {
        let solo = TreeNode {
            node_id: "only".into(),
            tree_id: "t1".into(),
            content: "c".into(),
            criteria: "q".into(),
            children: BTreeMap::new(),
        };
        let report = validate(&[solo]).unwrap();
        assert_eq!(report.root_ids, vec!["only"]);
        assert_eq!(report.leaf_count, 1);
    }
}
