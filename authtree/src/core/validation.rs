//! Configuration-time checks over tree definitions.
//!
//! Violations are reported as plain messages so a tool can list all of them at
//! once instead of stopping at the first.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::core::error::ConfigError;
use crate::core::inner_tree::INNER_TREE_TYPE;
use crate::core::registry::NodeFactory;
use crate::core::tree::{AuthTree, EdgeTarget, TreeId, TreeRepository};

/// Graph shape only, no node types involved:
/// - the entry node exists
/// - every edge targets a node of the tree or a terminal decision
pub fn check_structure(tree: &AuthTree) -> Vec<String> {
    let tree_id = tree.id();
    let mut errors = Vec::new();

    if let Err(err) = tree.entry() {
        errors.push(format!("{tree_id}: {err}"));
    }
    for (node_id, node) in &tree.nodes {
        for (outcome, target) in &node.connections {
            if let EdgeTarget::Node(target) = EdgeTarget::parse(target) {
                if !tree.nodes.contains_key(target) {
                    errors.push(format!(
                        "{tree_id}/{node_id}: outcome '{outcome}' targets unknown node '{target}'"
                    ));
                }
            }
        }
    }
    errors
}

/// [`check_structure`] plus the checks that need the node types:
/// - every node can be instantiated (page composition rules included)
/// - every declared outcome has an edge, and no edge uses an undeclared outcome
pub fn validate_tree(tree: &AuthTree, factory: &dyn NodeFactory) -> Vec<String> {
    let tree_id = tree.id();
    let mut errors = check_structure(tree);

    for (node_id, node) in &tree.nodes {
        let spec = match tree.node_spec(&tree_id, node_id) {
            Ok(spec) => spec,
            Err(err) => {
                errors.push(format!("{tree_id}/{node_id}: {err}"));
                continue;
            }
        };
        let declared = match factory.outcomes(&spec) {
            Ok(outcomes) => outcomes,
            Err(err) => {
                errors.push(format!("{tree_id}/{node_id}: {err}"));
                continue;
            }
        };
        for outcome in &declared {
            if !node.connections.contains_key(outcome) {
                errors.push(format!("{tree_id}/{node_id}: no edge for outcome '{outcome}'"));
            }
        }
        for outcome in node.connections.keys() {
            if !declared.contains(outcome) {
                errors.push(format!(
                    "{tree_id}/{node_id}: edge for undeclared outcome '{outcome}'"
                ));
            }
        }
    }

    debug!(tree = %tree_id, violations = errors.len(), "validated tree");
    errors
}

/// Find cycles in the "evaluates as inner tree" relation between trees.
///
/// References to trees missing from `trees` are left to [`validate_tree`].
pub fn check_inner_tree_cycles(trees: &TreeRepository) -> Vec<String> {
    let graph = inner_tree_references(trees);
    let mut errors = Vec::new();
    let mut done = BTreeSet::new();
    let mut reported = BTreeSet::new();

    for start in graph.keys() {
        let mut path = Vec::new();
        visit(start, &graph, &mut path, &mut done, &mut reported, &mut errors);
    }
    errors
}

/// Every per-tree check plus the cross-tree cycle check.
pub fn validate_repository(trees: &TreeRepository, factory: &dyn NodeFactory) -> Vec<String> {
    let mut errors: Vec<String> = trees
        .trees()
        .iter()
        .flat_map(|tree| validate_tree(tree, factory))
        .collect();
    errors.extend(check_inner_tree_cycles(trees));
    errors
}

fn inner_tree_references(trees: &TreeRepository) -> BTreeMap<TreeId, BTreeSet<TreeId>> {
    trees
        .trees()
        .iter()
        .map(|tree| {
            let targets = tree
                .nodes_of_type(INNER_TREE_TYPE)
                .filter_map(|(_, node)| node.config.get("tree").and_then(|name| name.as_str()))
                .map(|name| TreeId::new(&tree.realm, name))
                .collect();
            (tree.id(), targets)
        })
        .collect()
}

fn visit(
    tree: &TreeId,
    graph: &BTreeMap<TreeId, BTreeSet<TreeId>>,
    path: &mut Vec<TreeId>,
    done: &mut BTreeSet<TreeId>,
    reported: &mut BTreeSet<TreeId>,
    errors: &mut Vec<String>,
) {
    if done.contains(tree) {
        return;
    }
    if let Some(position) = path.iter().position(|seen| seen == tree) {
        let cycle = &path[position..];
        // Report each cycle once, keyed by its smallest member.
        let Some(anchor) = cycle.iter().min() else {
            return;
        };
        if reported.insert(anchor.clone()) {
            let mut rendered: Vec<String> = cycle.iter().map(TreeId::to_string).collect();
            rendered.push(tree.to_string());
            errors.push(
                ConfigError::InnerTreeCycle {
                    path: rendered.join(" -> "),
                }
                .to_string(),
            );
        }
        return;
    }

    path.push(tree.clone());
    if let Some(targets) = graph.get(tree) {
        for target in targets {
            visit(target, graph, path, done, reported, errors);
        }
    }
    path.pop();
    done.insert(tree.clone());
}
