//! Immutable tree definitions and tree lookup.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::ConfigError;

/// Edge target marking a successful terminal decision.
pub const TRUE_DECISION: &str = "true-decision";
/// Edge target marking a failed terminal decision.
pub const FALSE_DECISION: &str = "false-decision";

/// Realm-scoped tree identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId {
    pub realm: String,
    pub name: String,
}

impl TreeId {
    pub fn new(realm: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            name: name.into(),
        }
    }

    /// Shared-state key `__authtree.<namespace>.<realm>/<tree>/<node>` for a
    /// composite's bookkeeping. Node ids are only unique within one tree, and
    /// nested trees share one document.
    pub fn state_key(&self, namespace: &str, node_id: &str) -> String {
        format!("__authtree.{namespace}.{self}/{node_id}")
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.realm, self.name)
    }
}

/// Where an outcome edge leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTarget<'a> {
    Node(&'a str),
    Decision(bool),
}

impl<'a> EdgeTarget<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw {
            TRUE_DECISION => EdgeTarget::Decision(true),
            FALSE_DECISION => EdgeTarget::Decision(false),
            id => EdgeTarget::Node(id),
        }
    }
}

/// One node of a tree: its type, configuration and outgoing edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub node_type: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
    /// Outcome label → target node id or terminal marker.
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
}

/// Everything a factory needs to instantiate one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeSpec<'a> {
    pub node_id: &'a str,
    pub node_type: &'a str,
    pub display_name: &'a str,
    pub tree: &'a TreeId,
    pub config: &'a Value,
}

impl NodeSpec<'_> {
    pub fn realm(&self) -> &str {
        &self.tree.realm
    }
}

/// Immutable authentication tree. Shared across evaluations behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTree {
    pub realm: String,
    pub name: String,
    pub entry_node_id: String,
    pub nodes: BTreeMap<String, TreeNode>,
}

impl AuthTree {
    pub fn builder(realm: impl Into<String>, name: impl Into<String>) -> AuthTreeBuilder {
        AuthTreeBuilder {
            tree: AuthTree {
                realm: realm.into(),
                name: name.into(),
                entry_node_id: String::new(),
                nodes: BTreeMap::new(),
            },
        }
    }

    pub fn id(&self) -> TreeId {
        TreeId::new(&self.realm, &self.name)
    }

    /// Entry node id, failing if it does not name a node of this tree.
    pub fn entry(&self) -> Result<&str, ConfigError> {
        if self.entry_node_id.is_empty() || !self.nodes.contains_key(&self.entry_node_id) {
            return Err(ConfigError::MissingEntry {
                tree: self.name.clone(),
            });
        }
        Ok(&self.entry_node_id)
    }

    pub fn node(&self, node_id: &str) -> Result<&TreeNode, ConfigError> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| ConfigError::NodeNotFound {
                tree: self.name.clone(),
                node_id: node_id.to_string(),
            })
    }

    /// Resolve the edge leaving `node_id` for `outcome`.
    pub fn next(&self, node_id: &str, outcome: &str) -> Result<EdgeTarget<'_>, ConfigError> {
        let node = self.node(node_id)?;
        let raw = node
            .connections
            .get(outcome)
            .ok_or_else(|| ConfigError::MissingEdge {
                tree: self.name.clone(),
                node_id: node_id.to_string(),
                outcome: outcome.to_string(),
            })?;
        let target = EdgeTarget::parse(raw);
        if let EdgeTarget::Node(next) = target {
            self.node(next)?;
        }
        Ok(target)
    }

    pub fn node_spec<'a>(&'a self, id: &'a TreeId, node_id: &'a str) -> Result<NodeSpec<'a>, ConfigError> {
        let node = self.node(node_id)?;
        Ok(NodeSpec {
            node_id,
            node_type: &node.node_type,
            display_name: &node.display_name,
            tree: id,
            config: &node.config,
        })
    }

    /// Node ids whose type is `node_type`, in id order.
    pub fn nodes_of_type<'a>(&'a self, node_type: &'a str) -> impl Iterator<Item = (&'a str, &'a TreeNode)> {
        self.nodes
            .iter()
            .filter(move |(_, node)| node.node_type == node_type)
            .map(|(id, node)| (id.as_str(), node))
    }
}

/// Incremental construction of an [`AuthTree`], mostly for tests and tooling.
#[derive(Debug, Clone)]
pub struct AuthTreeBuilder {
    tree: AuthTree,
}

impl AuthTreeBuilder {
    pub fn entry(mut self, node_id: impl Into<String>) -> Self {
        self.tree.entry_node_id = node_id.into();
        self
    }

    pub fn node(mut self, node_id: impl Into<String>, node_type: impl Into<String>, config: Value) -> Self {
        let node_id = node_id.into();
        self.tree.nodes.insert(
            node_id.clone(),
            TreeNode {
                node_type: node_type.into(),
                display_name: node_id,
                config,
                connections: BTreeMap::new(),
            },
        );
        self
    }

    /// Connect `outcome` of `from` to `to`. Unknown `from` ids are ignored here
    /// and reported by validation.
    pub fn edge(mut self, from: &str, outcome: impl Into<String>, to: impl Into<String>) -> Self {
        if let Some(node) = self.tree.nodes.get_mut(from) {
            node.connections.insert(outcome.into(), to.into());
        }
        self
    }

    pub fn build(self) -> AuthTree {
        self.tree
    }
}

/// Lookup of tree definitions by realm and name.
pub trait TreeLookup: Send + Sync {
    fn get_tree(&self, realm: &str, name: &str) -> Option<Arc<AuthTree>>;
}

/// In-memory tree lookup, populated at configuration load.
#[derive(Debug, Clone, Default)]
pub struct TreeRepository {
    trees: HashMap<TreeId, Arc<AuthTree>>,
}

impl TreeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tree: AuthTree) -> Arc<AuthTree> {
        let tree = Arc::new(tree);
        self.trees.insert(tree.id(), Arc::clone(&tree));
        tree
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Trees sorted by id for deterministic iteration.
    pub fn trees(&self) -> Vec<Arc<AuthTree>> {
        let mut trees: Vec<_> = self.trees.values().cloned().collect();
        trees.sort_by_key(|tree| tree.id());
        trees
    }

    pub fn require(&self, realm: &str, name: &str) -> Result<Arc<AuthTree>, ConfigError> {
        self.get_tree(realm, name)
            .ok_or_else(|| ConfigError::TreeNotFound {
                realm: realm.to_string(),
                name: name.to_string(),
            })
    }
}

impl TreeLookup for TreeRepository {
    fn get_tree(&self, realm: &str, name: &str) -> Option<Arc<AuthTree>> {
        self.trees.get(&TreeId::new(realm, name)).cloned()
    }
}
