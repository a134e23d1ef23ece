//! Explicit node-type registry and the factory built on it.
//!
//! Node types are enumerated at startup: each type identifier maps to a
//! constructor taking the node's spec (id, realm, tree, config). Nothing is
//! resolved by name at call time beyond a map lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::core::error::ConfigError;
use crate::core::inner_tree::{INNER_TREE_TYPE, InnerTreeEvaluatorNode};
use crate::core::node::Node;
use crate::core::page::{PAGE_TYPE, PageNode};
use crate::core::tree::{NodeSpec, TreeLookup};
use crate::nodes;

/// Collaborators available while constructing a node.
pub struct BuildContext<'a> {
    /// Factory for composite nodes that build children.
    pub factory: &'a dyn NodeFactory,
    /// Tree lookup for nodes that reference other trees.
    pub trees: &'a dyn TreeLookup,
}

pub type NodeConstructor = Arc<
    dyn Fn(&NodeSpec<'_>, &BuildContext<'_>) -> Result<Arc<dyn Node>, ConfigError> + Send + Sync,
>;

/// Instantiates nodes by type.
pub trait NodeFactory: Send + Sync {
    fn create_node(&self, spec: &NodeSpec<'_>) -> Result<Arc<dyn Node>, ConfigError>;

    /// Outcome provider: the outcomes a node of this spec declares.
    fn outcomes(&self, spec: &NodeSpec<'_>) -> Result<Vec<String>, ConfigError> {
        Ok(self.create_node(spec)?.outcomes())
    }
}

/// Map from node-type identifier to constructor.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    constructors: BTreeMap<String, NodeConstructor>,
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the composite nodes and the built-in primitive nodes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PAGE_TYPE, |spec, build| {
            Ok(Arc::new(PageNode::from_spec(spec, build)?) as Arc<dyn Node>)
        });
        registry.register(INNER_TREE_TYPE, |spec, build| {
            Ok(Arc::new(InnerTreeEvaluatorNode::from_spec(spec, build)?) as Arc<dyn Node>)
        });
        nodes::register_builtins(&mut registry);
        registry
    }

    /// Register (or replace) the constructor for `node_type`.
    pub fn register<F>(&mut self, node_type: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&NodeSpec<'_>, &BuildContext<'_>) -> Result<Arc<dyn Node>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(node_type.into(), Arc::new(constructor));
        self
    }

    /// Register a shared, pre-built node for `node_type` (config is ignored).
    pub fn register_instance(&mut self, node_type: impl Into<String>, node: Arc<dyn Node>) -> &mut Self {
        self.register(node_type, move |_, _| Ok(Arc::clone(&node)))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.constructors.contains_key(node_type)
    }

    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn into_factory(self, trees: Arc<dyn TreeLookup>) -> RegistryNodeFactory {
        RegistryNodeFactory {
            registry: self,
            trees,
        }
    }
}

/// [`NodeFactory`] backed by a [`NodeRegistry`] and a tree lookup.
pub struct RegistryNodeFactory {
    registry: NodeRegistry,
    trees: Arc<dyn TreeLookup>,
}

impl RegistryNodeFactory {
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn trees(&self) -> &dyn TreeLookup {
        self.trees.as_ref()
    }
}

impl NodeFactory for RegistryNodeFactory {
    fn create_node(&self, spec: &NodeSpec<'_>) -> Result<Arc<dyn Node>, ConfigError> {
        let constructor = self
            .registry
            .constructors
            .get(spec.node_type)
            .ok_or_else(|| ConfigError::UnknownNodeType {
                node_type: spec.node_type.to_string(),
                node_id: spec.node_id.to_string(),
            })?;
        trace!(node_id = spec.node_id, node_type = spec.node_type, "creating node");
        constructor(
            spec,
            &BuildContext {
                factory: self,
                trees: self.trees.as_ref(),
            },
        )
    }
}
