//! Test-only helpers: closure-backed nodes, a pre-wired engine and a scratch
//! workspace on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::action::{Action, SINGLE_OUTCOME};
use crate::core::callback::Callback;
use crate::core::context::TreeContext;
use crate::core::error::NodeError;
use crate::core::executor::{AuthTreeExecutor, ExecutorLimits};
use crate::core::node::Node;
use crate::core::registry::NodeRegistry;
use crate::core::tree::{AuthTree, TreeLookup, TreeRepository};

/// Realm used by every tree the test engine is built with.
pub const TEST_REALM: &str = "root";

type ProcessFn = dyn Fn(&TreeContext<'_>) -> Result<Action, NodeError> + Send + Sync;

/// A node whose behavior is a closure.
pub struct FnNode {
    outcomes: Vec<String>,
    process: Box<ProcessFn>,
}

impl FnNode {
    pub fn new<I, S, F>(outcomes: I, process: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&TreeContext<'_>) -> Result<Action, NodeError> + Send + Sync + 'static,
    {
        Self {
            outcomes: outcomes.into_iter().map(Into::into).collect(),
            process: Box::new(process),
        }
    }

    /// Node with the single outcome `outcome`.
    pub fn single<F>(process: F) -> Self
    where
        F: Fn(&TreeContext<'_>) -> Result<Action, NodeError> + Send + Sync + 'static,
    {
        Self::new([SINGLE_OUTCOME], process)
    }
}

impl Node for FnNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        (self.process)(context)
    }

    fn outcomes(&self) -> Vec<String> {
        self.outcomes.clone()
    }
}

/// Asks for one value with prompt `key`, then stores the answer in shared
/// state under `key` and leaves through `outcome`.
pub fn prompt_node(key: &str) -> FnNode {
    let key = key.to_string();
    FnNode::single(move |ctx| {
        let answer = ctx
            .callbacks
            .iter()
            .find(|callback| callback.is_answered())
            .and_then(Callback::answer);
        match answer {
            Some(value) => Ok(Action::goto(SINGLE_OUTCOME)
                .with_shared_state(ctx.shared_state.with(key.as_str(), value.clone()))),
            None => Ok(Action::suspend(vec![
                Callback::new("NameCallback").with_output("prompt", key.as_str()),
            ])),
        }
    })
}

/// Copy of `callback` carrying `value` as the caller's answer.
pub fn answer(callback: &Callback, value: impl Into<Value>) -> Callback {
    callback.clone().answered(value)
}

/// Executor over the built-in registry plus test nodes and trees.
pub struct TestEngine {
    pub executor: AuthTreeExecutor,
    pub trees: Arc<TreeRepository>,
}

impl TestEngine {
    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder::default()
    }

    /// Tree `name` in [`TEST_REALM`]. Panics when missing.
    pub fn tree(&self, name: &str) -> Arc<AuthTree> {
        self.trees
            .get_tree(TEST_REALM, name)
            .unwrap_or_else(|| panic!("test tree '{name}' not registered"))
    }
}

#[derive(Default)]
pub struct TestEngineBuilder {
    nodes: Vec<(String, Arc<dyn Node>)>,
    trees: Vec<AuthTree>,
    limits: ExecutorLimits,
}

impl TestEngineBuilder {
    /// Serve every node of `node_type` with the shared instance `node`.
    pub fn node(mut self, node_type: &str, node: impl Node + 'static) -> Self {
        self.nodes.push((node_type.to_string(), Arc::new(node)));
        self
    }

    pub fn tree(mut self, tree: AuthTree) -> Self {
        self.trees.push(tree);
        self
    }

    pub fn limits(mut self, limits: ExecutorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> TestEngine {
        let mut repository = TreeRepository::new();
        for tree in self.trees {
            repository.insert(tree);
        }
        let trees = Arc::new(repository);

        let mut registry = NodeRegistry::with_builtins();
        for (node_type, node) in self.nodes {
            registry.register_instance(node_type, node);
        }
        let lookup: Arc<dyn TreeLookup> = trees.clone();
        let executor =
            AuthTreeExecutor::new(Arc::new(registry.into_factory(lookup))).with_limits(self.limits);
        TestEngine { executor, trees }
    }
}

/// Temporary working directory for file-backed tests.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create temp workspace")?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `contents` at `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
