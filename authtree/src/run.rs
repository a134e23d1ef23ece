//! `authtree run`: one exchange of a tree against a file-backed checkpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::action::Webhook;
use crate::core::callback::Callback;
use crate::core::context::RequestMetadata;
use crate::core::executor::AuthTreeExecutor;
use crate::core::hooks::{Session, SessionHookRegistry};
use crate::core::registry::NodeRegistry;
use crate::core::state::{Outcome, TreeState};
use crate::core::tree::{TreeLookup, TreeRepository};
use crate::io::checkpoint_store::{clear_checkpoint, load_checkpoint, write_checkpoint};
use crate::io::init::WorkspacePaths;
use crate::io::tree_store::load_trees;

/// Everything needed to evaluate trees of one workspace.
pub struct Engine {
    pub trees: Arc<TreeRepository>,
    pub executor: AuthTreeExecutor,
    pub hooks: SessionHookRegistry,
}

impl Engine {
    /// Load config and trees under `root` and wire the built-in registries.
    pub fn load(root: &Path) -> Result<Self> {
        let (paths, config) = WorkspacePaths::load(root).with_context(|| "load authtree.toml")?;
        let trees = Arc::new(
            load_trees(&paths.schema_path, &paths.trees_dir).with_context(|| "load trees")?,
        );
        let lookup: Arc<dyn TreeLookup> = trees.clone();
        let factory = NodeRegistry::with_builtins().into_factory(lookup);
        Ok(Self {
            trees,
            executor: AuthTreeExecutor::new(Arc::new(factory)).with_limits(config.limits()),
            hooks: SessionHookRegistry::with_builtins(config.hook_cache_capacity),
        })
    }
}

/// Options for `run_exchange`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub realm: String,
    pub tree: String,
    /// Checkpoint file; defaults to `.authtree/<realm>/<tree>.checkpoint.json`.
    pub checkpoint: Option<PathBuf>,
    /// JSON array of answered callbacks.
    pub callbacks: Option<PathBuf>,
    /// Resume a parked tree without callbacks.
    pub resume_suspended: bool,
    pub request: RequestMetadata,
}

/// What one exchange produced, printed as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<Callback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_duration_secs: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<Webhook>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    pub checkpoint: PathBuf,
}

pub fn default_checkpoint_path(root: &Path, realm: &str, tree: &str) -> PathBuf {
    root.join(".authtree")
        .join(realm)
        .join(format!("{tree}.checkpoint.json"))
}

/// Run one exchange.
///
/// `NEED_INPUT` persists the new checkpoint; a decision clears it, and `TRUE`
/// also finalizes the session. On error the checkpoint file is left as is.
#[instrument(skip_all, fields(realm = %options.realm, tree = %options.tree))]
pub fn run_exchange(root: &Path, options: &RunOptions) -> Result<RunReport> {
    let engine = Engine::load(root)?;
    let tree = engine.trees.require(&options.realm, &options.tree)?;
    let checkpoint_path = options
        .checkpoint
        .clone()
        .unwrap_or_else(|| default_checkpoint_path(root, &options.realm, &options.tree));

    let callbacks = match &options.callbacks {
        Some(path) => read_callbacks(path)?,
        None => Vec::new(),
    };
    // A fresh pass ignores any stale checkpoint.
    let state = if callbacks.is_empty() && !options.resume_suspended {
        TreeState::default()
    } else {
        load_checkpoint(&checkpoint_path)?.unwrap_or_default()
    };

    let result = if options.resume_suspended {
        engine
            .executor
            .resume_suspended(&tree, &state, &options.request)?
    } else {
        engine
            .executor
            .process(&tree, &state, callbacks, &options.request)?
    };
    info!(outcome = ?result.outcome, "exchange finished");

    let session = match result.outcome {
        Outcome::NeedInput => {
            write_checkpoint(&checkpoint_path, &result.state)?;
            None
        }
        Outcome::True | Outcome::False => {
            let session = engine.hooks.finalize_session(&result, &options.request)?;
            clear_checkpoint(&checkpoint_path)?;
            session
        }
    };

    Ok(RunReport {
        outcome: result.outcome,
        suspend_duration_secs: result.suspend_duration.map(|duration| duration.as_secs()),
        webhooks: if result.outcome.is_terminal() {
            result.state.webhooks
        } else {
            Vec::new()
        },
        callbacks: result.callbacks,
        session,
        checkpoint: checkpoint_path,
    })
}

fn read_callbacks(path: &Path) -> Result<Vec<Callback>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read callbacks {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse callbacks {}", path.display()))
}
