//! `authtree validate`: every configuration-time check over a workspace.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::registry::NodeRegistry;
use crate::core::tree::TreeLookup;
use crate::core::validation::validate_repository;
use crate::io::init::WorkspacePaths;
use crate::io::tree_store::load_trees;

/// Result of validating a workspace that could be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    pub trees: usize,
    pub violations: Vec<String>,
}

impl ValidateOutcome {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Load config and trees under `root` and run all validators.
///
/// Load failures (unreadable files, schema violations) are errors; semantic
/// violations are collected in the outcome.
pub fn validate_workspace(root: &Path) -> Result<ValidateOutcome> {
    let (paths, _config) = WorkspacePaths::load(root).with_context(|| "load authtree.toml")?;
    let trees = Arc::new(
        load_trees(&paths.schema_path, &paths.trees_dir).with_context(|| "load trees")?,
    );
    let lookup: Arc<dyn TreeLookup> = trees.clone();
    let factory = NodeRegistry::with_builtins().into_factory(lookup);
    let violations = validate_repository(&trees, &factory);
    info!(trees = trees.len(), violations = violations.len(), "workspace validated");
    Ok(ValidateOutcome {
        trees: trees.len(),
        violations,
    })
}
