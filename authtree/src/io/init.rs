//! Workspace scaffolding for `authtree init`, and the canonical paths of a
//! workspace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::json;

use super::config::{CONFIG_FILE, EngineConfig, load_config, write_config};
use super::tree_store::write_tree;
use crate::core::action::SINGLE_OUTCOME;
use crate::core::inner_tree::INNER_TREE_TYPE;
use crate::core::page::PAGE_TYPE;
use crate::core::tree::{AuthTree, FALSE_DECISION, TRUE_DECISION};
use crate::nodes::{
    COLLECTOR_TYPE, IDENTIFY_TYPE, REGISTER_SESSION_HOOK_TYPE, SET_SESSION_PROPERTIES_TYPE,
    STATE_MATCH_TYPE,
};

pub const TREE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/auth_tree/v1.schema.json"
));

/// Realm of the trees written by `init`.
pub const EXAMPLE_REALM: &str = "root";

/// Canonical paths of a workspace rooted at `root`.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub schema_path: PathBuf,
    pub trees_dir: PathBuf,
}

impl WorkspacePaths {
    /// Paths for `root` using the locations named in `config`.
    pub fn new(root: impl Into<PathBuf>, config: &EngineConfig) -> Self {
        let root = root.into();
        Self {
            config_path: root.join(CONFIG_FILE),
            schema_path: root.join(&config.schema_path),
            trees_dir: root.join(&config.trees_dir),
            root,
        }
    }

    /// Load `authtree.toml` under `root` (defaults if absent) and resolve paths.
    pub fn load(root: &Path) -> Result<(Self, EngineConfig)> {
        let config = load_config(&root.join(CONFIG_FILE))?;
        Ok((Self::new(root, &config), config))
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing files.
    pub force: bool,
}

/// Write the default config, the tree schema and the example trees.
///
/// Fails if `authtree.toml` already exists unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<WorkspacePaths> {
    let config = EngineConfig::default();
    let paths = WorkspacePaths::new(root, &config);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "authtree init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    write_config(&paths.config_path, &config)?;
    if let Some(parent) = paths.schema_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&paths.schema_path, TREE_SCHEMA)
        .with_context(|| format!("write {}", paths.schema_path.display()))?;
    for tree in example_trees() {
        write_tree(&paths.trees_dir, &tree)?;
    }
    Ok(paths)
}

/// A username/password page, then an OTP check in an inner tree.
pub fn example_trees() -> Vec<AuthTree> {
    let login = AuthTree::builder(EXAMPLE_REALM, "login")
        .entry("credentials")
        .node(
            "credentials",
            PAGE_TYPE,
            json!({"children": [
                {"id": "username", "nodeType": COLLECTOR_TYPE, "displayName": "Username",
                 "config": {"key": "username", "prompt": "User Name"}},
                {"id": "password", "nodeType": COLLECTOR_TYPE, "displayName": "Password",
                 "config": {"key": "password", "prompt": "Password", "callbackType": "PasswordCallback", "transient": true}}
            ]}),
        )
        .node("identify", IDENTIFY_TYPE, json!({"key": "username"}))
        .node("mfa", INNER_TREE_TYPE, json!({"tree": "otp"}))
        .node(
            "session",
            SET_SESSION_PROPERTIES_TYPE,
            json!({"properties": {"authLevel": "2"}}),
        )
        .edge("credentials", SINGLE_OUTCOME, "identify")
        .edge("identify", "true", "mfa")
        .edge("identify", "false", FALSE_DECISION)
        .edge("mfa", "true", "session")
        .edge("mfa", "false", FALSE_DECISION)
        .edge("session", SINGLE_OUTCOME, TRUE_DECISION)
        .build();

    let otp = AuthTree::builder(EXAMPLE_REALM, "otp")
        .entry("code")
        .node(
            "code",
            COLLECTOR_TYPE,
            json!({"key": "otp", "prompt": "One-time code", "transient": true}),
        )
        .node("check", STATE_MATCH_TYPE, json!({"key": "otp", "expected": "123456"}))
        .node(
            "amr",
            REGISTER_SESSION_HOOK_TYPE,
            json!({"hookType": "set-session-property", "config": {"key": "amr", "value": "otp"}}),
        )
        .edge("code", SINGLE_OUTCOME, "check")
        .edge("check", "true", "amr")
        .edge("check", "false", FALSE_DECISION)
        .edge("amr", SINGLE_OUTCOME, TRUE_DECISION)
        .build();

    vec![login, otp]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::tree_store::load_trees;
    use crate::test_support::TestWorkspace;

    #[test]
    fn init_writes_loadable_workspace() {
        let workspace = TestWorkspace::new().expect("workspace");
        let paths = init_workspace(workspace.root(), &InitOptions { force: false }).expect("init");
        assert!(paths.config_path.is_file());

        let (loaded, config) = WorkspacePaths::load(workspace.root()).expect("load paths");
        assert_eq!(config, EngineConfig::default());
        let trees = load_trees(&loaded.schema_path, &loaded.trees_dir).expect("trees");
        assert_eq!(trees.len(), 2);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let workspace = TestWorkspace::new().expect("workspace");
        init_workspace(workspace.root(), &InitOptions { force: false }).expect("init");
        let err = init_workspace(workspace.root(), &InitOptions { force: false })
            .expect_err("second init");
        assert!(err.to_string().contains("already exists"));
        init_workspace(workspace.root(), &InitOptions { force: true }).expect("forced init");
    }
}
