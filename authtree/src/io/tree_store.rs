//! Tree definitions on disk: `<trees_dir>/<realm>/<name>.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::tree::{AuthTree, TreeRepository};
use crate::core::validation::check_structure;

/// Compile the tree schema at `schema_path`.
pub fn load_schema(schema_path: &Path) -> Result<Validator> {
    let contents = fs::read_to_string(schema_path)
        .with_context(|| format!("read schema {}", schema_path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse schema {}", schema_path.display()))?;
    validator_for(&value).map_err(|err| anyhow!("invalid schema {}: {}", schema_path.display(), err))
}

/// Load one tree file: schema first, then graph structure.
pub fn load_tree(schema: &Validator, tree_path: &Path) -> Result<AuthTree> {
    let contents = fs::read_to_string(tree_path)
        .with_context(|| format!("read tree {}", tree_path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse tree {}", tree_path.display()))?;
    if !schema.is_valid(&value) {
        let messages = schema
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "tree schema validation failed for {}: {}",
            tree_path.display(),
            messages.join("; ")
        ));
    }
    let tree: AuthTree = serde_json::from_value(value)
        .with_context(|| format!("deserialize tree {}", tree_path.display()))?;
    let errors = check_structure(&tree);
    if !errors.is_empty() {
        return Err(anyhow!(
            "tree structure invalid in {}: {}",
            tree_path.display(),
            errors.join("; ")
        ));
    }
    Ok(tree)
}

/// Load every tree under `trees_dir` into a repository.
///
/// Each file must declare the realm and name its location implies.
pub fn load_trees(schema_path: &Path, trees_dir: &Path) -> Result<TreeRepository> {
    let schema = load_schema(schema_path)?;
    let mut repository = TreeRepository::new();
    for path in tree_files(trees_dir)? {
        let tree = load_tree(&schema, &path)?;
        let expected = tree_path(trees_dir, &tree.realm, &tree.name);
        if expected != path {
            return Err(anyhow!(
                "tree {}/{} must live at {}, found at {}",
                tree.realm,
                tree.name,
                expected.display(),
                path.display()
            ));
        }
        debug!(tree = %tree.id(), nodes = tree.nodes.len(), "tree loaded");
        repository.insert(tree);
    }
    info!(trees = repository.len(), dir = %trees_dir.display(), "trees loaded");
    Ok(repository)
}

/// Write `tree` to its canonical location under `trees_dir`.
pub fn write_tree(trees_dir: &Path, tree: &AuthTree) -> Result<PathBuf> {
    let path = tree_path(trees_dir, &tree.realm, &tree.name);
    let mut buf = serde_json::to_string_pretty(tree)?;
    buf.push('\n');
    super::write_atomic(&path, &buf)?;
    Ok(path)
}

pub fn tree_path(trees_dir: &Path, realm: &str, name: &str) -> PathBuf {
    trees_dir.join(realm).join(format!("{name}.json"))
}

/// `*.json` files one directory level below `trees_dir`, sorted.
fn tree_files(trees_dir: &Path) -> Result<Vec<PathBuf>> {
    if !trees_dir.is_dir() {
        return Err(anyhow!("missing trees directory {}", trees_dir.display()));
    }
    let mut files = Vec::new();
    for realm in read_dir_sorted(trees_dir)? {
        if !realm.is_dir() {
            continue;
        }
        for file in read_dir_sorted(&realm)? {
            if file.is_file() && file.extension().is_some_and(|ext| ext == "json") {
                files.push(file);
            }
        }
    }
    Ok(files)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("read directory {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("list directory {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}
