//! Engine configuration stored in `authtree.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::executor::ExecutorLimits;

pub const CONFIG_FILE: &str = "authtree.toml";

/// Engine configuration (TOML).
///
/// Edited by humans; every field is optional and defaults to the values
/// below. Relative paths resolve against the directory holding the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `<realm>/<name>.json` tree definitions.
    pub trees_dir: PathBuf,

    /// JSON Schema every tree file must satisfy.
    pub schema_path: PathBuf,

    /// Maximum node invocations per tree per exchange.
    pub max_steps: usize,

    /// Maximum inner-tree nesting depth.
    pub max_depth: usize,

    /// Number of session hook factories kept instantiated.
    pub hook_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = ExecutorLimits::default();
        Self {
            trees_dir: PathBuf::from("trees"),
            schema_path: PathBuf::from("schemas/auth_tree/v1.schema.json"),
            max_steps: limits.max_steps,
            max_depth: limits.max_depth,
            hook_cache_capacity: 32,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.trees_dir.as_os_str().is_empty() {
            return Err(anyhow!("trees_dir must not be empty"));
        }
        if self.schema_path.as_os_str().is_empty() {
            return Err(anyhow!("schema_path must not be empty"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.hook_cache_capacity == 0 {
            return Err(anyhow!("hook_cache_capacity must be > 0"));
        }
        Ok(())
    }

    pub fn limits(&self) -> ExecutorLimits {
        ExecutorLimits {
            max_steps: self.max_steps,
            max_depth: self.max_depth,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), max_steps = cfg.max_steps, max_depth = cfg.max_depth, "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.limits(), ExecutorLimits::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        let cfg = EngineConfig {
            max_steps: 64,
            ..EngineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "max_depth = 3\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_depth, 3);
        assert_eq!(cfg.trees_dir, PathBuf::from("trees"));
    }

    #[test]
    fn zero_step_limit_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "max_steps = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("max_steps must be > 0"));
    }
}
