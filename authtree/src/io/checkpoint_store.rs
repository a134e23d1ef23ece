//! File-backed checkpoint between CLI exchanges.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::state::{TreeState, decode_checkpoint, encode_checkpoint};

/// Load the checkpoint at `path`; `None` when no evaluation is in flight.
pub fn load_checkpoint(path: &Path) -> Result<Option<TreeState>> {
    if !path.exists() {
        debug!(path = %path.display(), "no checkpoint");
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read checkpoint {}", path.display()))?;
    let state = decode_checkpoint(&contents)
        .with_context(|| format!("parse checkpoint {}", path.display()))?;
    debug!(
        path = %path.display(),
        current_node = ?state.current_node_id,
        shared_keys = state.shared_state.len(),
        "checkpoint loaded"
    );
    Ok(Some(state))
}

/// Atomically write the checkpoint (temp file + rename).
pub fn write_checkpoint(path: &Path, state: &TreeState) -> Result<()> {
    debug!(path = %path.display(), current_node = ?state.current_node_id, "writing checkpoint");
    let mut buf = encode_checkpoint(state).context("serialize checkpoint")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

/// Remove the checkpoint once an evaluation has reached a decision.
pub fn clear_checkpoint(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("remove checkpoint {}", path.display()))?;
        debug!(path = %path.display(), "checkpoint cleared");
    }
    Ok(())
}
