//! Hook declarations and execution outcomes.
//!
//! A hook is an external, side-effecting operation bound to step entry or
//! submission. The core owns the declaration shape and the patch-application
//! semantics; actually calling the external system lives in the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::paths;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default timeout for a single hook invocation in seconds.
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 10;

/// Maximum number of hooks allowed on a single step trigger.
pub const MAX_HOOKS_PER_TRIGGER: usize = 20;

// ---------------------------------------------------------------------------
// Declaration
// ---------------------------------------------------------------------------

/// One entry of a hook's request map: read `from` (a state path) and send it
/// under `to` (a key in the outbound payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMapEntry {
    pub from: String,
    pub to: String,
}

/// One entry of a hook's response map: read `from` (a path into the external
/// response) and write it at `to` (a state path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMapEntry {
    pub from: String,
    pub to: String,
}

/// A declared hook on a step (`onEnter` / `onSubmit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookDefinition {
    /// Identifier used in logs and error reports.
    pub id: String,
    /// Endpoint of the external collaborator.
    pub url: String,
    #[serde(default)]
    pub request_map: Vec<RequestMapEntry>,
    #[serde(default)]
    pub response_map: Vec<ResponseMapEntry>,
    /// Per-hook timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl HookDefinition {
    /// Effective timeout for this hook.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A single state mutation produced by a hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    pub path: String,
    pub value: Value,
}

/// Result of executing one hook.
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub success: bool,
    /// Patches to apply in order; empty on failure.
    pub state_patches: Vec<StatePatch>,
    pub error: Option<String>,
    /// Whether the failure was the per-hook timeout elapsing. Lets the
    /// caller surface `HookTimeout` instead of a generic `HookFailed`.
    pub timed_out: bool,
}

impl HookOutcome {
    pub fn ok(state_patches: Vec<StatePatch>) -> Self {
        Self {
            success: true,
            state_patches,
            error: None,
            timed_out: false,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            state_patches: Vec::new(),
            error: Some(message.into()),
            timed_out: false,
        }
    }

    pub fn timeout(timeout_secs: u64) -> Self {
        Self {
            success: false,
            state_patches: Vec::new(),
            error: Some(format!("timed out after {timeout_secs}s")),
            timed_out: true,
        }
    }
}

/// Apply patches to a state tree in order, returning the new tree.
///
/// The input tree is not mutated. Fails on the first invalid patch path;
/// callers treat that as a hook failure for the whole batch.
pub fn apply_patches(state: &Value, patches: &[StatePatch]) -> Result<Value, CoreError> {
    let mut next = state.clone();
    for patch in patches {
        next = paths::set(&next, &patch.path, patch.value.clone())?;
    }
    Ok(next)
}
