//! Hook execution against external HTTP collaborators.
//!
//! A hook call is an explicit task with a hard per-hook timeout: the
//! outbound payload is projected out of session state via the hook's
//! `requestMap`, the response is projected back into state patches via its
//! `responseMap`, and a call that never returns is cut off and reported as
//! timed out rather than left pending.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use stepwise_core::hook::{HookDefinition, HookOutcome, StatePatch};
use stepwise_core::paths;

/// Executes one declared hook against the outside world.
#[async_trait]
pub trait HookExecutor: Send + Sync {
    async fn execute(&self, hook: &HookDefinition, state: &Value) -> HookOutcome;
}

/// [`HookExecutor`] that POSTs JSON to the hook's URL.
pub struct HttpHookExecutor {
    client: reqwest::Client,
}

impl HttpHookExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpHookExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookExecutor for HttpHookExecutor {
    async fn execute(&self, hook: &HookDefinition, state: &Value) -> HookOutcome {
        let payload = match build_payload(hook, state) {
            Ok(p) => p,
            Err(message) => return HookOutcome::failed(message),
        };

        let timeout_secs = hook.timeout_secs();
        let request = self.client.post(&hook.url).json(&payload).send();

        let response = match tokio::time::timeout(Duration::from_secs(timeout_secs), request).await
        {
            Err(_) => {
                tracing::warn!(hook = %hook.id, timeout_secs, "Hook timed out");
                return HookOutcome::timeout(timeout_secs);
            }
            Ok(Err(e)) => return HookOutcome::failed(format!("request failed: {e}")),
            Ok(Ok(r)) => r,
        };

        let status = response.status();
        if !status.is_success() {
            return HookOutcome::failed(format!("endpoint returned {status}"));
        }

        let body: Value = match response.json().await {
            Ok(b) => b,
            Err(e) => return HookOutcome::failed(format!("invalid JSON response: {e}")),
        };

        match project_response(hook, &body) {
            Ok(patches) => HookOutcome::ok(patches),
            Err(message) => HookOutcome::failed(message),
        }
    }
}

/// Build the outbound JSON payload from session state via `requestMap`.
///
/// `from` is a state path; `to` is a path within the payload (same
/// grammar). Absent state values are sent as `null` so the collaborator
/// sees every declared key.
fn build_payload(hook: &HookDefinition, state: &Value) -> Result<Value, String> {
    let mut payload = Value::Object(Map::new());
    for entry in &hook.request_map {
        let value = paths::get(state, &entry.from)
            .map_err(|e| format!("bad requestMap path: {e}"))?
            .cloned()
            .unwrap_or(Value::Null);
        payload = paths::set(&payload, &entry.to, value)
            .map_err(|e| format!("bad requestMap target: {e}"))?;
    }
    Ok(payload)
}

/// Project the collaborator's response into state patches via `responseMap`.
///
/// Response paths that resolve to nothing are skipped (the collaborator
/// legitimately omits optional data); the target paths are validated here
/// so a bad mapping fails the hook instead of the batch application.
fn project_response(hook: &HookDefinition, body: &Value) -> Result<Vec<StatePatch>, String> {
    let mut patches = Vec::new();
    for entry in &hook.response_map {
        paths::parse(&entry.to).map_err(|e| format!("bad responseMap target: {e}"))?;
        let value = paths::get(body, &entry.from)
            .map_err(|e| format!("bad responseMap path: {e}"))?;
        match value {
            Some(v) => patches.push(StatePatch {
                path: entry.to.clone(),
                value: v.clone(),
            }),
            None => {
                tracing::debug!(hook = %hook.id, from = %entry.from, "Response path absent, skipped");
            }
        }
    }
    Ok(patches)
}
