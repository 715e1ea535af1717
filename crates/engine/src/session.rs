//! The live session engine.
//!
//! [`SessionManager`] owns every active session on this node: a registry of
//! per-session state guarded by one `tokio::sync::Mutex` each, which is both
//! the in-memory continuity (navigation history lives here, not in storage)
//! and the per-session serialization point required for concurrent requests
//! on the same session id.
//!
//! Persistence is layered underneath: session creation and explicit state
//! updates must reach the store, while navigation (`advance`, `go_back`) and
//! hook effects save best-effort — a failed save is logged and the in-memory
//! state stays authoritative for the running session.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use stepwise_core::condition;
use stepwise_core::definition::WizardBody;
use stepwise_core::error::CoreError;
use stepwise_core::hook::{self, HookDefinition};
use stepwise_core::paths;
use stepwise_core::routing::{RoutingStrategy, StepAdvance};
use stepwise_core::session::{initial_state, SessionRecord, SessionStatus};
use stepwise_core::store::{DefinitionSource, SessionStore};
use stepwise_core::version::{DefinitionKind, VersionTag};

/// One session resident in memory: the persisted record plus the pinned
/// wizard body and the navigation history (deliberately not persisted).
struct ActiveSession {
    record: SessionRecord,
    wizard: WizardBody,
    history: Vec<String>,
}

impl ActiveSession {
    fn ensure_mutable(&self) -> Result<(), CoreError> {
        if self.record.status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "Session is {}; no further changes are allowed",
                self.record.status.as_str()
            )));
        }
        if self.record.expires_at <= chrono::Utc::now() {
            return Err(CoreError::NotFound {
                entity: "Session",
                key: self.record.session_id.to_string(),
            });
        }
        Ok(())
    }

    fn current_step_id(&self) -> Result<String, CoreError> {
        self.record
            .current_step
            .clone()
            .ok_or_else(|| CoreError::Validation("Session has no current step".to_string()))
    }

    /// Step ids whose gate conditions all hold against the current state.
    fn visible_steps(&self) -> Vec<String> {
        self.wizard
            .steps
            .iter()
            .filter(|step| {
                step.conditions
                    .iter()
                    .all(|c| condition::evaluate(c, &self.record.state))
            })
            .map(|step| step.id.clone())
            .collect()
    }
}

/// Owns and serializes all running sessions on this node.
pub struct SessionManager {
    definitions: Arc<dyn DefinitionSource>,
    store: Arc<dyn SessionStore>,
    hooks: Arc<dyn crate::hooks::HookExecutor>,
    routing: Arc<dyn RoutingStrategy>,
    ttl: chrono::Duration,
    active: Mutex<HashMap<Uuid, Arc<Mutex<ActiveSession>>>>,
}

impl SessionManager {
    pub fn new(
        definitions: Arc<dyn DefinitionSource>,
        store: Arc<dyn SessionStore>,
        hooks: Arc<dyn crate::hooks::HookExecutor>,
        routing: Arc<dyn RoutingStrategy>,
        ttl_hours: i64,
    ) -> Self {
        Self {
            definitions,
            store,
            hooks,
            routing,
            ttl: chrono::Duration::hours(ttl_hours),
            active: Mutex::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start a new session for a wizard.
    ///
    /// Resolves the wizard at its pinned version (or the latest published
    /// one) and every referenced page concurrently; any single failure
    /// aborts creation and no session is recorded.
    pub async fn start(
        &self,
        wizard_key: &str,
        version: Option<u32>,
        prefill: Option<Value>,
    ) -> Result<SessionRecord, CoreError> {
        let published = match version {
            Some(n) => {
                self.definitions
                    .get_published(DefinitionKind::Wizard, wizard_key, n)
                    .await?
            }
            None => {
                self.definitions
                    .get_latest_published(DefinitionKind::Wizard, wizard_key)
                    .await?
            }
        }
        .ok_or_else(|| CoreError::NotFound {
            entity: "Wizard",
            key: match version {
                Some(n) => format!("{wizard_key}@v{n}"),
                None => format!("{wizard_key} (no published version)"),
            },
        })?;

        let wizard = WizardBody::from_value(&published.body).map_err(|e| {
            CoreError::Internal(format!(
                "Published wizard {wizard_key}@v{} failed to parse: {e}",
                published.version
            ))
        })?;

        // Published pages are pinned; resolve them all up front so a broken
        // reference surfaces at start, not mid-journey. Lookups are
        // independent reads and run concurrently.
        let lookups = wizard.pinned_page_refs().into_iter().map(|page_ref| {
            let definitions = Arc::clone(&self.definitions);
            async move {
                definitions
                    .get_published(DefinitionKind::Page, &page_ref.page_key, page_ref.version)
                    .await?
                    .map(|_| ())
                    .ok_or_else(|| CoreError::NotFound {
                        entity: "Page",
                        key: page_ref.to_string(),
                    })
            }
        });
        let resolved = futures::future::try_join_all(lookups).await?;

        let now = chrono::Utc::now();
        let record = SessionRecord {
            session_id: Uuid::new_v4(),
            wizard_key: wizard_key.to_string(),
            wizard_version: VersionTag::Published(published.version),
            status: SessionStatus::Started,
            current_step: wizard.first_step_id().map(str::to_string),
            state: initial_state(prefill),
            created_at: now,
            updated_at: now,
            expires_at: now + self.ttl,
        };

        // Creation must be durable; a session the widget cannot resume is
        // not a session.
        self.store.insert(&record).await?;

        tracing::info!(
            session_id = %record.session_id,
            wizard_key,
            wizard_version = %record.wizard_version,
            pages = resolved.len(),
            "Session started"
        );

        let entry = Arc::new(Mutex::new(ActiveSession {
            record: record.clone(),
            wizard,
            history: Vec::new(),
        }));
        self.active.lock().await.insert(record.session_id, entry);

        Ok(record)
    }

    /// Load a session, resuming it from storage when it is not resident.
    ///
    /// A resumed session starts with an empty history: `go_back` is
    /// unavailable until at least one forward navigation happens.
    pub async fn load(&self, session_id: Uuid) -> Result<SessionRecord, CoreError> {
        let entry = self.entry(session_id).await?;
        let session = entry.lock().await;
        // Resident sessions expire the same way stored ones do.
        if session.record.expires_at <= chrono::Utc::now() {
            return Err(CoreError::NotFound {
                entity: "Session",
                key: session_id.to_string(),
            });
        }
        Ok(session.record.clone())
    }

    /// Step ids currently visible given the session's state.
    pub async fn visible_steps(&self, session_id: Uuid) -> Result<Vec<String>, CoreError> {
        let entry = self.entry(session_id).await?;
        let session = entry.lock().await;
        Ok(session.visible_steps())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Bind a single value into the full state tree (both `application.*`
    /// and `context.*` are addressable).
    pub async fn bind_field(
        &self,
        session_id: Uuid,
        path: &str,
        value: Value,
    ) -> Result<SessionRecord, CoreError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        session.ensure_mutable()?;

        session.record.state = paths::set(&session.record.state, path, value)?;
        session.record.updated_at = chrono::Utc::now();
        self.save_best_effort(&session.record).await;
        Ok(session.record.clone())
    }

    /// Replace the full state tree (and optionally the current step).
    ///
    /// This is the durable autosave surface: it is idempotent under retry
    /// and a persistence failure is surfaced to the caller.
    pub async fn update_state(
        &self,
        session_id: Uuid,
        state: Value,
        current_step: Option<String>,
    ) -> Result<SessionRecord, CoreError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        session.ensure_mutable()?;

        if !state.is_object() {
            return Err(CoreError::Validation(
                "Session state must be a JSON object".to_string(),
            ));
        }
        if let Some(step_id) = &current_step {
            if session.wizard.step(step_id).is_none() {
                return Err(CoreError::Validation(format!(
                    "Step '{step_id}' is not part of this wizard"
                )));
            }
            session.record.current_step = Some(step_id.clone());
        }

        session.record.state = state;
        session.record.updated_at = chrono::Utc::now();
        self.store.save(&session.record).await?;
        Ok(session.record.clone())
    }

    /// Run the current step's `onEnter` hooks.
    ///
    /// Hooks execute sequentially in declaration order; each sees the state
    /// produced by its predecessors. All patches commit as one batch at the
    /// end. The first failure aborts the remaining hooks — patches already
    /// applied by earlier hooks in the batch are kept, not rolled back.
    pub async fn enter_current_step(&self, session_id: Uuid) -> Result<SessionRecord, CoreError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        session.ensure_mutable()?;

        let step_id = session.current_step_id()?;
        let hooks_list = step_hooks(&session.wizard, &step_id, HookTrigger::Enter)?;
        let result = self.run_hook_batch(&mut session, &hooks_list).await;
        self.save_best_effort(&session.record).await;
        result.map(|()| session.record.clone())
    }

    /// Advance to the next step (or complete the wizard).
    ///
    /// The current step's `onSubmit` hooks run first; a hook failure leaves
    /// the step unchanged. Routing is delegated to the configured
    /// [`RoutingStrategy`]. The advanced pointer is persisted best-effort so
    /// resume lands on the right step, but navigation never blocks on the
    /// store.
    pub async fn advance(&self, session_id: Uuid) -> Result<SessionRecord, CoreError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        session.ensure_mutable()?;

        let step_id = session.current_step_id()?;
        let hooks_list = step_hooks(&session.wizard, &step_id, HookTrigger::Submit)?;
        if let Err(e) = self.run_hook_batch(&mut session, &hooks_list).await {
            // Hook effects so far are kept; the transition does not happen.
            self.save_best_effort(&session.record).await;
            return Err(e);
        }

        match self.routing.next_step(&session.wizard, &step_id)? {
            StepAdvance::Next(next_id) => {
                session.history.push(step_id.clone());
                session.record.current_step = Some(next_id.clone());
                session.record.updated_at = chrono::Utc::now();
                self.save_best_effort(&session.record).await;
                tracing::info!(
                    session_id = %session_id,
                    from_step = %step_id,
                    to_step = %next_id,
                    "Session advanced"
                );
            }
            StepAdvance::Complete => {
                session.record.status = SessionStatus::Completed;
                session.record.updated_at = chrono::Utc::now();
                self.save_best_effort(&session.record).await;
                tracing::info!(
                    session_id = %session_id,
                    last_step = %step_id,
                    "Session completed"
                );
            }
        }

        Ok(session.record.clone())
    }

    /// Go back one step without re-running entry hooks.
    ///
    /// Reports [`CoreError::NoHistory`] when there is nothing to go back to
    /// (first step, or freshly resumed).
    pub async fn go_back(&self, session_id: Uuid) -> Result<SessionRecord, CoreError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        session.ensure_mutable()?;

        let previous = session.history.pop().ok_or(CoreError::NoHistory)?;
        session.record.current_step = Some(previous.clone());
        session.record.updated_at = chrono::Utc::now();
        // No irreversible side effect happened; eventual consistency is
        // acceptable here.
        self.save_best_effort(&session.record).await;

        tracing::info!(session_id = %session_id, to_step = %previous, "Session went back");
        Ok(session.record.clone())
    }

    /// Mark a session as abandoned.
    pub async fn abandon(&self, session_id: Uuid) -> Result<SessionRecord, CoreError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        session.ensure_mutable()?;

        session.record.status = SessionStatus::Abandoned;
        session.record.updated_at = chrono::Utc::now();
        self.store.save(&session.record).await?;

        tracing::info!(session_id = %session_id, "Session abandoned");
        Ok(session.record.clone())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Fetch (or rebuild from storage) the resident entry for a session.
    async fn entry(&self, session_id: Uuid) -> Result<Arc<Mutex<ActiveSession>>, CoreError> {
        if let Some(entry) = self.active.lock().await.get(&session_id) {
            return Ok(Arc::clone(entry));
        }

        let record = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "Session",
                key: session_id.to_string(),
            })?;

        let version = record.wizard_version.number().ok_or_else(|| {
            CoreError::Internal(format!(
                "Session {session_id} is pinned to a draft wizard version"
            ))
        })?;
        let published = self
            .definitions
            .get_published(DefinitionKind::Wizard, &record.wizard_key, version)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "Wizard",
                key: format!("{}@v{version}", record.wizard_key),
            })?;
        let wizard = WizardBody::from_value(&published.body).map_err(|e| {
            CoreError::Internal(format!("Published wizard body failed to parse: {e}"))
        })?;

        tracing::debug!(session_id = %session_id, "Session resumed from storage");

        let entry = Arc::new(Mutex::new(ActiveSession {
            record,
            wizard,
            history: Vec::new(),
        }));
        let mut active = self.active.lock().await;
        Ok(Arc::clone(active.entry(session_id).or_insert(entry)))
    }

    /// Execute a hook batch sequentially, committing state once at the end.
    ///
    /// The working copy accumulates each hook's patches so later hooks see
    /// earlier effects, and observers only ever see the batch result.
    async fn run_hook_batch(
        &self,
        session: &mut ActiveSession,
        hooks_list: &[HookDefinition],
    ) -> Result<(), CoreError> {
        if hooks_list.is_empty() {
            return Ok(());
        }

        let mut working = session.record.state.clone();
        let mut failure = None;

        for hook_def in hooks_list {
            let outcome = self.hooks.execute(hook_def, &working).await;
            if outcome.success {
                match hook::apply_patches(&working, &outcome.state_patches) {
                    Ok(next) => working = next,
                    Err(e) => {
                        failure = Some(CoreError::HookFailed {
                            hook: hook_def.id.clone(),
                            message: format!("invalid state patch: {e}"),
                        });
                        break;
                    }
                }
            } else if outcome.timed_out {
                failure = Some(CoreError::HookTimeout {
                    hook: hook_def.id.clone(),
                    timeout_secs: hook_def.timeout_secs(),
                });
                break;
            } else {
                failure = Some(CoreError::HookFailed {
                    hook: hook_def.id.clone(),
                    message: outcome
                        .error
                        .unwrap_or_else(|| "unknown hook error".to_string()),
                });
                break;
            }
        }

        session.record.state = working;
        session.record.updated_at = chrono::Utc::now();

        match failure {
            Some(e) => {
                tracing::warn!(session_id = %session.record.session_id, error = %e, "Hook batch aborted");
                Err(e)
            }
            None => Ok(()),
        }
    }

    async fn save_best_effort(&self, record: &SessionRecord) {
        if let Err(e) = self.store.save(record).await {
            tracing::warn!(
                session_id = %record.session_id,
                error = %e,
                "Best-effort session save failed; in-memory state remains authoritative"
            );
        }
    }
}

/// Which hook list of a step to run.
#[derive(Debug, Clone, Copy)]
enum HookTrigger {
    Enter,
    Submit,
}

fn step_hooks(
    wizard: &WizardBody,
    step_id: &str,
    trigger: HookTrigger,
) -> Result<Vec<HookDefinition>, CoreError> {
    let step = wizard.step(step_id).ok_or_else(|| {
        CoreError::Validation(format!("Step '{step_id}' is not part of this wizard"))
    })?;
    Ok(match trigger {
        HookTrigger::Enter => step.on_enter.clone(),
        HookTrigger::Submit => step.on_submit.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{InMemorySessions, InMemoryStore, ScriptedHookExecutor};
    use assert_matches::assert_matches;
    use serde_json::json;
    use stepwise_core::hook::{HookOutcome, StatePatch};
    use stepwise_core::routing::LinearRouting;

    struct Fixture {
        definitions: Arc<InMemoryStore>,
        sessions: Arc<InMemorySessions>,
        hooks: Arc<ScriptedHookExecutor>,
        manager: SessionManager,
    }

    fn fixture_with_ttl(ttl_hours: i64) -> Fixture {
        let definitions = Arc::new(InMemoryStore::default());
        let sessions = Arc::new(InMemorySessions::default());
        let hooks = Arc::new(ScriptedHookExecutor::default());
        let manager = SessionManager::new(
            Arc::clone(&definitions) as Arc<dyn DefinitionSource>,
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&hooks) as Arc<dyn crate::hooks::HookExecutor>,
            Arc::new(LinearRouting),
            ttl_hours,
        );
        Fixture {
            definitions,
            sessions,
            hooks,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_ttl(24)
    }

    fn three_step_wizard() -> serde_json::Value {
        json!({
            "name": "Travel",
            "steps": [
                {"id": "s1", "title": "One", "fields": [{"id": "a", "type": "text", "label": "A"}]},
                {"id": "s2", "title": "Two", "fields": [{"id": "b", "type": "text", "label": "B"}]},
                {"id": "s3", "title": "Three", "fields": [{"id": "c", "type": "text", "label": "C"}]}
            ]
        })
    }

    fn patch(path: &str, value: serde_json::Value) -> StatePatch {
        StatePatch {
            path: path.to_string(),
            value,
        }
    }

    // -- start --

    #[tokio::test]
    async fn start_initializes_and_persists() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());

        let record = f
            .manager
            .start("travel", None, Some(json!({"email": "jo@example.com"})))
            .await
            .unwrap();

        assert_eq!(record.status, SessionStatus::Started);
        assert_eq!(record.current_step.as_deref(), Some("s1"));
        assert_eq!(record.wizard_version, VersionTag::Published(1));
        assert_eq!(
            record.state,
            json!({"application": {"email": "jo@example.com"}, "context": {}})
        );
        assert!(f.sessions.stored(record.session_id).is_some());
    }

    #[tokio::test]
    async fn start_resolves_pinned_version() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let mut v2 = three_step_wizard();
        v2["name"] = json!("Travel v2");
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 2, v2);

        let pinned = f.manager.start("travel", Some(1), None).await.unwrap();
        assert_eq!(pinned.wizard_version, VersionTag::Published(1));

        let latest = f.manager.start("travel", None, None).await.unwrap();
        assert_eq!(latest.wizard_version, VersionTag::Published(2));
    }

    #[tokio::test]
    async fn start_fails_without_published_wizard() {
        let f = fixture();
        let err = f.manager.start("travel", None, None).await.unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "Wizard", .. });
    }

    #[tokio::test]
    async fn start_aborts_when_any_page_is_missing() {
        let f = fixture();
        let wizard = json!({
            "name": "W",
            "steps": [
                {"id": "s1", "title": "A", "pageRef": "page.a@v1"},
                {"id": "s2", "title": "B", "pageRef": "page.missing@v1"}
            ]
        });
        f.definitions
            .seed_published(DefinitionKind::Wizard, "w", 1, wizard);
        f.definitions.seed_published(
            DefinitionKind::Page,
            "page.a",
            1,
            json!({"fields": [{"id": "f", "type": "text", "label": "F"}]}),
        );

        let err = f.manager.start("w", None, None).await.unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "Page", ref key } if key == "page.missing@v1");
    }

    // -- linear navigation scenario --

    #[tokio::test]
    async fn linear_scenario_with_back_navigation() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        let r = f.manager.advance(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s2"));

        let r = f.manager.advance(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s3"));

        let r = f.manager.go_back(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s2"));

        let r = f.manager.advance(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s3"));
        assert_eq!(r.status, SessionStatus::Started);
    }

    #[tokio::test]
    async fn advancing_past_last_step_completes() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        f.manager.advance(id).await.unwrap();
        f.manager.advance(id).await.unwrap();
        let r = f.manager.advance(id).await.unwrap();

        assert_eq!(r.status, SessionStatus::Completed);
        // The pointer stays on the last step in the durable record.
        assert_eq!(r.current_step.as_deref(), Some("s3"));

        // Terminal sessions reject further mutation.
        let err = f.manager.advance(id).await.unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[tokio::test]
    async fn go_back_on_first_step_reports_no_history() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        let err = f.manager.go_back(id).await.unwrap_err();
        assert_matches!(err, CoreError::NoHistory);

        let r = f.manager.load(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn resume_drops_history() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;
        f.manager.advance(id).await.unwrap();

        // A second manager over the same stores models a restarted node.
        let resumed = SessionManager::new(
            Arc::clone(&f.definitions) as Arc<dyn DefinitionSource>,
            Arc::clone(&f.sessions) as Arc<dyn SessionStore>,
            Arc::clone(&f.hooks) as Arc<dyn crate::hooks::HookExecutor>,
            Arc::new(LinearRouting),
            24,
        );

        let r = resumed.load(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s2"));

        // History is not restored: back navigation needs a forward move first.
        let err = resumed.go_back(id).await.unwrap_err();
        assert_matches!(err, CoreError::NoHistory);

        resumed.advance(id).await.unwrap();
        let r = resumed.go_back(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s2"));
    }

    // -- state binding & updates --

    #[tokio::test]
    async fn bind_field_addresses_the_full_tree() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        f.manager
            .bind_field(id, "application.traveler.age", json!(34))
            .await
            .unwrap();
        let r = f
            .manager
            .bind_field(id, "context.locale", json!("en-GB"))
            .await
            .unwrap();

        assert_eq!(r.state["application"]["traveler"]["age"], json!(34));
        assert_eq!(r.state["context"]["locale"], json!("en-GB"));
        // Persisted too.
        assert_eq!(
            f.sessions.stored(id).unwrap().state["context"]["locale"],
            json!("en-GB")
        );
    }

    #[tokio::test]
    async fn bind_field_rejects_invalid_paths() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        let err = f
            .manager
            .bind_field(id, "application.__proto__.x", json!(1))
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::InvalidPath(_));
    }

    #[tokio::test]
    async fn update_state_is_idempotent() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        let body = json!({"application": {"email": "jo@example.com"}, "context": {}});
        let first = f
            .manager
            .update_state(id, body.clone(), Some("s2".to_string()))
            .await
            .unwrap();
        let second = f
            .manager
            .update_state(id, body.clone(), Some("s2".to_string()))
            .await
            .unwrap();

        assert_eq!(first.state, second.state);
        assert_eq!(first.current_step, second.current_step);
        assert_eq!(f.sessions.stored(id).unwrap().state, body);
    }

    #[tokio::test]
    async fn update_state_validates_step_and_shape() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        let err = f
            .manager
            .update_state(id, json!([1, 2]), None)
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));

        let err = f
            .manager
            .update_state(id, json!({}), Some("nope".to_string()))
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    // -- hooks --

    fn wizard_with_hooks() -> serde_json::Value {
        json!({
            "name": "W",
            "steps": [
                {"id": "s1", "title": "Quote",
                 "fields": [{"id": "a", "type": "text", "label": "A"}],
                 "onEnter": [
                     {"id": "h1", "url": "https://hooks/h1"},
                     {"id": "h2", "url": "https://hooks/h2"},
                     {"id": "h3", "url": "https://hooks/h3"}
                 ],
                 "onSubmit": [
                     {"id": "submit1", "url": "https://hooks/submit1"}
                 ]},
                {"id": "s2", "title": "Done", "fields": [{"id": "b", "type": "text", "label": "B"}]}
            ]
        })
    }

    #[tokio::test]
    async fn enter_hooks_run_in_order_and_see_prior_patches() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "w", 1, wizard_with_hooks());
        let id = f.manager.start("w", None, None).await.unwrap().session_id;

        f.hooks
            .enqueue("h1", HookOutcome::ok(vec![patch("application.quote.premium", json!(99.5))]));
        f.hooks
            .enqueue("h2", HookOutcome::ok(vec![patch("context.quote_id", json!("q-1"))]));
        f.hooks.enqueue("h3", HookOutcome::ok(vec![]));

        let r = f.manager.enter_current_step(id).await.unwrap();

        assert_eq!(f.hooks.call_order(), vec!["h1", "h2", "h3"]);
        // h2 observed h1's patch.
        assert_eq!(
            f.hooks.observed_state(1)["application"]["quote"]["premium"],
            json!(99.5)
        );
        assert_eq!(r.state["application"]["quote"]["premium"], json!(99.5));
        assert_eq!(r.state["context"]["quote_id"], json!("q-1"));
    }

    #[tokio::test]
    async fn hook_failure_aborts_batch_but_keeps_prior_patches() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "w", 1, wizard_with_hooks());
        let id = f.manager.start("w", None, None).await.unwrap().session_id;

        f.hooks
            .enqueue("h1", HookOutcome::ok(vec![patch("application.quote.premium", json!(99.5))]));
        f.hooks.enqueue("h2", HookOutcome::failed("upstream 500"));

        let err = f.manager.enter_current_step(id).await.unwrap_err();
        assert_matches!(err, CoreError::HookFailed { ref hook, .. } if hook == "h2");

        // h3 never ran.
        assert_eq!(f.hooks.call_order(), vec!["h1", "h2"]);

        // h1's patch survived the abort.
        let r = f.manager.load(id).await.unwrap();
        assert_eq!(r.state["application"]["quote"]["premium"], json!(99.5));
    }

    #[tokio::test]
    async fn hook_timeout_surfaces_as_hook_timeout() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "w", 1, wizard_with_hooks());
        let id = f.manager.start("w", None, None).await.unwrap().session_id;

        f.hooks.enqueue("h1", HookOutcome::timeout(10));

        let err = f.manager.enter_current_step(id).await.unwrap_err();
        assert_matches!(err, CoreError::HookTimeout { ref hook, timeout_secs: 10 } if hook == "h1");
    }

    #[tokio::test]
    async fn submit_hook_failure_blocks_the_transition() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "w", 1, wizard_with_hooks());
        let id = f.manager.start("w", None, None).await.unwrap().session_id;

        f.hooks.enqueue("submit1", HookOutcome::failed("validation rejected"));

        let err = f.manager.advance(id).await.unwrap_err();
        assert_matches!(err, CoreError::HookFailed { ref hook, .. } if hook == "submit1");

        // Step pointer unchanged.
        let r = f.manager.load(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s1"));
    }

    // -- best-effort persistence --

    #[tokio::test]
    async fn advance_survives_persistence_failure() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        f.sessions.fail_saves(true);
        let r = f.manager.advance(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s2"));

        // The store still has the old pointer; in-memory is authoritative.
        assert_eq!(
            f.sessions.stored(id).unwrap().current_step.as_deref(),
            Some("s1")
        );

        f.sessions.fail_saves(false);
        let r = f.manager.advance(id).await.unwrap();
        assert_eq!(r.current_step.as_deref(), Some("s3"));
        assert_eq!(
            f.sessions.stored(id).unwrap().current_step.as_deref(),
            Some("s3")
        );
    }

    // -- expiry & lifecycle --

    #[tokio::test]
    async fn expired_sessions_are_not_found() {
        let f = fixture_with_ttl(-1);
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        let err = f.manager.advance(id).await.unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "Session", .. });
    }

    #[tokio::test]
    async fn abandoned_sessions_reject_mutation() {
        let f = fixture();
        f.definitions
            .seed_published(DefinitionKind::Wizard, "travel", 1, three_step_wizard());
        let id = f.manager.start("travel", None, None).await.unwrap().session_id;

        let r = f.manager.abandon(id).await.unwrap();
        assert_eq!(r.status, SessionStatus::Abandoned);

        let err = f.manager.bind_field(id, "application.x", json!(1)).await.unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let f = fixture();
        let err = f.manager.load(Uuid::new_v4()).await.unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "Session", .. });
    }

    // -- visibility --

    #[tokio::test]
    async fn visible_steps_follow_conditions() {
        let f = fixture();
        let wizard = json!({
            "name": "W",
            "steps": [
                {"id": "s1", "title": "A", "fields": [{"id": "a", "type": "text", "label": "A"}]},
                {"id": "s2", "title": "B",
                 "fields": [{"id": "b", "type": "text", "label": "B"}],
                 "conditions": [{"field": "application.age", "operator": "gte", "value": 18}]}
            ]
        });
        f.definitions.seed_published(DefinitionKind::Wizard, "w", 1, wizard);
        let id = f.manager.start("w", None, None).await.unwrap().session_id;

        assert_eq!(f.manager.visible_steps(id).await.unwrap(), vec!["s1"]);

        f.manager
            .bind_field(id, "application.age", json!(21))
            .await
            .unwrap();
        assert_eq!(f.manager.visible_steps(id).await.unwrap(), vec!["s1", "s2"]);
    }
}
