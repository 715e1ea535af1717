//! In-memory store and executor doubles for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use stepwise_core::checksum;
use stepwise_core::error::CoreError;
use stepwise_core::hook::{HookDefinition, HookOutcome};
use stepwise_core::session::SessionRecord;
use stepwise_core::store::{
    DefinitionSource, DefinitionStore, DraftDefinition, PublishedDefinition, SessionStore,
    VersionEntry,
};
use stepwise_core::version::{DefinitionKind, VersionTag};

use crate::hooks::HookExecutor;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    drafts: HashMap<(DefinitionKind, String), DraftDefinition>,
    published: HashMap<(DefinitionKind, String), Vec<PublishedDefinition>>,
}

/// In-memory [`DefinitionStore`] mirroring the PostgreSQL semantics.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    /// Seed a published version directly, bypassing the publish pipeline.
    pub fn seed_published(&self, kind: DefinitionKind, key: &str, version: u32, body: Value) {
        let now = chrono::Utc::now();
        let def = PublishedDefinition {
            kind,
            key: key.to_string(),
            version,
            schema_version: kind.default_schema_version().to_string(),
            checksum: checksum::of_value(&body),
            body,
            created_by: "tests".to_string(),
            created_at: now,
            published_at: now,
        };
        self.inner
            .lock()
            .unwrap()
            .published
            .entry((kind, key.to_string()))
            .or_default()
            .push(def);
    }
}

#[async_trait]
impl DefinitionSource for InMemoryStore {
    async fn get_published(
        &self,
        kind: DefinitionKind,
        key: &str,
        version: u32,
    ) -> Result<Option<PublishedDefinition>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .published
            .get(&(kind, key.to_string()))
            .and_then(|versions| versions.iter().find(|d| d.version == version))
            .cloned())
    }

    async fn get_latest_published(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Option<PublishedDefinition>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .published
            .get(&(kind, key.to_string()))
            .and_then(|versions| versions.iter().max_by_key(|d| d.version))
            .cloned())
    }
}

#[async_trait]
impl DefinitionStore for InMemoryStore {
    async fn get_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Option<DraftDefinition>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.drafts.get(&(kind, key.to_string())).cloned())
    }

    async fn create_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        schema_version: &str,
        author: &str,
    ) -> Result<DraftDefinition, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.drafts.contains_key(&(kind, key.to_string())) {
            return Err(CoreError::Conflict(format!(
                "Draft already exists for {kind} '{key}'"
            )));
        }
        let draft = DraftDefinition {
            kind,
            key: key.to_string(),
            schema_version: schema_version.to_string(),
            checksum: checksum::of_value(&body),
            body,
            created_by: author.to_string(),
            created_at: chrono::Utc::now(),
        };
        inner.drafts.insert((kind, key.to_string()), draft.clone());
        Ok(draft)
    }

    async fn update_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        author: &str,
    ) -> Result<DraftDefinition, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let draft = inner
            .drafts
            .get_mut(&(kind, key.to_string()))
            .ok_or_else(|| CoreError::NotFound {
                entity: kind.entity(),
                key: format!("{key} (draft)"),
            })?;
        draft.checksum = checksum::of_value(&body);
        draft.body = body;
        draft.created_by = author.to_string();
        Ok(draft.clone())
    }

    async fn delete_draft(&self, kind: DefinitionKind, key: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .drafts
            .remove(&(kind, key.to_string()))
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound {
                entity: kind.entity(),
                key: format!("{key} (draft)"),
            })
    }

    async fn list_drafts(
        &self,
        kind: DefinitionKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DraftDefinition>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let mut drafts: Vec<_> = inner
            .drafts
            .values()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect();
        drafts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(drafts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_versions(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Vec<VersionEntry>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let mut entries = Vec::new();
        if let Some(draft) = inner.drafts.get(&(kind, key.to_string())) {
            entries.push(VersionEntry {
                version: VersionTag::Draft,
                checksum: draft.checksum.clone(),
                created_at: draft.created_at,
                published_at: None,
            });
        }
        if let Some(versions) = inner.published.get(&(kind, key.to_string())) {
            let mut published: Vec<_> = versions.clone();
            published.sort_by(|a, b| b.version.cmp(&a.version));
            entries.extend(published.into_iter().map(|d| VersionEntry {
                version: VersionTag::Published(d.version),
                checksum: d.checksum,
                created_at: d.created_at,
                published_at: Some(d.published_at),
            }));
        }
        Ok(entries)
    }

    async fn create_next_published_version(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        schema_version: &str,
        checksum_hex: &str,
        created_by: &str,
    ) -> Result<PublishedDefinition, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let versions = inner.published.entry((kind, key.to_string())).or_default();
        let next = versions.iter().map(|d| d.version).max().unwrap_or(0) + 1;
        let now = chrono::Utc::now();
        let def = PublishedDefinition {
            kind,
            key: key.to_string(),
            version: next,
            schema_version: schema_version.to_string(),
            body,
            checksum: checksum_hex.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
            published_at: now,
        };
        versions.push(def.clone());
        Ok(def)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// In-memory [`SessionStore`] with a switch to make saves fail, for
/// exercising best-effort persistence paths.
#[derive(Default)]
pub struct InMemorySessions {
    records: Mutex<HashMap<Uuid, SessionRecord>>,
    fail_saves: AtomicBool,
}

impl InMemorySessions {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.records.lock().unwrap().get(&session_id).cloned()
    }
}

#[async_trait]
impl SessionStore for InMemorySessions {
    async fn insert(&self, record: &SessionRecord) -> Result<(), CoreError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.session_id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Option<SessionRecord>, CoreError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&session_id)
            .filter(|r| r.expires_at > chrono::Utc::now())
            .cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), CoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CoreError::Internal("simulated save failure".to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.session_id, record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// [`HookExecutor`] double that replays queued outcomes per hook id and
/// records every call it receives.
#[derive(Default)]
pub struct ScriptedHookExecutor {
    outcomes: Mutex<HashMap<String, VecDeque<HookOutcome>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedHookExecutor {
    pub fn enqueue(&self, hook_id: &str, outcome: HookOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(hook_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Hook ids in the order they were executed.
    pub fn call_order(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    /// The state snapshot the n-th call observed.
    pub fn observed_state(&self, n: usize) -> Value {
        self.calls.lock().unwrap()[n].1.clone()
    }
}

#[async_trait]
impl HookExecutor for ScriptedHookExecutor {
    async fn execute(&self, hook: &HookDefinition, state: &Value) -> HookOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((hook.id.clone(), state.clone()));
        self.outcomes
            .lock()
            .unwrap()
            .get_mut(&hook.id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| HookOutcome::ok(Vec::new()))
    }
}
