//! The publish pipeline: draft → validated, immutable published version.
//!
//! A publish request is a four-stage state machine, terminal on the first
//! failure:
//!
//! 1. load the draft (`NotFound` when none exists);
//! 2. JSON-schema + structural validation (`SchemaInvalid`);
//! 3. referential integrity, wizards only: every pinned page reference must
//!    exist as that exact published version (`ReferentialIntegrityFailed`,
//!    collecting every missing reference so the author sees all problems at
//!    once);
//! 4. atomic version assignment via the store.
//!
//! The draft row is never mutated or deleted by a publish.

use std::sync::Arc;

use stepwise_core::checksum;
use stepwise_core::definition::{PageBody, WizardBody};
use stepwise_core::error::CoreError;
use stepwise_core::schema::{self, SchemaViolation};
use stepwise_core::store::{DefinitionSource, DefinitionStore};
use stepwise_core::types::Timestamp;
use stepwise_core::version::{DefinitionKind, VersionTag};

/// What a successful publish returns to the caller.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub key: String,
    pub version: VersionTag,
    pub status: &'static str,
    pub published_at: Timestamp,
    pub checksum: String,
}

/// Validates drafts and promotes them to immutable published versions.
pub struct PublishPipeline {
    store: Arc<dyn DefinitionStore>,
}

impl PublishPipeline {
    pub fn new(store: Arc<dyn DefinitionStore>) -> Self {
        Self { store }
    }

    /// Publish the draft of `(kind, key)`.
    pub async fn publish(&self, kind: DefinitionKind, key: &str) -> Result<PublishReceipt, CoreError> {
        // 1. Load draft.
        let draft = self.store.get_draft(kind, key).await?.ok_or_else(|| {
            CoreError::NotFound {
                entity: kind.entity(),
                key: format!("{key} (draft)"),
            }
        })?;

        // 2. Schema + structural validation.
        let violations = validate_body(kind, &draft.schema_version, &draft.body)?;
        if !violations.is_empty() {
            return Err(CoreError::SchemaInvalid { violations });
        }

        // 3. Referential integrity (wizards only), collect-all.
        if kind == DefinitionKind::Wizard {
            let body = WizardBody::from_value(&draft.body)?;
            let mut missing = Vec::new();
            for page_ref in body.pinned_page_refs() {
                let found = self
                    .store
                    .get_published(DefinitionKind::Page, &page_ref.page_key, page_ref.version)
                    .await?;
                if found.is_none() {
                    missing.push(page_ref.to_string());
                }
            }
            if !missing.is_empty() {
                return Err(CoreError::ReferentialIntegrityFailed { missing });
            }
        }

        // 4. Version assignment & commit. The checksum is recomputed from
        // the exact validated body over its canonical form and is fixed
        // forever once the row exists.
        let body_checksum = checksum::of_value(&draft.body);
        let published = self
            .store
            .create_next_published_version(
                kind,
                key,
                draft.body,
                &draft.schema_version,
                &body_checksum,
                &draft.created_by,
            )
            .await?;

        tracing::info!(
            kind = %kind,
            key,
            version = %VersionTag::Published(published.version),
            checksum = %published.checksum,
            "Definition published"
        );

        Ok(PublishReceipt {
            key: published.key,
            version: VersionTag::Published(published.version),
            status: "published",
            published_at: published.published_at,
            checksum: published.checksum,
        })
    }
}

/// Run schema validation plus the structural checks the schema cannot
/// express, returning one consolidated violation list.
fn validate_body(
    kind: DefinitionKind,
    schema_version: &str,
    body: &serde_json::Value,
) -> Result<Vec<SchemaViolation>, CoreError> {
    let mut violations = schema::validate(schema_version, body)?;

    match kind {
        DefinitionKind::Wizard => {
            if let Ok(parsed) = WizardBody::from_value(body) {
                violations.extend(parsed.structural_violations());
            }
        }
        DefinitionKind::Page => {
            if let Ok(parsed) = PageBody::from_value(body) {
                violations.extend(parsed.structural_violations());
            }
        }
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryStore;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn pipeline(store: &Arc<InMemoryStore>) -> PublishPipeline {
        PublishPipeline::new(Arc::clone(store) as Arc<dyn DefinitionStore>)
    }

    fn page_body() -> serde_json::Value {
        json!({
            "name": "Select plan",
            "fields": [{"id": "plan", "type": "select", "label": "Plan",
                        "options": [{"value": "basic", "label": "Basic"}]}]
        })
    }

    fn wizard_body_with_ref(page_ref: &str) -> serde_json::Value {
        json!({
            "name": "Travel",
            "steps": [
                {"id": "s1", "title": "Start", "fields": [
                    {"id": "email", "type": "email", "label": "Email", "bind": "application.email"}
                ]},
                {"id": "s2", "title": "Plan", "pageRef": page_ref}
            ]
        })
    }

    async fn seed_draft(
        store: &Arc<InMemoryStore>,
        kind: DefinitionKind,
        key: &str,
        body: serde_json::Value,
    ) {
        let schema_version = kind.default_schema_version();
        store
            .create_draft(kind, key, body, schema_version, "tests")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publish_without_draft_is_not_found() {
        let store = Arc::new(InMemoryStore::default());
        let err = pipeline(&store)
            .publish(DefinitionKind::Wizard, "travel-uk")
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::NotFound { .. });
    }

    #[tokio::test]
    async fn schema_invalid_reports_paths_and_blocks_publish() {
        let store = Arc::new(InMemoryStore::default());
        seed_draft(
            &store,
            DefinitionKind::Wizard,
            "travel-uk",
            json!({"name": "W", "steps": []}),
        )
        .await;

        let err = pipeline(&store)
            .publish(DefinitionKind::Wizard, "travel-uk")
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::SchemaInvalid { ref violations } if violations
            .iter()
            .any(|v| v.instance_path == "/steps"));

        // Nothing was published.
        assert!(store
            .get_latest_published(DefinitionKind::Wizard, "travel-uk")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_step_ids_block_publish() {
        let store = Arc::new(InMemoryStore::default());
        seed_draft(
            &store,
            DefinitionKind::Wizard,
            "w",
            json!({
                "name": "W",
                "steps": [
                    {"id": "s1", "title": "A", "fields": [{"id": "f", "type": "text", "label": "F"}]},
                    {"id": "s1", "title": "B", "fields": [{"id": "g", "type": "text", "label": "G"}]}
                ]
            }),
        )
        .await;

        let err = pipeline(&store)
            .publish(DefinitionKind::Wizard, "w")
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::SchemaInvalid { ref violations } if violations
            .iter()
            .any(|v| v.message.contains("duplicate step id")));
    }

    #[tokio::test]
    async fn missing_page_refs_are_all_collected() {
        let store = Arc::new(InMemoryStore::default());
        seed_draft(
            &store,
            DefinitionKind::Wizard,
            "w",
            json!({
                "name": "W",
                "steps": [
                    {"id": "s1", "title": "A", "pageRef": "page.a@v1"},
                    {"id": "s2", "title": "B", "pageRef": "page.b@v3"}
                ]
            }),
        )
        .await;

        let err = pipeline(&store)
            .publish(DefinitionKind::Wizard, "w")
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::ReferentialIntegrityFailed { ref missing } => {
            assert_eq!(missing, &vec!["page.a@v1".to_string(), "page.b@v3".to_string()]);
        });
    }

    #[tokio::test]
    async fn publish_succeeds_after_page_is_published() {
        let store = Arc::new(InMemoryStore::default());
        seed_draft(&store, DefinitionKind::Page, "page.travel.selectPlan", page_body()).await;
        seed_draft(
            &store,
            DefinitionKind::Wizard,
            "travel-uk",
            wizard_body_with_ref("page.travel.selectPlan@v1"),
        )
        .await;

        // Wizard first: fails on the unpublished page.
        let err = pipeline(&store)
            .publish(DefinitionKind::Wizard, "travel-uk")
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::ReferentialIntegrityFailed { ref missing } => {
            assert_eq!(missing, &vec!["page.travel.selectPlan@v1".to_string()]);
        });

        // Publish the page, then the wizard.
        let page = pipeline(&store)
            .publish(DefinitionKind::Page, "page.travel.selectPlan")
            .await
            .unwrap();
        assert_eq!(page.version, VersionTag::Published(1));

        let receipt = pipeline(&store)
            .publish(DefinitionKind::Wizard, "travel-uk")
            .await
            .unwrap();
        assert_eq!(receipt.version, VersionTag::Published(1));
        assert_eq!(receipt.status, "published");
        assert_eq!(receipt.checksum.len(), 64);
    }

    #[tokio::test]
    async fn sequential_publishes_yield_increasing_versions() {
        let store = Arc::new(InMemoryStore::default());
        seed_draft(&store, DefinitionKind::Page, "p", page_body()).await;

        let first = pipeline(&store).publish(DefinitionKind::Page, "p").await.unwrap();
        assert_eq!(first.version, VersionTag::Published(1));

        // Edit the draft, publish again.
        let mut edited = page_body();
        edited["name"] = json!("Select plan v2");
        store
            .update_draft(DefinitionKind::Page, "p", edited, "tests")
            .await
            .unwrap();

        let second = pipeline(&store).publish(DefinitionKind::Page, "p").await.unwrap();
        assert_eq!(second.version, VersionTag::Published(2));
        assert_ne!(first.checksum, second.checksum);

        // v1 is unchanged after the second publish.
        let v1 = store
            .get_published(DefinitionKind::Page, "p", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v1.checksum, first.checksum);
        assert_eq!(v1.body, page_body());
    }

    #[tokio::test]
    async fn draft_survives_publish() {
        let store = Arc::new(InMemoryStore::default());
        seed_draft(&store, DefinitionKind::Page, "p", page_body()).await;
        pipeline(&store).publish(DefinitionKind::Page, "p").await.unwrap();

        let draft = store
            .get_draft(DefinitionKind::Page, "p")
            .await
            .unwrap()
            .expect("draft still present after publish");
        assert_eq!(draft.body, page_body());
    }

    #[tokio::test]
    async fn checksum_is_stable_under_reserialization() {
        let store = Arc::new(InMemoryStore::default());
        // Same structural body, different key order in the source text.
        let body: serde_json::Value = serde_json::from_str(
            r#"{"fields": [{"label": "Plan", "type": "text", "id": "plan"}], "name": "P"}"#,
        )
        .unwrap();
        seed_draft(&store, DefinitionKind::Page, "p", body).await;
        let receipt = pipeline(&store).publish(DefinitionKind::Page, "p").await.unwrap();

        let reordered: serde_json::Value = serde_json::from_str(
            r#"{"name": "P", "fields": [{"id": "plan", "type": "text", "label": "Plan"}]}"#,
        )
        .unwrap();
        assert_eq!(receipt.checksum, checksum::of_value(&reordered));
    }
}
