//! Wizard and page body models.
//!
//! These are the typed views over the JSON `body` of a definition row. The
//! JSON schema (see [`crate::schema`]) is the authoritative shape gate at
//! publish time; the structs here are lenient on unknowns so that bodies
//! published under a newer schema revision still load at runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::error::CoreError;
use crate::hook::HookDefinition;
use crate::schema::SchemaViolation;
use crate::version::VersionTag;

// ---------------------------------------------------------------------------
// PageRef
// ---------------------------------------------------------------------------

/// A pinned reference to a published page version.
///
/// Wire notation is `<page_key>@<version>`, e.g.
/// `page.travel.selectPlan@v1`. The pin is always an exact published
/// version; `draft` and version-less references are rejected so a published
/// wizard can never drift with later page edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub page_key: String,
    pub version: u32,
}

impl PageRef {
    /// Parse the `<page_key>@<version>` notation.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut parts = raw.split('@');
        let (Some(page_key), Some(version), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CoreError::InvalidPageRef(raw.to_string()));
        };
        if page_key.is_empty() {
            return Err(CoreError::InvalidPageRef(raw.to_string()));
        }
        match VersionTag::parse(version) {
            Ok(VersionTag::Published(n)) => Ok(Self {
                page_key: page_key.to_string(),
                version: n,
            }),
            // Draft pins and malformed versions are both invalid notation.
            _ => Err(CoreError::InvalidPageRef(raw.to_string())),
        }
    }
}

impl std::fmt::Display for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.page_key, self.version)
    }
}

// ---------------------------------------------------------------------------
// FieldType
// ---------------------------------------------------------------------------

/// The rendering/input type of a field.
///
/// Unrecognized wire strings deserialize to [`FieldType::Unknown`]; the
/// schema rejects them at publish time, but bodies already published under
/// a newer schema must still load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Email,
    Number,
    Select,
    Checkbox,
    Textarea,
    Date,
    Radio,
    File,
    Unknown(String),
}

impl FieldType {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "email" => Self::Email,
            "number" => Self::Number,
            "select" => Self::Select,
            "checkbox" => Self::Checkbox,
            "textarea" => Self::Textarea,
            "date" => Self::Date,
            "radio" => Self::Radio,
            "file" => Self::File,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Number => "number",
            Self::Select => "select",
            Self::Checkbox => "checkbox",
            Self::Textarea => "textarea",
            Self::Date => "date",
            Self::Radio => "radio",
            Self::File => "file",
            Self::Unknown(s) => s,
        }
    }

    /// Whether this field type requires an `options` list.
    pub fn needs_options(&self) -> bool {
        matches!(self, Self::Select | Self::Radio)
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&s))
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// One option of a select/radio field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: Value,
    pub label: String,
}

/// A data-collection field, either inline on a step or on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    /// State path the field value binds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A declared (currently unrouted) conditional-routing rule.
///
/// Carried in the data model so a conditional [`crate::routing::RoutingStrategy`]
/// can consume it; the shipped linear strategy ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,
    pub step: String,
}

/// One step of a wizard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub title: String,
    /// Pinned page reference (`<page_key>@<version>`); mutually exclusive
    /// with inline `fields`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_enter: Vec<HookDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_submit: Vec<HookDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<NextRule>,
}

impl Step {
    /// Parse this step's page reference, if declared.
    pub fn parsed_page_ref(&self) -> Option<Result<PageRef, CoreError>> {
        self.page_ref.as_deref().map(PageRef::parse)
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// The typed body of a wizard definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardBody {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

/// The typed body of a page definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl WizardBody {
    /// Parse a wizard body from its JSON form.
    pub fn from_value(body: &Value) -> Result<Self, CoreError> {
        serde_json::from_value(body.clone())
            .map_err(|e| CoreError::Validation(format!("Invalid wizard body: {e}")))
    }

    /// Structural checks the JSON schema cannot express.
    ///
    /// Returned violations use the same `(instance_path, message)` shape as
    /// schema errors so publish reports one consolidated list.
    pub fn structural_violations(&self) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();

        if self.steps.is_empty() {
            violations.push(SchemaViolation::new(
                "/steps",
                "a wizard must declare at least one step",
            ));
        }

        let mut seen_ids: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            let at = |suffix: &str| format!("/steps/{i}{suffix}");

            if !seen_ids.insert(step.id.as_str()) {
                violations.push(SchemaViolation::new(
                    at("/id"),
                    format!("duplicate step id '{}'", step.id),
                ));
            }

            match (&step.page_ref, step.fields.is_empty()) {
                (Some(_), false) => violations.push(SchemaViolation::new(
                    at(""),
                    "a step declares either 'pageRef' or inline 'fields', not both",
                )),
                (None, true) => violations.push(SchemaViolation::new(
                    at(""),
                    "a step must declare 'pageRef' or inline 'fields'",
                )),
                _ => {}
            }

            if let Some(Err(_)) = step.parsed_page_ref() {
                violations.push(SchemaViolation::new(
                    at("/pageRef"),
                    format!(
                        "invalid page reference '{}': expected '<page_key>@<version>'",
                        step.page_ref.as_deref().unwrap_or_default()
                    ),
                ));
            }

            for (j, field) in step.fields.iter().enumerate() {
                if field.field_type.needs_options() && field.options.is_empty() {
                    violations.push(SchemaViolation::new(
                        format!("/steps/{i}/fields/{j}"),
                        format!("{} fields must have 'options'", field.field_type.as_str()),
                    ));
                }
            }

            for (list, name) in [(&step.on_enter, "onEnter"), (&step.on_submit, "onSubmit")] {
                if list.len() > crate::hook::MAX_HOOKS_PER_TRIGGER {
                    violations.push(SchemaViolation::new(
                        at(&format!("/{name}")),
                        format!(
                            "at most {} hooks are allowed per trigger",
                            crate::hook::MAX_HOOKS_PER_TRIGGER
                        ),
                    ));
                }
            }
        }

        violations
    }

    /// All well-formed pinned page references, deduplicated, in step order.
    pub fn pinned_page_refs(&self) -> Vec<PageRef> {
        let mut seen = std::collections::HashSet::new();
        let mut refs = Vec::new();
        for step in &self.steps {
            if let Some(Ok(page_ref)) = step.parsed_page_ref() {
                if seen.insert(page_ref.clone()) {
                    refs.push(page_ref);
                }
            }
        }
        refs
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The id of the first step, if any.
    pub fn first_step_id(&self) -> Option<&str> {
        self.steps.first().map(|s| s.id.as_str())
    }
}

impl PageBody {
    pub fn from_value(body: &Value) -> Result<Self, CoreError> {
        serde_json::from_value(body.clone())
            .map_err(|e| CoreError::Validation(format!("Invalid page body: {e}")))
    }

    /// Structural checks the JSON schema cannot express.
    pub fn structural_violations(&self) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        for (i, field) in self.fields.iter().enumerate() {
            if field.field_type.needs_options() && field.options.is_empty() {
                violations.push(SchemaViolation::new(
                    format!("/fields/{i}"),
                    format!("{} fields must have 'options'", field.field_type.as_str()),
                ));
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    // -- PageRef --

    #[test]
    fn page_ref_parses_pinned_notation() {
        let r = PageRef::parse("page.travel.selectPlan@v1").unwrap();
        assert_eq!(r.page_key, "page.travel.selectPlan");
        assert_eq!(r.version, 1);
        assert_eq!(r.to_string(), "page.travel.selectPlan@v1");
    }

    #[test]
    fn page_ref_requires_exactly_one_at() {
        for bad in ["page.travel", "a@v1@v2", "@v1", "", "@"] {
            assert_matches!(
                PageRef::parse(bad),
                Err(CoreError::InvalidPageRef(_)),
                "ref '{bad}'"
            );
        }
    }

    #[test]
    fn page_ref_rejects_draft_and_bad_versions() {
        for bad in ["p@draft", "p@latest", "p@v0", "p@1", "p@"] {
            assert_matches!(
                PageRef::parse(bad),
                Err(CoreError::InvalidPageRef(_)),
                "ref '{bad}'"
            );
        }
    }

    // -- body parsing --

    fn wizard_body(value: Value) -> WizardBody {
        WizardBody::from_value(&value).unwrap()
    }

    #[test]
    fn parses_minimal_wizard() {
        let body = wizard_body(json!({
            "name": "Travel",
            "steps": [
                {"id": "s1", "title": "Start", "fields": [
                    {"id": "email", "type": "email", "label": "Email", "bind": "application.email", "required": true}
                ]},
                {"id": "s2", "title": "Plan", "pageRef": "page.travel.selectPlan@v1"}
            ]
        }));
        assert_eq!(body.steps.len(), 2);
        assert_eq!(body.first_step_id(), Some("s1"));
        assert_eq!(body.step("s2").unwrap().title, "Plan");
        assert!(body.structural_violations().is_empty());
    }

    #[test]
    fn unknown_field_type_still_parses() {
        let body = wizard_body(json!({
            "name": "W",
            "steps": [{"id": "s1", "title": "T", "fields": [
                {"id": "f", "type": "signature", "label": "Sign"}
            ]}]
        }));
        assert_matches!(
            body.steps[0].fields[0].field_type,
            FieldType::Unknown(ref s) if s == "signature"
        );
    }

    #[test]
    fn hooks_and_conditions_parse() {
        let body = wizard_body(json!({
            "name": "W",
            "steps": [{
                "id": "s1", "title": "T",
                "fields": [{"id": "f", "type": "text", "label": "F"}],
                "conditions": [{"field": "application.age", "operator": "gte", "value": 18}],
                "onEnter": [{"id": "quote", "url": "https://hooks/quote",
                             "requestMap": [{"from": "application.age", "to": "age"}],
                             "responseMap": [{"from": "premium", "to": "application.quote.premium"}]}]
            }]
        }));
        assert_eq!(body.steps[0].on_enter.len(), 1);
        assert_eq!(body.steps[0].conditions.len(), 1);
    }

    // -- structural violations --

    #[test]
    fn empty_steps_flagged() {
        let body = wizard_body(json!({"name": "W", "steps": []}));
        let v = body.structural_violations();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].instance_path, "/steps");
    }

    #[test]
    fn duplicate_step_ids_flagged() {
        let body = wizard_body(json!({
            "name": "W",
            "steps": [
                {"id": "s1", "title": "A", "fields": [{"id": "f", "type": "text", "label": "F"}]},
                {"id": "s1", "title": "B", "fields": [{"id": "g", "type": "text", "label": "G"}]}
            ]
        }));
        assert!(body
            .structural_violations()
            .iter()
            .any(|v| v.message.contains("duplicate step id 's1'")));
    }

    #[test]
    fn page_ref_xor_fields_flagged() {
        let both = wizard_body(json!({
            "name": "W",
            "steps": [{"id": "s1", "title": "T", "pageRef": "p@v1",
                       "fields": [{"id": "f", "type": "text", "label": "F"}]}]
        }));
        assert!(both
            .structural_violations()
            .iter()
            .any(|v| v.message.contains("not both")));

        let neither = wizard_body(json!({
            "name": "W",
            "steps": [{"id": "s1", "title": "T"}]
        }));
        assert!(neither
            .structural_violations()
            .iter()
            .any(|v| v.message.contains("must declare")));
    }

    #[test]
    fn malformed_page_ref_flagged() {
        let body = wizard_body(json!({
            "name": "W",
            "steps": [{"id": "s1", "title": "T", "pageRef": "page.travel.start"}]
        }));
        assert!(body
            .structural_violations()
            .iter()
            .any(|v| v.instance_path == "/steps/0/pageRef"));
    }

    #[test]
    fn hook_overflow_flagged() {
        let hooks: Vec<_> = (0..=crate::hook::MAX_HOOKS_PER_TRIGGER)
            .map(|i| json!({"id": format!("h{i}"), "url": "https://hooks/h"}))
            .collect();
        let body = wizard_body(json!({
            "name": "W",
            "steps": [{"id": "s1", "title": "T",
                       "fields": [{"id": "f", "type": "text", "label": "F"}],
                       "onEnter": hooks}]
        }));
        assert!(body
            .structural_violations()
            .iter()
            .any(|v| v.instance_path == "/steps/0/onEnter"));
    }

    #[test]
    fn select_without_options_flagged() {
        let body = wizard_body(json!({
            "name": "W",
            "steps": [{"id": "s1", "title": "T", "fields": [
                {"id": "plan", "type": "select", "label": "Plan"}
            ]}]
        }));
        assert!(body
            .structural_violations()
            .iter()
            .any(|v| v.message.contains("select fields must have 'options'")));
    }

    // -- page refs --

    #[test]
    fn pinned_page_refs_deduplicated_in_order() {
        let body = wizard_body(json!({
            "name": "W",
            "steps": [
                {"id": "s1", "title": "A", "pageRef": "page.a@v2"},
                {"id": "s2", "title": "B", "pageRef": "page.b@v1"},
                {"id": "s3", "title": "C", "pageRef": "page.a@v2"}
            ]
        }));
        let refs = body.pinned_page_refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].to_string(), "page.a@v2");
        assert_eq!(refs[1].to_string(), "page.b@v1");
    }

    #[test]
    fn page_body_parses() {
        let page = PageBody::from_value(&json!({
            "name": "Select plan",
            "fields": [{"id": "plan", "type": "radio", "label": "Plan",
                        "options": [{"value": "basic", "label": "Basic"}]}]
        }))
        .unwrap();
        assert_eq!(page.fields.len(), 1);
        assert!(page.structural_violations().is_empty());
    }
}
