//! Boolean conditions over session state.
//!
//! Conditions gate step visibility and (future) routing. They are advisory:
//! evaluation never fails. Malformed paths, type mismatches, unknown
//! operators, and unknown logic values all resolve to a boolean (almost
//! always `false`) instead of raising, so a bad condition silently excludes
//! rather than crashing a live session.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::paths;

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Comparison operator of a [`SimpleCondition`].
///
/// Unrecognized wire strings deserialize to [`ConditionOperator::Unknown`]
/// so that definitions authored against a newer operator set still load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Empty,
    NotEmpty,
    Matches,
    Unknown(String),
}

impl ConditionOperator {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "contains" => Self::Contains,
            "notContains" => Self::NotContains,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "in" => Self::In,
            "notIn" => Self::NotIn,
            "empty" => Self::Empty,
            "notEmpty" => Self::NotEmpty,
            "matches" => Self::Matches,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Empty => "empty",
            Self::NotEmpty => "notEmpty",
            Self::Matches => "matches",
            Self::Unknown(s) => s,
        }
    }
}

impl Serialize for ConditionOperator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConditionOperator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&s))
    }
}

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

/// Reduction mode of a [`CompoundCondition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompoundLogic {
    And,
    Or,
    Unknown(String),
}

impl CompoundLogic {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "and" => Self::And,
            "or" => Self::Or,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Unknown(s) => s,
        }
    }
}

impl Serialize for CompoundLogic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CompoundLogic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&s))
    }
}

// ---------------------------------------------------------------------------
// Condition tree
// ---------------------------------------------------------------------------

/// A single field comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleCondition {
    /// State path of the left operand (bare dot-notation).
    pub field: String,
    pub operator: ConditionOperator,
    /// Right operand; optional for `empty`/`notEmpty`.
    #[serde(default)]
    pub value: Value,
}

/// An `and`/`or` over child conditions, evaluated in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundCondition {
    pub logic: CompoundLogic,
    pub conditions: Vec<Condition>,
}

/// A condition tree node. The wire format is untagged: a `logic` key makes
/// a node compound, otherwise it is a simple comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Compound(CompoundCondition),
    Simple(SimpleCondition),
}

/// Evaluate a condition against a state tree.
pub fn evaluate(condition: &Condition, state: &Value) -> bool {
    match condition {
        Condition::Simple(simple) => evaluate_simple(simple, state),
        Condition::Compound(compound) => evaluate_compound(compound, state),
    }
}

fn evaluate_compound(compound: &CompoundCondition, state: &Value) -> bool {
    // Children are pure, so full evaluation (no short-circuit) and
    // short-circuit are observationally identical; iterator adapters
    // short-circuit here.
    match compound.logic {
        CompoundLogic::And => compound.conditions.iter().all(|c| evaluate(c, state)),
        CompoundLogic::Or => compound.conditions.iter().any(|c| evaluate(c, state)),
        CompoundLogic::Unknown(_) => false,
    }
}

fn evaluate_simple(condition: &SimpleCondition, state: &Value) -> bool {
    // An unparseable field path excludes rather than errors.
    let field_value = match paths::get(state, &condition.field) {
        Ok(v) => v,
        Err(_) => None,
    };
    let expected = &condition.value;

    match &condition.operator {
        ConditionOperator::Eq => field_value.is_some_and(|fv| fv == expected),
        ConditionOperator::Neq => field_value.map_or(true, |fv| fv != expected),

        ConditionOperator::Gt => compare_numeric(field_value, expected, |a, b| a > b),
        ConditionOperator::Gte => compare_numeric(field_value, expected, |a, b| a >= b),
        ConditionOperator::Lt => compare_numeric(field_value, expected, |a, b| a < b),
        ConditionOperator::Lte => compare_numeric(field_value, expected, |a, b| a <= b),

        ConditionOperator::Contains => {
            compare_strings(field_value, expected, |fv, s| fv.contains(s))
        }
        // Absence of a substring in a non-comparable value is vacuously true.
        ConditionOperator::NotContains => {
            !compare_strings(field_value, expected, |fv, s| fv.contains(s))
        }
        ConditionOperator::StartsWith => {
            compare_strings(field_value, expected, |fv, s| fv.starts_with(s))
        }
        ConditionOperator::EndsWith => {
            compare_strings(field_value, expected, |fv, s| fv.ends_with(s))
        }

        ConditionOperator::In => match expected.as_array() {
            Some(items) => field_value.is_some_and(|fv| items.contains(fv)),
            None => false,
        },
        ConditionOperator::NotIn => match expected.as_array() {
            Some(items) => !field_value.is_some_and(|fv| items.contains(fv)),
            // A membership test against a non-sequence cannot hold.
            None => true,
        },

        ConditionOperator::Empty => is_empty(field_value),
        ConditionOperator::NotEmpty => !is_empty(field_value),

        ConditionOperator::Matches => {
            let (Some(fv), Some(pattern)) =
                (field_value.and_then(Value::as_str), expected.as_str())
            else {
                return false;
            };
            match Regex::new(pattern) {
                Ok(re) => re.is_match(fv),
                // Invalid patterns evaluate to false, never raise.
                Err(_) => false,
            }
        }

        ConditionOperator::Unknown(_) => false,
    }
}

fn compare_numeric(
    field_value: Option<&Value>,
    expected: &Value,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    match (field_value.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn compare_strings(
    field_value: Option<&Value>,
    expected: &Value,
    cmp: impl Fn(&str, &str) -> bool,
) -> bool {
    match (field_value.and_then(Value::as_str), expected.as_str()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn is_empty(field_value: Option<&Value>) -> bool {
    match field_value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}
