//! Step routing strategies.
//!
//! Routing is a pluggable seam: `advance()` asks a [`RoutingStrategy`] for
//! the step after the current one and never encodes an ordering itself.
//! [`LinearRouting`] (declaration order) is the shipped, conformant
//! baseline; a conditional strategy evaluating per-step `next` rules can be
//! slotted in without touching the session engine.

use crate::definition::WizardBody;
use crate::error::CoreError;

/// Where navigation goes after the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAdvance {
    /// Move to this step id.
    Next(String),
    /// The current step was the last one; the wizard is finished.
    Complete,
}

/// Computes the successor of a step within a wizard.
pub trait RoutingStrategy: Send + Sync {
    fn next_step(&self, wizard: &WizardBody, current: &str) -> Result<StepAdvance, CoreError>;
}

/// Declaration-order routing: the next step is simply the next entry in
/// `steps`; advancing past the last step completes the wizard.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRouting;

impl RoutingStrategy for LinearRouting {
    fn next_step(&self, wizard: &WizardBody, current: &str) -> Result<StepAdvance, CoreError> {
        let index = wizard
            .steps
            .iter()
            .position(|s| s.id == current)
            .ok_or_else(|| {
                CoreError::Validation(format!("Step '{current}' is not part of this wizard"))
            })?;

        match wizard.steps.get(index + 1) {
            Some(step) => Ok(StepAdvance::Next(step.id.clone())),
            None => Ok(StepAdvance::Complete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn three_step_wizard() -> WizardBody {
        WizardBody::from_value(&json!({
            "name": "W",
            "steps": [
                {"id": "s1", "title": "One", "fields": [{"id": "a", "type": "text", "label": "A"}]},
                {"id": "s2", "title": "Two", "fields": [{"id": "b", "type": "text", "label": "B"}]},
                {"id": "s3", "title": "Three", "fields": [{"id": "c", "type": "text", "label": "C"}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn advances_in_declaration_order() {
        let wizard = three_step_wizard();
        assert_eq!(
            LinearRouting.next_step(&wizard, "s1").unwrap(),
            StepAdvance::Next("s2".into())
        );
        assert_eq!(
            LinearRouting.next_step(&wizard, "s2").unwrap(),
            StepAdvance::Next("s3".into())
        );
    }

    #[test]
    fn last_step_completes() {
        let wizard = three_step_wizard();
        assert_eq!(
            LinearRouting.next_step(&wizard, "s3").unwrap(),
            StepAdvance::Complete
        );
    }

    #[test]
    fn unknown_step_is_an_error() {
        let wizard = three_step_wizard();
        assert!(LinearRouting.next_step(&wizard, "nope").is_err());
    }
}
