use crate::schema::SchemaViolation;

/// Domain-level error type shared across the workspace.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Draft body failed JSON-schema validation during publish.
    #[error("Schema validation failed ({} error(s))", .violations.len())]
    SchemaInvalid { violations: Vec<SchemaViolation> },

    /// One or more page references in a wizard draft do not resolve to a
    /// published page version. Carries every missing reference, not just
    /// the first.
    #[error("Referential integrity check failed ({} missing reference(s))", .missing.len())]
    ReferentialIntegrityFailed { missing: Vec<String> },

    #[error("Invalid state path '{0}'")]
    InvalidPath(String),

    #[error("Invalid page reference '{0}': expected '<page_key>@<version>'")]
    InvalidPageRef(String),

    #[error("Hook '{hook}' failed: {message}")]
    HookFailed { hook: String, message: String },

    #[error("Hook '{hook}' timed out after {timeout_secs}s")]
    HookTimeout { hook: String, timeout_secs: u64 },

    /// Backward navigation requested with an empty history stack.
    #[error("No navigation history to go back to")]
    NoHistory,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Flatten validation detail into a list of human-readable strings.
    ///
    /// Used by the API layer to build `{message, errors: [...]}` bodies for
    /// publish failures.
    pub fn detail_messages(&self) -> Vec<String> {
        match self {
            Self::SchemaInvalid { violations } => violations
                .iter()
                .map(|v| format!("Schema validation error at '{}': {}", v.instance_path, v.message))
                .collect(),
            Self::ReferentialIntegrityFailed { missing } => missing
                .iter()
                .map(|m| format!("Page reference '{m}' not found or not published"))
                .collect(),
            _ => Vec::new(),
        }
    }
}
