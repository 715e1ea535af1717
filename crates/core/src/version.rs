//! Definition kinds and version tags.
//!
//! A definition is identified by `(kind, key, version)`. The version is
//! either the mutable draft marker or an immutable published number,
//! rendered on the wire as `draft` / `v1`, `v2`, ...

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// DefinitionKind
// ---------------------------------------------------------------------------

/// The two kinds of versioned definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Wizard,
    Page,
}

impl DefinitionKind {
    /// Wire/database string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wizard => "wizard",
            Self::Page => "page",
        }
    }

    /// Entity name used in `NotFound` errors.
    pub fn entity(&self) -> &'static str {
        match self {
            Self::Wizard => "Wizard",
            Self::Page => "Page",
        }
    }

    /// Parse from a wire/database string.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "wizard" => Ok(Self::Wizard),
            "page" => Ok(Self::Page),
            _ => Err(CoreError::Validation(format!(
                "Invalid definition kind '{s}'. Must be one of: wizard, page"
            ))),
        }
    }

    /// Schema identifier a freshly created draft of this kind defaults to.
    pub fn default_schema_version(&self) -> &'static str {
        match self {
            Self::Wizard => "wizard.v1",
            Self::Page => "page.v1",
        }
    }
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// VersionTag
// ---------------------------------------------------------------------------

/// A definition version: the single mutable draft, or a published number.
///
/// Published tags order by number; the draft sorts before `v1` so that
/// "newest first" listings place published versions by recency and the
/// caller decides where the draft goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VersionTag {
    Draft,
    Published(u32),
}

impl VersionTag {
    /// Parse a wire-format tag (`draft`, `v1`, `v2`, ...).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s == "draft" {
            return Ok(Self::Draft);
        }
        let number = s
            .strip_prefix('v')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n >= 1);
        match number {
            Some(n) => Ok(Self::Published(n)),
            None => Err(CoreError::Validation(format!(
                "Invalid version tag '{s}'. Expected 'draft' or 'v<n>' with n >= 1"
            ))),
        }
    }

    /// The published version number, if any.
    pub fn number(&self) -> Option<u32> {
        match self {
            Self::Draft => None,
            Self::Published(n) => Some(*n),
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl std::fmt::Display for VersionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => f.write_str("draft"),
            Self::Published(n) => write!(f, "v{n}"),
        }
    }
}

impl Serialize for VersionTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
