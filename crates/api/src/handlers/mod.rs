//! HTTP handlers, grouped by resource.

pub mod definitions;
pub mod sessions;
