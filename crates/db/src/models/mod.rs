//! Row models matching the database schema.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the table layout, plus conversions into the core's store types.

pub mod definition;
pub mod session;
