//! Domain layer types and invariants.

pub mod descriptor;
pub mod error;
pub mod item;
pub mod query;
