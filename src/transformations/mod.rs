//! Derived-row transformation system.
//!
//! Rules are data, not a type hierarchy: each is a record of a name, the
//! symbolic code groups it applies to, a match predicate and an extractor.
//! The engine runs the registered rules over each exported batch and upserts
//! the derived rows alongside the raw state events.

pub mod engine;
pub mod error;
pub mod registry;
pub mod rules;

pub use engine::TransformerEngine;
pub use error::TransformError;
pub use registry::{Transformer, TransformerRegistry};
