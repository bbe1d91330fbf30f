//! GraphQL helpers shared by the schema and document loaders.

pub mod ast;
pub mod type_modifiers;

pub use ast::{
    absolute, directive_location_name, literal_entries, natural_scalar, value_kind, value_raw, LineIndex, LiteralEntry,
};
