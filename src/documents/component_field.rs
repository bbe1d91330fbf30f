//! Inline component fields.
//!
//! A component declares a field on a schema type with
//!
//! ```text
//! avatar: GraphQL<`{ ... on User @componentField(field: "Avatar") { url } }`>
//! ```
//!
//! The literal is an anonymous operation whose only selection is an inline
//! fragment carrying `@componentField`. The loader replaces it with a named
//! fragment on the inline fragment's type condition.

use async_graphql_parser::types::{Directive, InlineFragment, OperationDefinition, Selection};
use async_graphql_parser::{Pos, Positioned};
use async_graphql_value::Value;

use crate::schema::internal::{component_field_fragment_name, names};

/// The fragment an inline component field stands for.
#[derive(Debug)]
pub struct ComponentFieldFragment<'a> {
    pub name: String,
    pub type_condition: String,
    pub field: String,
    pub fragment: &'a Positioned<InlineFragment>,
    /// Position of the anonymous operation
    pub pos: Pos,
}

/// Locate the `@componentField` inline fragment inside `operation`.
pub fn component_field_fragment(
    operation: &Positioned<OperationDefinition>,
) -> Result<ComponentFieldFragment<'_>, String> {
    let items = &operation.node.selection_set.node.items;
    let [only] = items.as_slice() else {
        return Err(format!(
            "inline component fields must contain exactly one inline fragment, found {} selections",
            items.len()
        ));
    };
    let Selection::InlineFragment(fragment) = &only.node else {
        return Err("inline component fields must contain an inline fragment".to_string());
    };
    let Some(type_condition) = &fragment.node.type_condition else {
        return Err("inline component fields need a type condition".to_string());
    };
    let Some(directive) = find_directive(&fragment.node.directives, names::COMPONENT_FIELD) else {
        return Err("inline component fields must carry @componentField".to_string());
    };
    let Some(field) = string_argument(&directive.node, "field") else {
        return Err("@componentField requires a string field argument".to_string());
    };

    let type_condition = type_condition.node.on.node.to_string();
    Ok(ComponentFieldFragment {
        name: component_field_fragment_name(&type_condition, &field),
        type_condition,
        field,
        fragment,
        pos: operation.pos,
    })
}

pub fn find_directive<'a>(directives: &'a [Positioned<Directive>], name: &str) -> Option<&'a Positioned<Directive>> {
    directives.iter().find(|d| d.node.name.node.as_str() == name)
}

fn string_argument(directive: &Directive, name: &str) -> Option<String> {
    match directive.get_argument(name).map(|v| &v.node) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// `@componentField` already names its prop.
pub fn has_prop_argument(directive: &Directive) -> bool {
    directive.get_argument("prop").is_some()
}
