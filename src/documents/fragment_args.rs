//! Fragment arguments declared with `@arguments`.
//!
//! ```graphql
//! fragment UserList on Query @arguments(limit: {type: "Int!", default: 10}) { ... }
//! ```
//!
//! Every argument is an object literal with a `type` string and an optional
//! `default`. The loader turns each one into a `document_variables` row on
//! the fragment.

use async_graphql_value::Value;

use crate::graphql::type_modifiers;

/// One parsed `@arguments` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentArgument {
    pub name: String,
    pub base_type: String,
    pub modifiers: String,
    pub default: Option<Value>,
}

/// Why an `@arguments` entry was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentArgumentError {
    #[error("argument {0} of @arguments must be an object with a type field")]
    NotAnObject(String),
    #[error("argument {0} of @arguments must declare its type as a string")]
    MissingType(String),
    #[error("argument {name} of @arguments has an invalid type {ty}")]
    InvalidType { name: String, ty: String },
    #[error("default value of fragment argument {name} does not match its type {ty}")]
    DefaultMismatch { name: String, ty: String },
}

impl FragmentArgumentError {
    /// Mismatched defaults are validation problems; malformed entries are syntax errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, FragmentArgumentError::DefaultMismatch { .. })
    }
}

/// Parse the shape of one `name: {type: "...", default: ...}` entry.
pub fn parse_fragment_argument(name: &str, value: &Value) -> Result<FragmentArgument, FragmentArgumentError> {
    let Value::Object(fields) = value else {
        return Err(FragmentArgumentError::NotAnObject(name.to_string()));
    };
    let ty = match fields.get("type") {
        Some(Value::String(ty)) => ty,
        _ => return Err(FragmentArgumentError::MissingType(name.to_string())),
    };
    let (base_type, modifiers) = type_modifiers::parse(ty).ok_or_else(|| FragmentArgumentError::InvalidType {
        name: name.to_string(),
        ty: ty.clone(),
    })?;

    Ok(FragmentArgument {
        name: name.to_string(),
        base_type,
        modifiers,
        default: fields.get("default").cloned(),
    })
}

impl FragmentArgument {
    /// The declared default, if any, fits the declared type.
    pub fn check_default(&self) -> Result<(), FragmentArgumentError> {
        match &self.default {
            Some(default) if !value_matches_type(default, &self.base_type, &self.modifiers) => {
                Err(FragmentArgumentError::DefaultMismatch {
                    name: self.name.clone(),
                    ty: type_modifiers::unparse(&self.base_type, &self.modifiers),
                })
            }
            _ => Ok(()),
        }
    }
}

/// The literal `value` can be used where `base` wrapped by `modifiers` is expected.
///
/// Built-in scalars are checked by literal kind; any other base type accepts
/// every non-null literal since the schema is needed to say more. Variables
/// always match.
pub fn value_matches_type(value: &Value, base: &str, modifiers: &str) -> bool {
    match value {
        Value::Variable(_) => true,
        Value::Null => !type_modifiers::is_non_null(modifiers),
        Value::List(items) => match type_modifiers::list_item(modifiers) {
            Some(item) => items.iter().all(|v| value_matches_type(v, base, item)),
            None => false,
        },
        // a single value coerces into a one-element list
        other => match type_modifiers::list_item(modifiers) {
            Some(item) => value_matches_type(other, base, item),
            None => scalar_matches(other, base),
        },
    }
}

fn scalar_matches(value: &Value, base: &str) -> bool {
    match base {
        "Int" => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        "Float" => matches!(value, Value::Number(_)),
        "String" => matches!(value, Value::String(_)),
        "Boolean" => matches!(value, Value::Boolean(_)),
        "ID" => matches!(value, Value::String(_)) || matches!(value, Value::Number(n) if !n.is_f64()),
        _ => !matches!(value, Value::List(_)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_query;

    /// Parse `value` by placing it in an argument position.
    fn value(text: &str) -> Value {
        let doc = parse_query(format!("{{ f(x: {text}) }}")).unwrap();
        let async_graphql_parser::types::DocumentOperations::Single(op) = doc.operations else {
            panic!("expected anonymous operation");
        };
        let async_graphql_parser::types::Selection::Field(field) = &op.node.selection_set.node.items[0].node else {
            panic!("expected field");
        };
        field.node.arguments[0].1.node.clone()
    }

    #[test]
    fn test_scalars() {
        assert!(value_matches_type(&value("1"), "Int", "!"));
        assert!(!value_matches_type(&value("1.5"), "Int", ""));
        assert!(value_matches_type(&value("1"), "Float", ""));
        assert!(value_matches_type(&value("\"a\""), "ID", ""));
        assert!(value_matches_type(&value("4"), "ID", ""));
        assert!(!value_matches_type(&value("true"), "String", ""));
        assert!(value_matches_type(&value("ASC"), "Order", ""));
    }

    #[test]
    fn test_null_and_lists() {
        assert!(value_matches_type(&value("null"), "Int", ""));
        assert!(!value_matches_type(&value("null"), "Int", "!"));
        assert!(value_matches_type(&value("[1, 2]"), "Int", "!]"));
        assert!(!value_matches_type(&value("[1, null]"), "Int", "!]"));
        assert!(value_matches_type(&value("3"), "Int", "]"));
        assert!(!value_matches_type(&value("[1]"), "Int", ""));
        assert!(value_matches_type(&value("$v"), "Int", "!"));
    }

    #[test]
    fn test_parse_argument() {
        let arg = parse_fragment_argument("limit", &value("{type: \"Int!\", default: 10}")).unwrap();
        assert_eq!(arg.base_type, "Int");
        assert_eq!(arg.modifiers, "!");
        assert!(arg.default.is_some());

        let arg = parse_fragment_argument("ids", &value("{type: \"[ID!]\"}")).unwrap();
        assert_eq!((arg.base_type.as_str(), arg.modifiers.as_str(), arg.default), ("ID", "!]", None));
    }

    #[test]
    fn test_parse_argument_errors() {
        assert_eq!(
            parse_fragment_argument("a", &value("3")),
            Err(FragmentArgumentError::NotAnObject("a".into()))
        );
        assert_eq!(
            parse_fragment_argument("a", &value("{default: 3}")),
            Err(FragmentArgumentError::MissingType("a".into()))
        );
        let arg = parse_fragment_argument("a", &value("{type: \"Int!\", default: \"x\"}")).unwrap();
        let err = arg.check_default().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "default value of fragment argument a does not match its type Int!");
        assert!(!FragmentArgumentError::MissingType("a".into()).is_validation());
    }
}
