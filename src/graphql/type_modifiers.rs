//! Compact encoding of list / non-null wrappers.
//!
//! A GraphQL type reference is stored as a base type name plus a modifier
//! string. The string is built innermost wrapper first, so reading it from
//! right to left visits the wrappers from the outside in:
//!
//! | GraphQL     | modifiers |
//! |-------------|-----------|
//! | `T`         | ``        |
//! | `T!`        | `!`       |
//! | `[T]`       | `]`       |
//! | `[T]!`      | `]!`      |
//! | `[T!]`      | `!]`      |
//! | `[T!]!`     | `!]!`     |
//! | `[[T]]`     | `]]`      |

use async_graphql_parser::types::{BaseType, Type};

/// Split a parsed type into `(base name, modifiers)`.
pub fn encode(ty: &Type) -> (String, String) {
    let (name, mut modifiers) = match &ty.base {
        BaseType::Named(name) => (name.to_string(), String::new()),
        BaseType::List(inner) => {
            let (name, mut modifiers) = encode(inner);
            modifiers.push(']');
            (name, modifiers)
        }
    };
    if !ty.nullable {
        modifiers.push('!');
    }
    (name, modifiers)
}

/// Parse a GraphQL type string such as `[Int!]!`.
pub fn parse(text: &str) -> Option<(String, String)> {
    Type::new(text.trim()).map(|ty| encode(&ty))
}

/// Rebuild the GraphQL spelling of `base` wrapped by `modifiers`.
pub fn unparse(base: &str, modifiers: &str) -> String {
    if let Some(rest) = modifiers.strip_suffix('!') {
        format!("{}!", unparse(base, rest))
    } else if let Some(rest) = modifiers.strip_suffix(']') {
        format!("[{}]", unparse(base, rest))
    } else {
        base.to_string()
    }
}

/// The outermost level is non-null.
pub fn is_non_null(modifiers: &str) -> bool {
    modifiers.ends_with('!')
}

/// The type is a list at some level.
pub fn is_list(modifiers: &str) -> bool {
    modifiers.contains(']')
}

/// Strip the outermost non-null marker, if any.
pub fn nullable(modifiers: &str) -> &str {
    modifiers.strip_suffix('!').unwrap_or(modifiers)
}

/// Modifiers of a list's item type, or `None` when the outer level is not a list.
pub fn list_item(modifiers: &str) -> Option<&str> {
    nullable(modifiers).strip_suffix(']')
}

/// A value typed `provided` may flow into a position typed `expected`.
///
/// Equal modifiers match; the provided type may also be one level more
/// strict at the outermost position (`Int!` satisfies `Int`).
pub fn satisfies(provided: &str, expected: &str) -> bool {
    provided == expected || provided.strip_suffix('!') == Some(expected)
}
