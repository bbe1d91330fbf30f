//! In-memory trees handed to printers and the CLI's JSON output.

use std::fmt;

use serde::Serialize;

/// An operation or fragment with its fragments inlined below their spreads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedDocument {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub type_condition: Option<String>,
    pub variables: Vec<CollectedVariable>,
    pub directives: Vec<CollectedDirective>,
    pub selections: Vec<CollectedSelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedVariable {
    pub name: String,
    /// Type as written, e.g. `[ID!]!`.
    #[serde(rename = "type")]
    pub type_name: String,
    pub default: Option<CollectedValue>,
    pub directives: Vec<CollectedDirective>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedSelection {
    pub kind: String,
    pub field_name: String,
    pub alias: Option<String>,
    /// `Parent.field` for fields, the enclosing type for spreads and inline fragments.
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub path_index: i64,
    pub arguments: Vec<CollectedArgument>,
    pub directives: Vec<CollectedDirective>,
    pub children: Vec<CollectedSelection>,
}

impl CollectedSelection {
    /// Response key: the alias when present.
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedArgument {
    pub name: String,
    pub value: CollectedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedDirective {
    pub name: String,
    pub arguments: Vec<CollectedArgument>,
}

/// An argument value rebuilt from `argument_values` rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectedValue {
    Variable(String),
    /// Int, Float, String, Block, Boolean or Enum; `raw` is unquoted.
    Literal { kind: String, raw: String },
    Null,
    List(Vec<CollectedValue>),
    Object(Vec<CollectedArgument>),
}

impl fmt::Display for CollectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectedValue::Variable(name) => write!(f, "${name}"),
            CollectedValue::Literal { kind, raw } => match kind.as_str() {
                "String" => write!(f, "{}", serde_json::to_string(raw).map_err(|_| fmt::Error)?),
                "Block" => write!(f, "\"\"\"{raw}\"\"\""),
                _ => f.write_str(raw),
            },
            CollectedValue::Null => f.write_str("null"),
            CollectedValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            CollectedValue::Object(fields) => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.value)?;
                }
                f.write_str("}")
            }
        }
    }
}
