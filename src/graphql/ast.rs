//! Small adapters between the parser's AST and IR rows.

use async_graphql_parser::types::DirectiveLocation;
use async_graphql_parser::Pos;
use async_graphql_value::{ConstValue, Value};

use crate::store::statements::SourcePos;

/// Byte offsets of line starts in a document's text.
///
/// Parser positions are 1-based `(line, column)` with columns counted in
/// characters; the index turns them back into byte offsets so the loader can
/// look at the literal source (block strings).
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, starts }
    }

    /// Byte offset of `pos`, if it falls inside the text.
    pub fn offset(&self, pos: Pos) -> Option<usize> {
        let start = *self.starts.get(pos.line.checked_sub(1)?)?;
        let line = &self.text[start..];
        let column = pos.column.checked_sub(1)?;
        match line.char_indices().nth(column) {
            Some((i, _)) => Some(start + i),
            None if column == line.chars().count() => Some(self.text.len()),
            None => None,
        }
    }

    /// The whole document text.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// The source text at `pos` starts with `prefix`.
    pub fn starts_with_at(&self, pos: Pos, prefix: &str) -> bool {
        self.offset(pos)
            .map(|at| self.text[at..].starts_with(prefix))
            .unwrap_or(false)
    }
}

/// One entry of a list or object literal as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralEntry<'a> {
    /// Field name for object entries, `None` for list items
    pub key: Option<&'a str>,
    /// Byte offset of the entry's value
    pub offset: usize,
}

/// Entries of the `{...}` or `[...]` literal starting at byte `start`.
///
/// The parser folds repeated object keys into one map entry, so anything that
/// needs every occurrence reads them back from the text here. Returns `None`
/// when `start` is not the opening bracket of a well-formed literal.
pub fn literal_entries(text: &str, start: usize) -> Option<Vec<LiteralEntry<'_>>> {
    let bytes = text.as_bytes();
    let close = match bytes.get(start)? {
        b'{' => b'}',
        b'[' => b']',
        _ => return None,
    };
    let mut entries = Vec::new();
    let mut at = skip_ignored(bytes, start + 1);
    while *bytes.get(at)? != close {
        let key = if close == b'}' {
            let end = name_end(bytes, at);
            if end == at {
                return None;
            }
            let key = &text[at..end];
            at = skip_ignored(bytes, end);
            if bytes.get(at) != Some(&b':') {
                return None;
            }
            at = skip_ignored(bytes, at + 1);
            Some(key)
        } else {
            None
        };
        entries.push(LiteralEntry { key, offset: at });
        at = skip_ignored(bytes, skip_value(bytes, at)?);
    }
    Some(entries)
}

/// Skip whitespace, commas, and comments.
fn skip_ignored(bytes: &[u8], mut at: usize) -> usize {
    while let Some(&b) = bytes.get(at) {
        match b {
            b' ' | b'\t' | b'\r' | b'\n' | b',' => at += 1,
            b'#' => {
                while bytes.get(at).is_some_and(|&b| b != b'\n') {
                    at += 1;
                }
            }
            _ => break,
        }
    }
    at
}

fn name_end(bytes: &[u8], mut at: usize) -> usize {
    while bytes.get(at).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') {
        at += 1;
    }
    at
}

/// Byte offset just past the value starting at `at`.
fn skip_value(bytes: &[u8], at: usize) -> Option<usize> {
    match *bytes.get(at)? {
        b'"' if bytes[at..].starts_with(b"\"\"\"") => {
            let mut i = at + 3;
            loop {
                let rest = bytes.get(i..)?;
                if rest.is_empty() {
                    return None;
                }
                if rest.starts_with(b"\\\"\"\"") {
                    i += 4;
                } else if rest.starts_with(b"\"\"\"") {
                    return Some(i + 3);
                } else {
                    i += 1;
                }
            }
        }
        b'"' => {
            let mut i = at + 1;
            loop {
                match *bytes.get(i)? {
                    b'\\' => i += 2,
                    b'"' => return Some(i + 1),
                    b'\n' => return None,
                    _ => i += 1,
                }
            }
        }
        open @ (b'{' | b'[') => {
            let close = if open == b'{' { b'}' } else { b']' };
            let mut i = skip_ignored(bytes, at + 1);
            while *bytes.get(i)? != close {
                if open == b'{' {
                    i = skip_ignored(bytes, name_end(bytes, i));
                    if bytes.get(i) != Some(&b':') {
                        return None;
                    }
                    i = skip_ignored(bytes, i + 1);
                }
                i = skip_ignored(bytes, skip_value(bytes, i)?);
            }
            Some(i + 1)
        }
        _ => {
            let mut i = at;
            if bytes[i] == b'$' {
                i += 1;
            }
            while bytes
                .get(i)
                .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'+' | b'.'))
            {
                i += 1;
            }
            (i > at).then_some(i)
        }
    }
}

/// Translate a position inside a raw document to an absolute file position.
///
/// `offset_line` / `offset_column` are the 0-based coordinates of the raw
/// document's first character inside its file; the column offset only applies
/// to the first line.
pub fn absolute(pos: Pos, offset_line: i64, offset_column: i64) -> SourcePos {
    let line = offset_line + pos.line as i64;
    let col = if pos.line == 1 {
        pos.column as i64 + offset_column
    } else {
        pos.column as i64
    };
    SourcePos::new(line, col)
}

/// IR spelling of a directive location.
pub fn directive_location_name(location: &DirectiveLocation) -> &'static str {
    match location {
        DirectiveLocation::Query => "QUERY",
        DirectiveLocation::Mutation => "MUTATION",
        DirectiveLocation::Subscription => "SUBSCRIPTION",
        DirectiveLocation::Field => "FIELD",
        DirectiveLocation::FragmentDefinition => "FRAGMENT_DEFINITION",
        DirectiveLocation::FragmentSpread => "FRAGMENT_SPREAD",
        DirectiveLocation::InlineFragment => "INLINE_FRAGMENT",
        DirectiveLocation::VariableDefinition => "VARIABLE_DEFINITION",
        DirectiveLocation::Schema => "SCHEMA",
        DirectiveLocation::Scalar => "SCALAR",
        DirectiveLocation::Object => "OBJECT",
        DirectiveLocation::FieldDefinition => "FIELD_DEFINITION",
        DirectiveLocation::ArgumentDefinition => "ARGUMENT_DEFINITION",
        DirectiveLocation::Interface => "INTERFACE",
        DirectiveLocation::Union => "UNION",
        DirectiveLocation::Enum => "ENUM",
        DirectiveLocation::EnumValue => "ENUM_VALUE",
        DirectiveLocation::InputObject => "INPUT_OBJECT",
        DirectiveLocation::InputFieldDefinition => "INPUT_FIELD_DEFINITION",
    }
}

/// IR kind of a document value.
pub fn value_kind(value: &Value, block: bool) -> &'static str {
    match value {
        Value::Variable(_) => "Variable",
        Value::Null => "Null",
        Value::Number(n) if n.is_f64() => "Float",
        Value::Number(_) => "Int",
        Value::String(_) if block => "Block",
        Value::String(_) | Value::Binary(_) => "String",
        Value::Boolean(_) => "Boolean",
        Value::Enum(_) => "Enum",
        Value::List(_) => "List",
        Value::Object(_) => "Object",
    }
}

/// Text stored in `argument_values.raw`.
///
/// Scalars are stored unquoted; variables without their `$`; lists and
/// objects in GraphQL syntax.
pub fn value_raw(value: &Value) -> String {
    match value {
        Value::Variable(name) => name.to_string(),
        Value::String(s) => s.clone(),
        Value::Enum(name) => name.to_string(),
        Value::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => other.to_string(),
    }
}

/// The built-in scalar a literal naturally belongs to.
///
/// Used as `expected_type` for values that have no schema-declared position.
pub fn natural_scalar(value: &Value) -> &'static str {
    match value {
        Value::Number(n) if n.is_f64() => "Float",
        Value::Number(_) => "Int",
        Value::Boolean(_) => "Boolean",
        _ => "String",
    }
}

/// Render a schema default value for `*.default_value` columns.
pub fn const_value_text(value: &ConstValue) -> String {
    value.to_string()
}
