//! Normalise one parsed raw document into IR rows.
//!
//! The writer walks the AST straight into the store through a
//! [`LoaderStatements`] bundle; nothing is assembled in memory first. Schema
//! lookups go through the shared [`TypeCache`].

use async_graphql_parser::types::{
    Directive, DocumentOperations, ExecutableDocument, FragmentDefinition, OperationDefinition, OperationType,
    Selection, SelectionSet, VariableDefinition,
};
use async_graphql_parser::{parse_query, Pos, Positioned};
use async_graphql_value::Value;

use super::component_field::{component_field_fragment, find_directive, has_prop_argument};
use super::fragment_args::parse_fragment_argument;
use super::type_cache::{field_id, TypeCache};
use crate::diagnostics::Diagnostic;
use crate::graphql::{
    absolute, literal_entries, natural_scalar, type_modifiers, value_kind, value_raw, LineIndex, LiteralEntry,
};
use crate::schema::internal::names;
use crate::store::statements::SourcePos;
use crate::store::LoaderStatements;

/// Operation appended to fragment-only documents so they parse.
const FRAGMENT_HOLDER: &str = "__gqlforge_fragments__";

/// A raw document waiting to be loaded.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: i64,
    pub filepath: String,
    pub content: String,
    pub offset_line: i64,
    pub offset_column: i64,
    /// Prop of an inline component field declaration
    pub component_prop: Option<String>,
}

impl RawDocument {
    pub fn is_inline_component_field(&self) -> bool {
        self.component_prop.is_some()
    }

    /// Absolute file position of `pos` inside this document.
    pub fn position(&self, pos: Pos) -> SourcePos {
        absolute(pos, self.offset_line, self.offset_column)
    }

    pub fn locate(&self, diagnostic: Diagnostic, pos: Pos) -> Diagnostic {
        let at = self.position(pos);
        diagnostic.at(&self.filepath, at.line.max(1) as usize, at.col.max(1) as usize)
    }

    /// Parse the content as an executable document.
    pub fn parse(&self) -> Result<ExecutableDocument, Diagnostic> {
        let parsed = match parse_query(&self.content) {
            Err(async_graphql_parser::Error::MissingOperation) => {
                parse_query(format!("{}\nquery {FRAGMENT_HOLDER} {{ __typename }}", self.content))
            }
            other => other,
        };
        parsed.map_err(|err| {
            let pos = err.positions().next().unwrap_or(Pos { line: 1, column: 1 });
            self.locate(Diagnostic::syntax(err.to_string()), pos)
        })
    }
}

/// Why a document could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The document is malformed; its rows are rolled back
    #[error("{0}")]
    Invalid(Box<Diagnostic>),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

/// Per-document context threaded through the walk.
struct Scope<'r> {
    raw: &'r RawDocument,
    index: LineIndex<'r>,
    document: i64,
}

impl Scope<'_> {
    fn at(&self, pos: Pos) -> SourcePos {
        self.raw.position(pos)
    }
}

enum Definition<'d> {
    Operation(Option<&'d str>, &'d Positioned<OperationDefinition>),
    Fragment(&'d str, &'d Positioned<FragmentDefinition>),
}

impl Definition<'_> {
    fn pos(&self) -> (usize, usize) {
        let pos = match self {
            Definition::Operation(_, op) => op.pos,
            Definition::Fragment(_, fragment) => fragment.pos,
        };
        (pos.line, pos.column)
    }
}

/// Writes parsed documents through one statement bundle.
pub struct DocumentWriter<'a, 'conn> {
    stmts: LoaderStatements<'conn>,
    cache: &'a TypeCache,
    /// Non-fatal problems found while loading
    warnings: Vec<Diagnostic>,
}

impl<'a, 'conn> DocumentWriter<'a, 'conn> {
    pub fn new(stmts: LoaderStatements<'conn>, cache: &'a TypeCache) -> Self {
        Self {
            stmts,
            cache,
            warnings: Vec::new(),
        }
    }

    pub fn take_warnings(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.warnings)
    }

    /// Insert every definition of `doc` in source order; returns the number of documents.
    pub fn load(&mut self, raw: &RawDocument, doc: &ExecutableDocument) -> Result<usize, LoadError> {
        let mut definitions = Vec::new();
        match &doc.operations {
            DocumentOperations::Single(op) => definitions.push(Definition::Operation(None, op)),
            DocumentOperations::Multiple(ops) => {
                for (name, op) in ops {
                    if name.as_str() != FRAGMENT_HOLDER {
                        definitions.push(Definition::Operation(Some(name.as_str()), op));
                    }
                }
            }
        }
        for (name, fragment) in &doc.fragments {
            definitions.push(Definition::Fragment(name.as_str(), fragment));
        }
        definitions.sort_by_key(Definition::pos);

        let count = definitions.len();
        for definition in definitions {
            match definition {
                Definition::Operation(None, op) if raw.is_inline_component_field() => {
                    self.load_component_field(raw, op)?
                }
                Definition::Operation(None, op) => {
                    return Err(LoadError::Invalid(Box::new(
                        raw.locate(Diagnostic::syntax("operations must have a name"), op.pos),
                    )));
                }
                Definition::Operation(Some(name), op) => self.load_operation(raw, name, op)?,
                Definition::Fragment(name, fragment) => self.load_fragment(raw, name, fragment)?,
            }
        }
        Ok(count)
    }

    fn load_operation(
        &mut self,
        raw: &RawDocument,
        name: &str,
        op: &Positioned<OperationDefinition>,
    ) -> Result<(), LoadError> {
        let kind = match op.node.ty {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        };
        let document = self
            .stmts
            .insert_document(name, kind, raw.id, None, raw.position(op.pos))?;
        let scope = Scope {
            raw,
            index: LineIndex::new(&raw.content),
            document,
        };

        for variable in &op.node.variable_definitions {
            self.insert_variable(&scope, variable)?;
        }
        self.insert_document_directives(&scope, &op.node.directives)?;
        let root = self.cache.root(kind);
        self.insert_selection_set(&scope, None, Some(&root), &op.node.selection_set)
    }

    fn load_fragment(
        &mut self,
        raw: &RawDocument,
        name: &str,
        fragment: &Positioned<FragmentDefinition>,
    ) -> Result<(), LoadError> {
        let type_condition = fragment.node.type_condition.node.on.node.as_str();
        let document = self.stmts.insert_document(
            name,
            "fragment",
            raw.id,
            Some(type_condition),
            raw.position(fragment.pos),
        )?;
        let scope = Scope {
            raw,
            index: LineIndex::new(&raw.content),
            document,
        };

        self.insert_document_directives(&scope, &fragment.node.directives)?;
        if let Some(arguments) = find_directive(&fragment.node.directives, names::ARGUMENTS) {
            self.insert_fragment_arguments(&scope, &arguments.node)?;
        }
        let parent = self.cache.has_type(type_condition).then_some(type_condition);
        self.insert_selection_set(&scope, None, parent, &fragment.node.selection_set)
    }

    /// Load an inline component field as the fragment it declares.
    fn load_component_field(&mut self, raw: &RawDocument, op: &Positioned<OperationDefinition>) -> Result<(), LoadError> {
        let found = component_field_fragment(op)
            .map_err(|message| LoadError::Invalid(Box::new(raw.locate(Diagnostic::syntax(message), op.pos))))?;
        let fragment = &found.fragment.node;
        let document = self.stmts.insert_document(
            &found.name,
            "fragment",
            raw.id,
            Some(&found.type_condition),
            raw.position(found.fragment.pos),
        )?;
        let scope = Scope {
            raw,
            index: LineIndex::new(&raw.content),
            document,
        };

        let applied = self.insert_document_directives(&scope, &fragment.directives)?;
        if let (Some(prop), Some(directive)) = (
            &raw.component_prop,
            find_directive(&fragment.directives, names::COMPONENT_FIELD),
        ) {
            if !has_prop_argument(&directive.node) {
                if let Some((_, parent)) = applied.iter().find(|(name, _)| name == names::COMPONENT_FIELD) {
                    let value = self.stmts.insert_argument_value(
                        "String",
                        prop,
                        "String",
                        "",
                        document,
                        scope.at(directive.pos),
                    )?;
                    self.stmts.insert_document_directive_argument(*parent, "prop", value)?;
                }
            }
        }

        let parent = self
            .cache
            .has_type(&found.type_condition)
            .then_some(found.type_condition.as_str());
        self.insert_selection_set(&scope, None, parent, &fragment.selection_set)
    }

    fn insert_fragment_arguments(&mut self, scope: &Scope<'_>, arguments: &Directive) -> Result<(), LoadError> {
        for (name, value) in &arguments.arguments {
            let argument = parse_fragment_argument(&name.node, &value.node).map_err(|err| {
                LoadError::Invalid(Box::new(scope.raw.locate(Diagnostic::syntax(err.to_string()), name.pos)))
            })?;
            let mut default = argument.default.as_ref();
            if let Err(err) = argument.check_default() {
                self.warnings
                    .push(scope.raw.locate(Diagnostic::validation(err.to_string()), name.pos));
                default = None;
            }
            let default_id = match default {
                Some(default) => Some(self.insert_value(
                    scope,
                    default,
                    value.pos,
                    Some((&argument.base_type, &argument.modifiers)),
                    None,
                )?),
                None => None,
            };
            self.stmts.insert_variable(
                scope.document,
                &argument.name,
                &argument.base_type,
                &argument.modifiers,
                default_id,
                scope.at(name.pos),
            )?;
        }
        Ok(())
    }

    fn insert_variable(&mut self, scope: &Scope<'_>, variable: &Positioned<VariableDefinition>) -> Result<(), LoadError> {
        let definition = &variable.node;
        let (base, modifiers) = type_modifiers::encode(&definition.var_type.node);
        let default = match &definition.default_value {
            Some(value) => Some(self.insert_value(
                scope,
                &value.node.clone().into_value(),
                value.pos,
                Some((&base, &modifiers)),
                scope.index.offset(value.pos),
            )?),
            None => None,
        };
        let id = self.stmts.insert_variable(
            scope.document,
            &definition.name.node,
            &base,
            &modifiers,
            default,
            scope.at(variable.pos),
        )?;

        for directive in &definition.directives {
            let name = directive.node.name.node.as_str();
            let applied = self.stmts.insert_variable_directive(id, name, scope.at(directive.pos))?;
            for (arg, value) in &directive.node.arguments {
                let value_id = self.insert_directive_value(scope, name, &arg.node, value)?;
                self.stmts.insert_variable_directive_argument(applied, &arg.node, value_id)?;
            }
        }
        Ok(())
    }

    /// Insert directive applications on a document; returns `(name, row id)` pairs.
    fn insert_document_directives(
        &mut self,
        scope: &Scope<'_>,
        directives: &[Positioned<Directive>],
    ) -> Result<Vec<(String, i64)>, LoadError> {
        let mut applied = Vec::with_capacity(directives.len());
        for directive in directives {
            let name = directive.node.name.node.as_str();
            let id = self
                .stmts
                .insert_document_directive(scope.document, name, scope.at(directive.pos))?;
            for (arg, value) in &directive.node.arguments {
                let value_id = self.insert_directive_value(scope, name, &arg.node, value)?;
                self.stmts.insert_document_directive_argument(id, &arg.node, value_id)?;
            }
            applied.push((name.to_string(), id));
        }
        Ok(applied)
    }

    fn insert_selection_directives(
        &mut self,
        scope: &Scope<'_>,
        selection: i64,
        directives: &[Positioned<Directive>],
    ) -> Result<(), LoadError> {
        for directive in directives {
            let name = directive.node.name.node.as_str();
            let id = self
                .stmts
                .insert_selection_directive(selection, name, scope.document, scope.at(directive.pos))?;
            for (arg, value) in &directive.node.arguments {
                let value_id = self.insert_directive_value(scope, name, &arg.node, value)?;
                self.stmts
                    .insert_selection_directive_argument(id, &arg.node, value_id, scope.document)?;
            }
        }
        Ok(())
    }

    fn insert_directive_value(
        &mut self,
        scope: &Scope<'_>,
        directive: &str,
        argument: &str,
        value: &Positioned<Value>,
    ) -> rusqlite::Result<i64> {
        let cache = self.cache;
        let slot = cache.directive_argument(directive, argument);
        self.insert_value(
            scope,
            &value.node,
            value.pos,
            slot.map(|s| (s.ty.as_str(), s.modifiers.as_str())),
            scope.index.offset(value.pos),
        )
    }

    fn insert_selection_set(
        &mut self,
        scope: &Scope<'_>,
        parent: Option<i64>,
        parent_type: Option<&str>,
        set: &Positioned<SelectionSet>,
    ) -> Result<(), LoadError> {
        let cache = self.cache;
        for (index, item) in set.node.items.iter().enumerate() {
            let path_index = index as i64;
            match &item.node {
                Selection::Field(field) => {
                    let field = &field.node;
                    let name = field.name.node.as_str();
                    let type_ref = parent_type.map(|p| field_id(p, name));
                    let id = self.stmts.insert_selection(
                        name,
                        field.alias.as_ref().map(|a| a.node.as_str()),
                        path_index,
                        "field",
                        type_ref.as_deref(),
                    )?;
                    self.stmts
                        .insert_selection_ref(parent, id, scope.document, scope.at(item.pos), path_index)?;

                    for (arg, value) in &field.arguments {
                        let slot = parent_type.and_then(|p| cache.field_argument(p, name, &arg.node));
                        let value_id = self.insert_value(
                            scope,
                            &value.node,
                            value.pos,
                            slot.map(|s| (s.ty.as_str(), s.modifiers.as_str())),
                            scope.index.offset(value.pos),
                        )?;
                        self.stmts.insert_selection_argument(
                            id,
                            &arg.node,
                            value_id,
                            slot.and_then(|s| s.id),
                            scope.document,
                            scope.at(arg.pos),
                        )?;
                    }
                    self.insert_selection_directives(scope, id, &field.directives)?;

                    // children of unknown or leaf fields are reported by validation, not typed here
                    let child_type = parent_type
                        .and_then(|p| cache.field(p, name))
                        .map(|info| info.ty.as_str())
                        .filter(|ty| matches!(cache.kind(ty), Some("OBJECT" | "INTERFACE" | "UNION")));
                    self.insert_selection_set(scope, Some(id), child_type, &field.selection_set)?;
                }
                Selection::FragmentSpread(spread) => {
                    let spread = &spread.node;
                    let id = self.stmts.insert_selection(
                        spread.fragment_name.node.as_str(),
                        None,
                        path_index,
                        "fragment",
                        parent_type,
                    )?;
                    self.stmts
                        .insert_selection_ref(parent, id, scope.document, scope.at(item.pos), path_index)?;
                    self.insert_selection_directives(scope, id, &spread.directives)?;
                }
                Selection::InlineFragment(inline) => {
                    let inline = &inline.node;
                    let condition = inline.type_condition.as_ref().map(|c| c.node.on.node.as_str());
                    let id = self.stmts.insert_selection(
                        condition.unwrap_or("inline_fragment"),
                        None,
                        path_index,
                        "inline_fragment",
                        parent_type,
                    )?;
                    self.stmts
                        .insert_selection_ref(parent, id, scope.document, scope.at(item.pos), path_index)?;
                    self.insert_selection_directives(scope, id, &inline.directives)?;

                    let child_type = match condition {
                        Some(condition) => cache.has_type(condition).then_some(condition),
                        None => parent_type,
                    };
                    self.insert_selection_set(scope, Some(id), child_type, &inline.selection_set)?;
                }
            }
        }
        Ok(())
    }

    /// Insert `value` and its children; returns the `argument_values` id.
    ///
    /// `expected` is the schema-declared `(type, modifiers)` at this position.
    /// Without one, or when it names a type the schema lacks, the literal's
    /// natural scalar is recorded. Nested values have no position of their
    /// own and reuse the enclosing one.
    ///
    /// `source` is the byte offset of the literal in the document text when
    /// known. Object keys are read back from it so a key written twice gets
    /// two child rows.
    fn insert_value(
        &mut self,
        scope: &Scope<'_>,
        value: &Value,
        pos: Pos,
        expected: Option<(&str, &str)>,
        source: Option<usize>,
    ) -> rusqlite::Result<i64> {
        let cache = self.cache;
        let text = scope.index.text();
        let expected = expected.filter(|(ty, _)| cache.has_type(ty));
        let (ty, modifiers) = expected.unwrap_or((natural_scalar(value), ""));
        let block = matches!(value, Value::String(_)) && source.is_some_and(|at| text[at..].starts_with("\"\"\""));
        let at = scope.at(pos);
        let id = self.stmts.insert_argument_value(
            value_kind(value, block),
            &value_raw(value),
            ty,
            modifiers,
            scope.document,
            at,
        )?;
        let entries = source.and_then(|start| literal_entries(text, start));

        match value {
            Value::List(items) => {
                let item_modifiers = type_modifiers::list_item(modifiers).unwrap_or("");
                let offsets = entries.filter(|e| e.len() == items.len());
                for (position, item) in items.iter().enumerate() {
                    let child_expected = expected.map(|(ty, _)| (ty, item_modifiers));
                    let item_source = offsets.as_ref().map(|e| e[position].offset);
                    let child = self.insert_value(scope, item, pos, child_expected, item_source)?;
                    self.stmts
                        .insert_argument_value_child(None, id, child, position as i64, scope.document, at)?;
                }
            }
            Value::Object(fields) => {
                // the parser keeps the last of repeated keys; every occurrence gets a row
                let written: Vec<(&str, Option<usize>)> = match entries {
                    Some(entries) if covers_fields(&entries, fields.len(), |k| fields.contains_key(k)) => {
                        entries
                            .iter()
                            .enumerate()
                            .filter_map(|(i, entry)| {
                                let key = entry.key?;
                                let last = !entries[i + 1..].iter().any(|later| later.key == Some(key));
                                Some((key, last.then_some(entry.offset)))
                            })
                            .collect()
                    }
                    _ => fields.keys().map(|name| (name.as_str(), None)).collect(),
                };
                for (position, (name, field_source)) in written.into_iter().enumerate() {
                    let Some(field_value) = fields.get(name) else {
                        continue;
                    };
                    let slot = expected.and_then(|(ty, _)| cache.input_field(ty, name));
                    let child = self.insert_value(
                        scope,
                        field_value,
                        pos,
                        slot.as_ref().map(|s| (s.ty.as_str(), s.modifiers.as_str())),
                        field_source,
                    )?;
                    self.stmts
                        .insert_argument_value_child(Some(name), id, child, position as i64, scope.document, at)?;
                }
            }
            _ => {}
        }
        Ok(id)
    }
}

/// The scanned keys name exactly the parsed fields, repeats aside.
fn covers_fields(entries: &[LiteralEntry<'_>], unique: usize, known: impl Fn(&str) -> bool) -> bool {
    let mut seen: Vec<&str> = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.key {
            Some(key) if known(key) => {
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
            _ => return false,
        }
    }
    seen.len() == unique
}
