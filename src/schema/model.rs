//! In-memory schema assembled from one or more SDL documents.
//!
//! The model only lives between parsing and the write transaction; it exists
//! so extensions can be merged and the schema validated before any row is
//! written.

use std::collections::BTreeMap;

use async_graphql_parser::types::{
    InputValueDefinition, ServiceDocument, TypeDefinition, TypeKind, TypeSystemDefinition,
};
use async_graphql_parser::{Pos, Positioned};

use crate::diagnostics::Diagnostic;
use crate::graphql::ast::const_value_text;
use crate::graphql::{directive_location_name, type_modifiers};

/// Where a definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    BuiltIn,
    Internal,
    User,
}

#[derive(Debug, Clone)]
pub struct ArgDef {
    pub name: String,
    pub ty: String,
    pub modifiers: String,
    pub default_value: Option<String>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: String,
    pub modifiers: String,
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub args: Vec<ArgDef>,
    pub internal: bool,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub kind: &'static str,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    pub implements: Vec<(String, Pos)>,
    pub members: Vec<(String, Pos)>,
    pub enum_values: Vec<(String, Option<String>)>,
    pub origin: Origin,
    pub pos: Pos,
}

impl TypeDef {
    pub fn is_composite(&self) -> bool {
        matches!(self.kind, "OBJECT" | "INTERFACE" | "UNION")
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, "SCALAR" | "ENUM" | "INPUT")
    }
}

#[derive(Debug, Clone)]
pub struct DirectiveDef {
    pub name: String,
    pub repeatable: bool,
    pub args: Vec<ArgDef>,
    pub locations: Vec<&'static str>,
    pub origin: Origin,
    pub pos: Pos,
}

/// Names of the root operation types.
#[derive(Debug, Clone, Default)]
pub struct RootTypes {
    pub query: Option<(String, Pos)>,
    pub mutation: Option<(String, Pos)>,
    pub subscription: Option<(String, Pos)>,
}

#[derive(Debug, Default)]
pub struct SchemaModel {
    pub types: BTreeMap<String, TypeDef>,
    pub directives: BTreeMap<String, DirectiveDef>,
    pub roots: RootTypes,
    /// Problems found while assembling (duplicates, dangling extensions).
    pub problems: Vec<(String, Pos)>,
    pending_extensions: Vec<Positioned<TypeDefinition>>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every definition of `doc`.
    ///
    /// Built-in and internal definitions never replace user definitions with
    /// the same name; user duplicates are recorded as problems.
    pub fn add_document(&mut self, doc: ServiceDocument, origin: Origin) {
        for definition in doc.definitions {
            match definition {
                TypeSystemDefinition::Schema(schema) => {
                    let schema = schema.node;
                    if let Some(query) = schema.query {
                        self.roots.query = Some((query.node.to_string(), query.pos));
                    }
                    if let Some(mutation) = schema.mutation {
                        self.roots.mutation = Some((mutation.node.to_string(), mutation.pos));
                    }
                    if let Some(subscription) = schema.subscription {
                        self.roots.subscription = Some((subscription.node.to_string(), subscription.pos));
                    }
                }
                TypeSystemDefinition::Type(ty) if ty.node.extend => {
                    self.pending_extensions.push(ty);
                }
                TypeSystemDefinition::Type(ty) => self.add_type(ty, origin),
                TypeSystemDefinition::Directive(directive) => {
                    let pos = directive.pos;
                    let directive = directive.node;
                    let name = directive.name.node.to_string();
                    if self.directives.contains_key(&name) {
                        if origin == Origin::User {
                            self.problems.push((format!("directive @{name} is defined more than once"), pos));
                        }
                        continue;
                    }
                    self.directives.insert(
                        name.clone(),
                        DirectiveDef {
                            name,
                            repeatable: directive.is_repeatable,
                            args: directive.arguments.iter().map(arg_def).collect(),
                            locations: directive
                                .locations
                                .iter()
                                .map(|location| directive_location_name(&location.node))
                                .collect(),
                            origin,
                            pos,
                        },
                    );
                }
            }
        }
    }

    fn add_type(&mut self, ty: Positioned<TypeDefinition>, origin: Origin) {
        let pos = ty.pos;
        let def = ty.node;
        let name = def.name.node.to_string();

        if let Some(existing) = self.types.get(&name) {
            if origin == Origin::User && existing.origin == Origin::User {
                self.problems.push((format!("type {name} is defined more than once"), pos));
            }
            if origin == Origin::User && existing.origin != Origin::User {
                // user redefinition of a built-in or framework type wins
                self.types.remove(&name);
            } else {
                return;
            }
        }

        let mut type_def = TypeDef {
            name: name.clone(),
            kind: kind_name(&def.kind),
            description: def.description.map(|d| d.node),
            fields: Vec::new(),
            implements: Vec::new(),
            members: Vec::new(),
            enum_values: Vec::new(),
            origin,
            pos,
        };
        merge_kind(&mut type_def, def.kind, &mut self.problems);
        self.types.insert(name, type_def);
    }

    /// Apply collected `extend type` definitions to their base types.
    pub fn apply_extensions(&mut self) {
        for ext in std::mem::take(&mut self.pending_extensions) {
            let pos = ext.pos;
            let def = ext.node;
            let name = def.name.node.to_string();
            match self.types.get_mut(&name) {
                Some(base) if base.kind == kind_name(&def.kind) => {
                    merge_kind(base, def.kind, &mut self.problems);
                }
                Some(base) => {
                    self.problems.push((
                        format!("cannot extend {} {name} as {}", base.kind, kind_name(&def.kind)),
                        pos,
                    ));
                }
                None => {
                    self.problems.push((format!("cannot extend unknown type {name}"), pos));
                }
            }
        }
    }

    /// Default root type names when no `schema { }` block names them.
    pub fn resolve_roots(&mut self) {
        let defaults = [
            ("Query", &mut self.roots.query),
            ("Mutation", &mut self.roots.mutation),
            ("Subscription", &mut self.roots.subscription),
        ];
        for (default, slot) in defaults {
            if slot.is_none() {
                if let Some(ty) = self.types.get(default) {
                    *slot = Some((default.to_string(), ty.pos));
                }
            }
        }
    }

    /// Add `__typename: String!` to every composite type.
    pub fn add_typename_fields(&mut self) {
        for ty in self.types.values_mut().filter(|t| t.is_composite()) {
            if ty.fields.iter().any(|f| f.name == super::internal::TYPENAME_FIELD) {
                continue;
            }
            ty.fields.push(FieldDef {
                name: super::internal::TYPENAME_FIELD.to_string(),
                ty: "String".to_string(),
                modifiers: "!".to_string(),
                default_value: None,
                description: None,
                args: Vec::new(),
                internal: true,
                pos: ty.pos,
            });
        }
    }

    /// Declare a scalar unless a type with that name exists.
    pub fn ensure_scalar(&mut self, name: &str, origin: Origin) {
        if self.types.contains_key(name) {
            return;
        }
        self.types.insert(
            name.to_string(),
            TypeDef {
                name: name.to_string(),
                kind: "SCALAR",
                description: None,
                fields: Vec::new(),
                implements: Vec::new(),
                members: Vec::new(),
                enum_values: Vec::new(),
                origin,
                pos: Pos { line: 0, column: 0 },
            },
        );
    }

    /// Members of an interface (implementors) or union.
    pub fn possible_types(&self, name: &str) -> Vec<String> {
        let Some(ty) = self.types.get(name) else {
            return Vec::new();
        };
        match ty.kind {
            "UNION" => ty.members.iter().map(|(m, _)| m.clone()).collect(),
            "INTERFACE" => self
                .types
                .values()
                .filter(|candidate| candidate.implements.iter().any(|(i, _)| i == name))
                .map(|candidate| candidate.name.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Diagnostics for assembly problems, located in `filepath`.
    pub fn problem_diagnostics(&self, filepath: &str) -> Vec<Diagnostic> {
        self.problems
            .iter()
            .map(|(message, pos)| {
                Diagnostic::validation(message.clone()).at(filepath, pos.line, pos.column)
            })
            .collect()
    }
}

fn kind_name(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Scalar => "SCALAR",
        TypeKind::Object(_) => "OBJECT",
        TypeKind::Interface(_) => "INTERFACE",
        TypeKind::Union(_) => "UNION",
        TypeKind::Enum(_) => "ENUM",
        TypeKind::InputObject(_) => "INPUT",
    }
}

fn merge_kind(target: &mut TypeDef, kind: TypeKind, problems: &mut Vec<(String, Pos)>) {
    match kind {
        TypeKind::Scalar => {}
        TypeKind::Object(object) => {
            target
                .implements
                .extend(object.implements.into_iter().map(|i| (i.node.to_string(), i.pos)));
            for field in object.fields {
                push_field(target, field_def(&field), problems);
            }
        }
        TypeKind::Interface(interface) => {
            target
                .implements
                .extend(interface.implements.into_iter().map(|i| (i.node.to_string(), i.pos)));
            for field in interface.fields {
                push_field(target, field_def(&field), problems);
            }
        }
        TypeKind::Union(union) => {
            target
                .members
                .extend(union.members.into_iter().map(|m| (m.node.to_string(), m.pos)));
        }
        TypeKind::Enum(enum_type) => {
            for value in enum_type.values {
                let name = value.node.value.node.to_string();
                if target.enum_values.iter().any(|(v, _)| *v == name) {
                    problems.push((format!("enum value {}.{name} is defined more than once", target.name), value.pos));
                    continue;
                }
                target.enum_values.push((name, value.node.description.map(|d| d.node)));
            }
        }
        TypeKind::InputObject(input) => {
            for field in input.fields {
                let arg = arg_def(&field);
                push_field(
                    target,
                    FieldDef {
                        name: arg.name,
                        ty: arg.ty,
                        modifiers: arg.modifiers,
                        default_value: arg.default_value,
                        description: field.node.description.as_ref().map(|d| d.node.clone()),
                        args: Vec::new(),
                        internal: false,
                        pos: field.pos,
                    },
                    problems,
                );
            }
        }
    }
}

fn push_field(target: &mut TypeDef, field: FieldDef, problems: &mut Vec<(String, Pos)>) {
    if target.fields.iter().any(|f| f.name == field.name) {
        problems.push((
            format!("field {}.{} is defined more than once", target.name, field.name),
            field.pos,
        ));
        return;
    }
    target.fields.push(field);
}

fn field_def(field: &Positioned<async_graphql_parser::types::FieldDefinition>) -> FieldDef {
    let (ty, modifiers) = type_modifiers::encode(&field.node.ty.node);
    FieldDef {
        name: field.node.name.node.to_string(),
        ty,
        modifiers,
        default_value: None,
        description: field.node.description.as_ref().map(|d| d.node.clone()),
        args: field.node.arguments.iter().map(arg_def).collect(),
        internal: false,
        pos: field.pos,
    }
}

fn arg_def(arg: &Positioned<InputValueDefinition>) -> ArgDef {
    let (ty, modifiers) = type_modifiers::encode(&arg.node.ty.node);
    ArgDef {
        name: arg.node.name.node.to_string(),
        ty,
        modifiers,
        default_value: arg.node.default_value.as_ref().map(|v| const_value_text(&v.node)),
        pos: arg.pos,
    }
}
