//! Structural checks on an assembled schema, run before anything is written.

use async_graphql_parser::Pos;

use super::model::{Origin, SchemaModel};
use crate::diagnostics::Diagnostic;

/// Validate `model`; every returned diagnostic is fatal for the schema phase.
pub fn validate_schema(model: &SchemaModel, filepath: &str) -> Vec<Diagnostic> {
    let mut errors = model.problem_diagnostics(filepath);
    let mut report = |message: String, pos: Pos, origin: Origin| {
        let diagnostic = Diagnostic::validation(message);
        // internal definitions carry positions of the embedded SDL, not the user's file
        errors.push(if origin == Origin::User {
            diagnostic.at(filepath, pos.line, pos.column)
        } else {
            diagnostic
        });
    };

    match &model.roots.query {
        None => report("schema has no query root type".to_string(), Pos { line: 1, column: 1 }, Origin::User),
        Some((name, pos)) => {
            if !model.types.get(name).is_some_and(|t| t.kind == "OBJECT") {
                report(format!("query root type {name} is not an object type"), *pos, Origin::User);
            }
        }
    }
    for (label, root) in [("mutation", &model.roots.mutation), ("subscription", &model.roots.subscription)] {
        if let Some((name, pos)) = root {
            if !model.types.get(name).is_some_and(|t| t.kind == "OBJECT") {
                report(format!("{label} root type {name} is not an object type"), *pos, Origin::User);
            }
        }
    }

    for ty in model.types.values() {
        for field in &ty.fields {
            match model.types.get(&field.ty) {
                None => report(
                    format!("unknown type {} for field {}.{}", field.ty, ty.name, field.name),
                    field.pos,
                    ty.origin,
                ),
                Some(target) if ty.kind == "INPUT" && !target.is_input() => report(
                    format!(
                        "input field {}.{} has output type {}",
                        ty.name, field.name, target.name
                    ),
                    field.pos,
                    ty.origin,
                ),
                Some(target) if ty.kind != "INPUT" && target.kind == "INPUT" => report(
                    format!(
                        "field {}.{} cannot return input type {}",
                        ty.name, field.name, target.name
                    ),
                    field.pos,
                    ty.origin,
                ),
                Some(_) => {}
            }

            for arg in &field.args {
                match model.types.get(&arg.ty) {
                    None => report(
                        format!("unknown type {} for argument {}.{}({})", arg.ty, ty.name, field.name, arg.name),
                        arg.pos,
                        ty.origin,
                    ),
                    Some(target) if !target.is_input() => report(
                        format!(
                            "argument {}.{}({}) has output type {}",
                            ty.name, field.name, arg.name, target.name
                        ),
                        arg.pos,
                        ty.origin,
                    ),
                    Some(_) => {}
                }
            }
        }

        for (member, pos) in &ty.members {
            match model.types.get(member) {
                None => report(format!("union {} has unknown member {member}", ty.name), *pos, ty.origin),
                Some(target) if target.kind != "OBJECT" => report(
                    format!("union {} member {member} is not an object type", ty.name),
                    *pos,
                    ty.origin,
                ),
                Some(_) => {}
            }
        }

        for (interface, pos) in &ty.implements {
            match model.types.get(interface) {
                None => report(
                    format!("{} implements unknown interface {interface}", ty.name),
                    *pos,
                    ty.origin,
                ),
                Some(target) if target.kind != "INTERFACE" => report(
                    format!("{} implements {interface}, which is not an interface", ty.name),
                    *pos,
                    ty.origin,
                ),
                Some(target) => {
                    for required in target.fields.iter().filter(|f| !f.internal) {
                        if !ty.fields.iter().any(|f| f.name == required.name) {
                            report(
                                format!(
                                    "{} must define field {} required by interface {interface}",
                                    ty.name, required.name
                                ),
                                ty.pos,
                                ty.origin,
                            );
                        }
                    }
                }
            }
        }
    }

    for directive in model.directives.values() {
        for arg in &directive.args {
            match model.types.get(&arg.ty) {
                None => report(
                    format!("unknown type {} for argument @{}({})", arg.ty, directive.name, arg.name),
                    arg.pos,
                    directive.origin,
                ),
                Some(target) if !target.is_input() => report(
                    format!("argument @{}({}) has output type {}", directive.name, arg.name, target.name),
                    arg.pos,
                    directive.origin,
                ),
                Some(_) => {}
            }
        }
    }

    errors
}
