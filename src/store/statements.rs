//! Prepared-statement bundles.
//!
//! Each bundle prepares its statements once against an open transaction and
//! reuses them for every row of that transaction. Statements are finalized
//! when the bundle drops, so a bundle must not outlive its transaction.

use rusqlite::{params, Connection, Statement};

/// Absolute, 1-based source position stored alongside IR rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SourcePos {
    pub line: i64,
    pub col: i64,
}

impl SourcePos {
    pub fn new(line: i64, col: i64) -> Self {
        Self { line, col }
    }
}

/// Statements used by the extractor's writer.
pub struct ExtractStatements<'conn> {
    delete_file: Statement<'conn>,
    insert_raw: Statement<'conn>,
    insert_component_field: Statement<'conn>,
}

impl<'conn> ExtractStatements<'conn> {
    pub fn prepare(conn: &'conn Connection) -> rusqlite::Result<Self> {
        Ok(Self {
            delete_file: conn.prepare(
                "DELETE FROM raw_documents WHERE filepath = ?1 AND current_task IS ?2",
            )?,
            insert_raw: conn.prepare(
                "INSERT INTO raw_documents
                    (filepath, content, offset_byte, offset_line, offset_column, current_task)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?,
            insert_component_field: conn.prepare(
                "INSERT INTO component_fields (document, prop, inline) VALUES (?1, ?2, 1)",
            )?,
        })
    }

    /// Drop every raw document previously extracted from `filepath` for `task`.
    pub fn clear_file(&mut self, filepath: &str, task: Option<&str>) -> rusqlite::Result<usize> {
        self.delete_file.execute(params![filepath, task])
    }

    pub fn insert_raw_document(
        &mut self,
        filepath: &str,
        content: &str,
        offset_byte: i64,
        offset: SourcePos,
        task: Option<&str>,
    ) -> rusqlite::Result<i64> {
        self.insert_raw
            .insert(params![filepath, content, offset_byte, offset.line, offset.col, task])
    }

    pub fn insert_inline_component_field(&mut self, raw_document: i64, prop: &str) -> rusqlite::Result<i64> {
        self.insert_component_field.insert(params![raw_document, prop])
    }
}

/// Statements used by the document loader's writer, one per IR table.
pub struct LoaderStatements<'conn> {
    document: Statement<'conn>,
    variable: Statement<'conn>,
    selection: Statement<'conn>,
    selection_ref: Statement<'conn>,
    argument_value: Statement<'conn>,
    argument_value_child: Statement<'conn>,
    selection_argument: Statement<'conn>,
    selection_directive: Statement<'conn>,
    selection_directive_argument: Statement<'conn>,
    document_directive: Statement<'conn>,
    document_directive_argument: Statement<'conn>,
    variable_directive: Statement<'conn>,
    variable_directive_argument: Statement<'conn>,
}

impl<'conn> LoaderStatements<'conn> {
    pub fn prepare(conn: &'conn Connection) -> rusqlite::Result<Self> {
        Ok(Self {
            document: conn.prepare(
                "INSERT INTO documents (name, kind, raw_document, type_condition, line, col)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?,
            variable: conn.prepare(
                "INSERT INTO document_variables
                    (document, name, type, type_modifiers, default_value, line, col)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?,
            selection: conn.prepare(
                "INSERT INTO selections (field_name, alias, path_index, kind, type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?,
            selection_ref: conn.prepare(
                "INSERT INTO selection_refs (parent_id, child_id, document, line, col, path_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?,
            argument_value: conn.prepare(
                "INSERT INTO argument_values
                    (kind, raw, expected_type, expected_type_modifiers, document, line, col)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?,
            argument_value_child: conn.prepare(
                "INSERT INTO argument_value_children (name, parent, value, position, document, line, col)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?,
            selection_argument: conn.prepare(
                "INSERT INTO selection_arguments
                    (selection_id, name, value, field_argument, document, line, col)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?,
            selection_directive: conn.prepare(
                "INSERT INTO selection_directives (selection_id, directive, document, line, col)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?,
            selection_directive_argument: conn.prepare(
                "INSERT INTO selection_directive_arguments (parent, name, value, document)
                 VALUES (?1, ?2, ?3, ?4)",
            )?,
            document_directive: conn.prepare(
                "INSERT INTO document_directives (document, directive, line, col) VALUES (?1, ?2, ?3, ?4)",
            )?,
            document_directive_argument: conn.prepare(
                "INSERT INTO document_directive_arguments (parent, name, value) VALUES (?1, ?2, ?3)",
            )?,
            variable_directive: conn.prepare(
                "INSERT INTO document_variable_directives (parent, directive, line, col)
                 VALUES (?1, ?2, ?3, ?4)",
            )?,
            variable_directive_argument: conn.prepare(
                "INSERT INTO document_variable_directive_arguments (parent, name, value)
                 VALUES (?1, ?2, ?3)",
            )?,
        })
    }

    pub fn insert_document(
        &mut self,
        name: &str,
        kind: &str,
        raw_document: i64,
        type_condition: Option<&str>,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.document
            .insert(params![name, kind, raw_document, type_condition, pos.line, pos.col])
    }

    pub fn insert_variable(
        &mut self,
        document: i64,
        name: &str,
        base_type: &str,
        modifiers: &str,
        default_value: Option<i64>,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.variable.insert(params![
            document,
            name,
            base_type,
            modifiers,
            default_value,
            pos.line,
            pos.col
        ])
    }

    pub fn insert_selection(
        &mut self,
        field_name: &str,
        alias: Option<&str>,
        path_index: i64,
        kind: &str,
        type_ref: Option<&str>,
    ) -> rusqlite::Result<i64> {
        self.selection
            .insert(params![field_name, alias, path_index, kind, type_ref])
    }

    pub fn insert_selection_ref(
        &mut self,
        parent: Option<i64>,
        child: i64,
        document: i64,
        pos: SourcePos,
        path_index: i64,
    ) -> rusqlite::Result<i64> {
        self.selection_ref
            .insert(params![parent, child, document, pos.line, pos.col, path_index])
    }

    pub fn insert_argument_value(
        &mut self,
        kind: &str,
        raw: &str,
        expected_type: &str,
        expected_modifiers: &str,
        document: i64,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.argument_value.insert(params![
            kind,
            raw,
            expected_type,
            expected_modifiers,
            document,
            pos.line,
            pos.col
        ])
    }

    pub fn insert_argument_value_child(
        &mut self,
        name: Option<&str>,
        parent: i64,
        value: i64,
        position: i64,
        document: i64,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.argument_value_child
            .insert(params![name, parent, value, position, document, pos.line, pos.col])
    }

    pub fn insert_selection_argument(
        &mut self,
        selection: i64,
        name: &str,
        value: i64,
        field_argument: Option<i64>,
        document: i64,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.selection_argument.insert(params![
            selection,
            name,
            value,
            field_argument,
            document,
            pos.line,
            pos.col
        ])
    }

    pub fn insert_selection_directive(
        &mut self,
        selection: i64,
        directive: &str,
        document: i64,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.selection_directive
            .insert(params![selection, directive, document, pos.line, pos.col])
    }

    pub fn insert_selection_directive_argument(
        &mut self,
        parent: i64,
        name: &str,
        value: i64,
        document: i64,
    ) -> rusqlite::Result<i64> {
        self.selection_directive_argument
            .insert(params![parent, name, value, document])
    }

    pub fn insert_document_directive(
        &mut self,
        document: i64,
        directive: &str,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.document_directive
            .insert(params![document, directive, pos.line, pos.col])
    }

    pub fn insert_document_directive_argument(&mut self, parent: i64, name: &str, value: i64) -> rusqlite::Result<i64> {
        self.document_directive_argument.insert(params![parent, name, value])
    }

    pub fn insert_variable_directive(
        &mut self,
        variable: i64,
        directive: &str,
        pos: SourcePos,
    ) -> rusqlite::Result<i64> {
        self.variable_directive
            .insert(params![variable, directive, pos.line, pos.col])
    }

    pub fn insert_variable_directive_argument(&mut self, parent: i64, name: &str, value: i64) -> rusqlite::Result<i64> {
        self.variable_directive_argument.insert(params![parent, name, value])
    }
}
