//! Formula columns.
//!
//! A formula references one half of another cell: `%<columnId>.<field>`
//! with `<field>` one of `code` or `label`. Values pass through as raw
//! strings; no numeric or date formatting happens here.
//!
//! References may point forward at other formula columns. Such a reference
//! resolves to the target's own formula text ([`FormulaValue::Deferred`])
//! and is retried on a later pass. References to columns the row's schema
//! does not declare climb the direct parent chain through the
//! [`RelationResolver`].

use crate::resolver::{RelationResolver, ResolveError};
use crate::row::Row;
use collecta_ids::RowId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Marker opening every formula.
pub const FORMULA_MARKER: char = '%';

/// Separator between the column id and the field.
pub const FORMULA_SEPARATOR: char = '.';

/// Upper bound on chained lookups outside the row being resolved.
const MAX_CHAIN_DEPTH: usize = 32;

/// Which half of a cell a formula reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaField {
    Code,
    Label,
}

impl FormulaField {
    pub const ALL: [FormulaField; 2] = [FormulaField::Code, FormulaField::Label];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaField::Code => "code",
            FormulaField::Label => "label",
        }
    }
}

impl fmt::Display for FormulaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FormulaField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(FormulaField::Code),
            "label" => Ok(FormulaField::Label),
            other => Err(format!("unknown field '{}' (expected code or label)", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("Cannot compile formula '{formula}': {reason}")]
    Compile { formula: String, reason: String },

    #[error("Column '{column}' is unknown to '{table}' and all of its ancestors")]
    UnknownColumn { column: String, table: String },

    #[error("Formula on '{column}.{field}' is still unresolved")]
    Unresolved { column: String, field: FormulaField },

    #[error("Row of '{table}' has no '{parent}' parent to read from")]
    MissingParent { table: String, parent: String },

    #[error("Formula '{formula}' chains too deep")]
    TooDeep { formula: String },

    #[error("Parent lookup failed: {0}")]
    Lookup(#[from] ResolveError),
}

/// A formula failure pinned to the cell it was computing.
#[derive(Debug, Error)]
#[error("{table}[{row}].{column}.{field}: {source}")]
pub struct ColumnFormulaError {
    pub table: String,
    pub row: RowId,
    pub column: String,
    pub field: FormulaField,
    #[source]
    pub source: FormulaError,
}

/// Result of resolving a formula against one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaValue {
    /// Final value (possibly empty)
    Resolved(String),
    /// The referenced cell is itself an unresolved formula; its text
    Deferred(String),
}

/// A compiled `%<columnId>.<field>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    source: String,
    column: String,
    field: FormulaField,
}

impl Formula {
    pub fn compile(text: &str) -> Result<Self, FormulaError> {
        let fail = |reason: String| FormulaError::Compile {
            formula: text.to_string(),
            reason,
        };

        let body = text
            .trim()
            .strip_prefix(FORMULA_MARKER)
            .ok_or_else(|| fail(format!("missing '{}' marker", FORMULA_MARKER)))?;
        let tokens: Vec<&str> = body.split(FORMULA_SEPARATOR).collect();
        if tokens.len() != 2 || tokens.iter().any(|t| t.is_empty()) {
            return Err(fail(format!(
                "expected {}<column>{}<field>, found {} token(s)",
                FORMULA_MARKER,
                FORMULA_SEPARATOR,
                tokens.len()
            )));
        }
        let field = tokens[1].parse::<FormulaField>().map_err(fail)?;

        Ok(Self {
            source: text.trim().to_string(),
            column: tokens[0].to_string(),
            field,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn field(&self) -> FormulaField {
        self.field
    }

    /// Resolve against `row` alone.
    ///
    /// Returns `None` when the row's schema does not declare the referenced
    /// column; the caller then looks further up the parent chain.
    pub fn resolve(&self, row: &Row) -> Option<FormulaValue> {
        let column = row.schema().column(&self.column)?;
        match row.field(&self.column, self.field) {
            Some(value) if !value.is_empty() => Some(FormulaValue::Resolved(value.to_string())),
            _ => Some(match column.formula_for(self.field) {
                Some(formula) => FormulaValue::Deferred(formula.to_string()),
                None => FormulaValue::Resolved(String::new()),
            }),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

type Target = (String, FormulaField);

/// Computes formula cells, reading ancestors through a pass-scoped resolver.
pub struct FormulaEngine<'p, 'a> {
    resolver: &'p mut RelationResolver<'a>,
}

impl<'p, 'a> FormulaEngine<'p, 'a> {
    pub fn new(resolver: &'p mut RelationResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Recompute every formula cell of `row`.
    ///
    /// Formula cells are cleared first and recomputed over at most
    /// `targets + 1` passes, so running this twice gives the same row.
    /// Failed cells stay empty; one error is returned per failed cell.
    pub fn resolve_row(&mut self, row: &mut Row) -> Vec<ColumnFormulaError> {
        let mut errors = Vec::new();
        let mut targets: Vec<(Target, Formula)> = Vec::new();

        let schema = row.schema().clone();
        for column in schema.formula_columns() {
            for field in FormulaField::ALL {
                let Some(text) = column.formula_for(field) else {
                    continue;
                };
                match Formula::compile(text) {
                    Ok(formula) => targets.push(((column.id.clone(), field), formula)),
                    Err(source) => errors.push(pin(row, &column.id, field, source)),
                }
            }
        }

        for ((column, field), _) in &targets {
            row.clear_field(column, *field);
        }

        let mut pending: HashSet<Target> = targets.iter().map(|(t, _)| t.clone()).collect();
        let mut failed: HashSet<Target> = HashSet::new();
        let passes = targets.len() + 1;

        for pass in 0..passes {
            if pending.is_empty() {
                break;
            }
            let mut progressed = false;
            for (target, formula) in &targets {
                if !pending.contains(target) {
                    continue;
                }
                match self.evaluate_local(row, formula, &pending, &failed) {
                    Ok(Some(value)) => {
                        pending.remove(target);
                        progressed = true;
                        if let Err(err) = row.set_field(&target.0, target.1, value) {
                            debug!(error = %err, "Formula target vanished from schema");
                        }
                    }
                    Ok(None) => {}
                    Err(source) => {
                        pending.remove(target);
                        failed.insert(target.clone());
                        progressed = true;
                        errors.push(pin(row, &target.0, target.1, source));
                    }
                }
            }
            debug!(table = row.table(), pass, remaining = pending.len(), "Formula pass");
            if !progressed {
                break;
            }
        }

        for (column, field) in targets.iter().map(|(t, _)| t).filter(|t| pending.contains(*t)) {
            let source = FormulaError::Unresolved {
                column: column.clone(),
                field: *field,
            };
            errors.push(pin(row, column, *field, source));
        }
        errors
    }

    /// Recompute the formula cells of a single column from the row's
    /// current values.
    pub fn refresh_column(&mut self, row: &mut Row, column: &str) -> Result<(), FormulaError> {
        let Some(definition) = row.schema().column(column).cloned() else {
            return Err(FormulaError::UnknownColumn {
                column: column.to_string(),
                table: row.table().to_string(),
            });
        };
        for field in FormulaField::ALL {
            let Some(text) = definition.formula_for(field) else {
                continue;
            };
            let formula = Formula::compile(text)?;
            if formula.column() == column && formula.field() == field {
                return Err(FormulaError::Unresolved {
                    column: column.to_string(),
                    field,
                });
            }
            let value = self.lookup(row, &formula, 0)?;
            row.set_field(column, field, value)
                .map_err(|_| FormulaError::UnknownColumn {
                    column: column.to_string(),
                    table: row.table().to_string(),
                })?;
        }
        Ok(())
    }

    /// Evaluate a formula of the row being resolved. `Ok(None)` defers it.
    fn evaluate_local(
        &mut self,
        row: &Row,
        formula: &Formula,
        pending: &HashSet<Target>,
        failed: &HashSet<Target>,
    ) -> Result<Option<String>, FormulaError> {
        if row.schema().has_column(formula.column()) {
            let key = (formula.column().to_string(), formula.field());
            if failed.contains(&key) {
                return Err(FormulaError::Unresolved {
                    column: key.0,
                    field: key.1,
                });
            }
            if pending.contains(&key) {
                return Ok(None);
            }
            let value = row.field(formula.column(), formula.field()).unwrap_or("");
            return Ok(Some(value.to_string()));
        }

        let ancestor = self.fetch_ancestor(row, formula.column())?;
        self.lookup(&ancestor, formula, 1).map(Some)
    }

    /// Resolve against a row outside the pass, chasing deferred formulas.
    fn lookup(&mut self, row: &Row, formula: &Formula, depth: usize) -> Result<String, FormulaError> {
        if depth > MAX_CHAIN_DEPTH {
            return Err(FormulaError::TooDeep {
                formula: formula.source().to_string(),
            });
        }
        match formula.resolve(row) {
            Some(FormulaValue::Resolved(value)) => Ok(value),
            Some(FormulaValue::Deferred(text)) => {
                let next = Formula::compile(&text)?;
                self.lookup(row, &next, depth + 1)
            }
            None => {
                let ancestor = self.fetch_ancestor(row, formula.column())?;
                self.lookup(&ancestor, formula, depth + 1)
            }
        }
    }

    /// Nearest ancestor of `row` whose schema declares `column`.
    fn fetch_ancestor(&mut self, row: &Row, column: &str) -> Result<Row, FormulaError> {
        let path = self
            .resolver
            .catalog()
            .path_to_ancestor_column(row.table(), column)
            .ok_or_else(|| FormulaError::UnknownColumn {
                column: column.to_string(),
                table: row.table().to_string(),
            })?;

        let mut child_table = row.table().to_string();
        let mut next_id = path.first().and_then(|rel| row.parent_id(&rel.parent));
        for (i, relation) in path.iter().enumerate() {
            let id = next_id.ok_or_else(|| FormulaError::MissingParent {
                table: child_table.clone(),
                parent: relation.parent.clone(),
            })?;
            let parent = self.resolver.get_parent_value(relation, id)?;
            match path.get(i + 1) {
                Some(up) => next_id = parent.parent_id(&up.parent),
                None => return Ok(parent.clone()),
            }
            child_table = relation.parent.clone();
        }
        // Path is never empty: the starting schema lacks the column.
        Err(FormulaError::UnknownColumn {
            column: column.to_string(),
            table: row.table().to_string(),
        })
    }
}

fn pin(row: &Row, column: &str, field: FormulaField, source: FormulaError) -> ColumnFormulaError {
    ColumnFormulaError {
        table: row.table().to_string(),
        row: row.id(),
        column: column.to_string(),
        field,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogDef, SchemaDef};
    use crate::column::{Column, ColumnType};
    use crate::row::Cell;
    use crate::storage::MemoryStore;

    fn single_table() -> Catalog {
        let def = CatalogDef::default().schema(
            SchemaDef::new("sample")
                .column(Column::new("sampMatCode", ColumnType::Picklist))
                .column(Column::new("copyLabel", ColumnType::Formula).with_code_formula("%sampMatCode.label"))
                // forward reference to a later formula column
                .column(Column::new("first", ColumnType::Formula).with_code_formula("%second.code"))
                .column(Column::new("second", ColumnType::Formula).with_code_formula("%copyLabel.code")),
        );
        Catalog::build(def).unwrap()
    }

    #[test]
    fn test_compile() {
        let formula = Formula::compile("%sampMatCode.label").unwrap();
        assert_eq!(formula.column(), "sampMatCode");
        assert_eq!(formula.field(), FormulaField::Label);
        assert_eq!(formula.to_string(), "%sampMatCode.label");
    }

    #[test]
    fn test_compile_rejects_bad_shapes() {
        for text in ["sampMatCode.label", "%sampMatCode", "%a.b.code", "%.code", "%a.", "%a.value"] {
            assert!(
                matches!(Formula::compile(text), Err(FormulaError::Compile { .. })),
                "{} should not compile",
                text
            );
        }
    }

    #[test]
    fn test_resolve_literal_semantics() {
        let catalog = single_table();
        let schema = catalog.schema("sample").unwrap();
        let mut row = Row::new(schema);

        // referenced column empty and formula-free: resolved but empty
        let formula = Formula::compile("%sampMatCode.code").unwrap();
        assert_eq!(formula.resolve(&row), Some(FormulaValue::Resolved(String::new())));

        row.put("sampMatCode", Cell::new("A0B9Z", "Milk")).unwrap();
        assert_eq!(formula.resolve(&row), Some(FormulaValue::Resolved("A0B9Z".to_string())));

        // referenced column is itself an empty formula: its text comes back
        let forward = Formula::compile("%second.code").unwrap();
        assert_eq!(
            forward.resolve(&row),
            Some(FormulaValue::Deferred("%copyLabel.code".to_string()))
        );

        let foreign = Formula::compile("%country.code").unwrap();
        assert_eq!(foreign.resolve(&row), None);
    }

    #[test]
    fn test_resolve_row_with_forward_references() {
        let catalog = single_table();
        let store = MemoryStore::new();
        let mut resolver = RelationResolver::new(&catalog, &store);
        let mut row = Row::new(catalog.schema("sample").unwrap());
        row.put("sampMatCode", Cell::new("A0B9Z", "Milk")).unwrap();

        let errors = FormulaEngine::new(&mut resolver).resolve_row(&mut row);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(row.code("copyLabel"), Some("Milk"));
        assert_eq!(row.code("second"), Some("Milk"));
        assert_eq!(row.code("first"), Some("Milk"));
    }

    #[test]
    fn test_resolve_row_is_idempotent() {
        let catalog = single_table();
        let store = MemoryStore::new();
        let mut resolver = RelationResolver::new(&catalog, &store);
        let mut row = Row::new(catalog.schema("sample").unwrap());
        row.put("sampMatCode", Cell::new("A0B9Z", "Milk")).unwrap();

        let mut engine = FormulaEngine::new(&mut resolver);
        assert!(engine.resolve_row(&mut row).is_empty());
        let once = row.to_record();
        assert!(engine.resolve_row(&mut row).is_empty());
        assert_eq!(row.to_record(), once);
    }

    #[test]
    fn test_self_reference_is_unresolved() {
        let def = CatalogDef::default().schema(
            SchemaDef::new("t")
                .column(Column::new("loop", ColumnType::Formula).with_code_formula("%loop.code"))
                .column(Column::new("after", ColumnType::Formula).with_code_formula("%loop.code")),
        );
        let catalog = Catalog::build(def).unwrap();
        let store = MemoryStore::new();
        let mut resolver = RelationResolver::new(&catalog, &store);
        let mut row = Row::new(catalog.schema("t").unwrap());

        let errors = FormulaEngine::new(&mut resolver).resolve_row(&mut row);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e.source, FormulaError::Unresolved { .. })));
        assert_eq!(row.code("loop"), None);
    }

    #[test]
    fn test_unknown_column_everywhere() {
        let def = CatalogDef::default().schema(
            SchemaDef::new("t").column(Column::new("x", ColumnType::Formula).with_code_formula("%ghost.code")),
        );
        let catalog = Catalog::build(def).unwrap();
        let store = MemoryStore::new();
        let mut resolver = RelationResolver::new(&catalog, &store);
        let mut row = Row::new(catalog.schema("t").unwrap());

        let errors = FormulaEngine::new(&mut resolver).resolve_row(&mut row);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].source, FormulaError::UnknownColumn { .. }));
        assert_eq!(errors[0].column, "x");
    }

    #[test]
    fn test_refresh_column() {
        let catalog = single_table();
        let store = MemoryStore::new();
        let mut resolver = RelationResolver::new(&catalog, &store);
        let mut row = Row::new(catalog.schema("sample").unwrap());
        row.put("sampMatCode", Cell::new("A0B9Z", "Milk")).unwrap();

        let mut engine = FormulaEngine::new(&mut resolver);
        // chases through the empty "second" and "copyLabel" formulas
        engine.refresh_column(&mut row, "first").unwrap();
        assert_eq!(row.code("first"), Some("Milk"));
        assert_eq!(row.code("second"), None);

        assert!(engine.refresh_column(&mut row, "nope").is_err());
    }
}
