//! Rows: one record of a report table, bound to its schema.

use crate::formula::FormulaField;
use crate::schema::{foreign_key_name, Schema};
use collecta_ids::RowId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("Column '{column}' is not defined in schema '{schema}'")]
    UnknownColumn { schema: String, column: String },
}

/// Value of one column: the raw code plus its human-readable label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub label: String,
}

impl Cell {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }

    /// A plain value whose label is its code.
    pub fn plain(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            label: code.clone(),
            code,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.label.is_empty()
    }

    pub fn field(&self, field: FormulaField) -> &str {
        match field {
            FormulaField::Code => &self.code,
            FormulaField::Label => &self.label,
        }
    }

    fn field_mut(&mut self, field: FormulaField) -> &mut String {
        match field {
            FormulaField::Code => &mut self.code,
            FormulaField::Label => &mut self.label,
        }
    }
}

/// A record of one report table.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    id: RowId,
    version: Option<String>,
    cells: HashMap<String, Cell>,
}

impl Row {
    /// Empty, unpersisted row.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            id: RowId::UNSET,
            version: None,
            cells: HashMap::new(),
        }
    }

    /// Unpersisted row with every column default applied.
    pub fn with_defaults(schema: Arc<Schema>) -> Self {
        let cells = schema
            .ordered_columns()
            .iter()
            .filter_map(|column| {
                column
                    .default
                    .as_ref()
                    .map(|value| (column.id.clone(), Cell::plain(value.clone())))
            })
            .collect();
        Self {
            schema,
            id: RowId::UNSET,
            version: None,
            cells,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.name()
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn set_id(&mut self, id: RowId) {
        self.id = id;
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: Option<String>) {
        self.version = version;
    }

    fn check_column(&self, column: &str) -> Result<(), RowError> {
        if self.schema.has_column(column) {
            Ok(())
        } else {
            Err(RowError::UnknownColumn {
                schema: self.schema.name().to_string(),
                column: column.to_string(),
            })
        }
    }

    pub fn put(&mut self, column: &str, cell: Cell) -> Result<(), RowError> {
        self.check_column(column)?;
        self.cells.insert(column.to_string(), cell);
        Ok(())
    }

    /// Store a plain code (label mirrors the code).
    pub fn put_code(&mut self, column: &str, code: impl Into<String>) -> Result<(), RowError> {
        self.put(column, Cell::plain(code))
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn code(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(|cell| cell.code.as_str())
    }

    pub fn label(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(|cell| cell.label.as_str())
    }

    pub fn field(&self, column: &str, field: FormulaField) -> Option<&str> {
        self.cells.get(column).map(|cell| cell.field(field))
    }

    /// Overwrite one half of a cell, leaving the other untouched.
    pub fn set_field(
        &mut self,
        column: &str,
        field: FormulaField,
        value: impl Into<String>,
    ) -> Result<(), RowError> {
        self.check_column(column)?;
        *self
            .cells
            .entry(column.to_string())
            .or_default()
            .field_mut(field) = value.into();
        Ok(())
    }

    pub fn clear_field(&mut self, column: &str, field: FormulaField) {
        if let Some(cell) = self.cells.get_mut(column) {
            cell.field_mut(field).clear();
            if cell.is_empty() {
                self.cells.remove(column);
            }
        }
    }

    /// Identity of the parent row of table `parent`, read from the
    /// `<parent>Id` cell. Missing or non-numeric values yield `None`.
    pub fn parent_id(&self, parent: &str) -> Option<RowId> {
        self.code(&foreign_key_name(parent))
            .and_then(|code| code.trim().parse::<RowId>().ok())
            .filter(|id| id.is_set())
    }

    pub fn set_parent_id(&mut self, parent: &str, id: RowId) -> Result<(), RowError> {
        self.put_code(&foreign_key_name(parent), id.to_string())
    }

    /// Populated cells in schema column order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.schema.ordered_columns().iter().filter_map(|column| {
            self.cells
                .get(&column.id)
                .map(|cell| (column.id.as_str(), cell))
        })
    }

    pub fn to_record(&self) -> RowRecord {
        RowRecord {
            id: self.id,
            version: self.version.clone(),
            cells: self
                .cells()
                .map(|(column, cell)| {
                    let value = if cell.label == cell.code {
                        CellValue::Code(cell.code.clone())
                    } else {
                        CellValue::Full(cell.clone())
                    };
                    (column.to_string(), value)
                })
                .collect(),
        }
    }

    pub fn from_record(schema: Arc<Schema>, record: RowRecord) -> Result<Self, RowError> {
        let mut row = Row::new(schema);
        row.id = record.id;
        row.version = record.version;
        for (column, value) in record.cells {
            let cell = match value {
                CellValue::Code(code) => Cell::plain(code),
                CellValue::Full(cell) => cell,
            };
            row.put(&column, cell)?;
        }
        Ok(row)
    }
}

/// Serialized row, as used by JSON data files and `collecta parse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRecord {
    #[serde(default)]
    pub id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub cells: BTreeMap<String, CellValue>,
}

/// A cell is either a bare code or a `{code, label}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Code(String),
    Full(Cell),
}
