//! Column definitions.

use crate::formula::FormulaField;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a column.
///
/// Values always travel as raw codes; the type only informs presentation
/// and validation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Date,
    /// Code picked from an external list; the label carries its description
    Picklist,
    /// Computed from other columns
    Formula,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::Picklist => "picklist",
            ColumnType::Formula => "formula",
        };
        write!(f, "{}", name)
    }
}

/// Wire section a column is written to on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputPolicy {
    /// Never exported
    #[default]
    None,
    /// Written into every `result` record below this row
    Record,
    /// Overrides the header field named by the column id (root rows only)
    Header,
    /// Overrides the operation field named by the column id (root rows only)
    Operation,
}

/// A column of a report table. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Unique within its schema; also the wire tag name
    pub id: String,

    #[serde(rename = "type", default)]
    pub column_type: ColumnType,

    #[serde(default = "default_true")]
    pub editable: bool,

    #[serde(default = "default_true")]
    pub visible: bool,

    #[serde(default)]
    pub output: OutputPolicy,

    /// `%<columnId>.<code|label>` computing the code
    #[serde(default)]
    pub code_formula: Option<String>,

    /// `%<columnId>.<code|label>` computing the label
    #[serde(default)]
    pub label_formula: Option<String>,

    #[serde(default)]
    pub default: Option<String>,

    /// Part of the row's natural key (used to match rows across versions)
    #[serde(default)]
    pub natural_key: bool,
}

fn default_true() -> bool {
    true
}

impl Column {
    pub fn new(id: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            column_type,
            editable: true,
            visible: true,
            output: OutputPolicy::None,
            code_formula: None,
            label_formula: None,
            default: None,
            natural_key: false,
        }
    }

    /// Hidden, read-only column holding a parent's identity.
    pub fn foreign_key(parent: &str) -> Self {
        Self {
            editable: false,
            visible: false,
            ..Self::new(crate::schema::foreign_key_name(parent), ColumnType::Number)
        }
    }

    pub fn with_output(mut self, output: OutputPolicy) -> Self {
        self.output = output;
        self
    }

    pub fn with_code_formula(mut self, formula: impl Into<String>) -> Self {
        self.code_formula = Some(formula.into());
        self.editable = false;
        self
    }

    pub fn with_label_formula(mut self, formula: impl Into<String>) -> Self {
        self.label_formula = Some(formula.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn as_natural_key(mut self) -> Self {
        self.natural_key = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn has_formula(&self) -> bool {
        self.code_formula.is_some() || self.label_formula.is_some()
    }

    /// Formula computing the given part of the cell.
    pub fn formula_for(&self, field: FormulaField) -> Option<&str> {
        match field {
            FormulaField::Code => self.code_formula.as_deref(),
            FormulaField::Label => self.label_formula.as_deref(),
        }
    }

    pub fn is_exported(&self) -> bool {
        self.output != OutputPolicy::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_defaults_from_toml() {
        let column: Column = toml::from_str(r#"id = "sampCountry""#).unwrap();
        assert_eq!(column.column_type, ColumnType::String);
        assert!(column.editable);
        assert!(column.visible);
        assert_eq!(column.output, OutputPolicy::None);
        assert!(!column.has_formula());
    }

    #[test]
    fn test_column_full_toml() {
        let column: Column = toml::from_str(
            r#"
            id = "reportYear"
            type = "formula"
            output = "record"
            code_formula = "%year.code"
            natural_key = true
            "#,
        )
        .unwrap();
        assert_eq!(column.column_type, ColumnType::Formula);
        assert_eq!(column.output, OutputPolicy::Record);
        assert_eq!(column.formula_for(FormulaField::Code), Some("%year.code"));
        assert_eq!(column.formula_for(FormulaField::Label), None);
        assert!(column.natural_key);
    }

    #[test]
    fn test_foreign_key_column() {
        let fk = Column::foreign_key("report");
        assert_eq!(fk.id, "reportId");
        assert!(!fk.editable);
        assert!(!fk.visible);
        assert!(!fk.is_exported());
    }
}
