//! Report table schemas and the relations between them.

use crate::column::{Column, OutputPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the foreign-key column a child uses to point at `parent`.
pub fn foreign_key_name(parent: &str) -> String {
    format!("{}Id", parent)
}

/// Directed parent -> child edge between two schemas.
///
/// A direct relation is an immediate foreign-key edge. A transitive one
/// records that `parent` is an ancestor further up; the child may still
/// carry the ancestor's identity in its own foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub parent: String,
    pub child: String,
    #[serde(default = "default_direct")]
    pub direct: bool,
}

fn default_direct() -> bool {
    true
}

impl Relation {
    pub fn direct(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            direct: true,
        }
    }

    pub fn transitive(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            direct: false,
        }
    }

    pub fn foreign_key(&self) -> String {
        foreign_key_name(&self.parent)
    }
}

/// A report table definition.
///
/// Built and validated by [`crate::Catalog`]; shared as `Arc<Schema>`.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    children: Vec<Relation>,
    parents: Vec<Relation>,
    traversable: bool,
    generates_record: bool,
}

impl Schema {
    pub(crate) fn new(
        name: String,
        columns: Vec<Column>,
        traversable: bool,
        generates_record: bool,
    ) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.id.clone(), i))
            .collect();
        Self {
            name,
            columns,
            index,
            children: Vec::new(),
            parents: Vec::new(),
            traversable,
            generates_record,
        }
    }

    pub(crate) fn push_column(&mut self, column: Column) {
        self.index.insert(column.id.clone(), self.columns.len());
        self.columns.push(column);
    }

    pub(crate) fn add_child(&mut self, relation: Relation) {
        self.children.push(relation);
    }

    pub(crate) fn add_parent(&mut self, relation: Relation) {
        self.parents.push(relation);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.index.get(id).map(|&i| &self.columns[i])
    }

    pub fn has_column(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Columns in definition order (wire and display order).
    pub fn ordered_columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_with_output(&self, output: OutputPolicy) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(move |c| c.output == output)
    }

    pub fn formula_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.has_formula())
    }

    pub fn natural_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.natural_key)
    }

    pub fn direct_children(&self) -> impl Iterator<Item = &Relation> {
        self.children.iter().filter(|r| r.direct)
    }

    /// All incoming edges, direct and transitive.
    pub fn parents(&self) -> &[Relation] {
        &self.parents
    }

    pub fn direct_parents(&self) -> impl Iterator<Item = &Relation> {
        self.parents.iter().filter(|r| r.direct)
    }

    /// Edge from `parent` to this schema; a direct edge wins over a transitive one.
    pub fn relation_to_parent(&self, parent: &str) -> Option<&Relation> {
        self.parents
            .iter()
            .filter(|r| r.parent == parent)
            .max_by_key(|r| r.direct)
    }

    /// The exporter descends into rows of this table.
    pub fn is_traversable(&self) -> bool {
        self.traversable
    }

    /// Every visited row of this table emits one wire record.
    pub fn generates_record(&self) -> bool {
        self.generates_record
    }
}
