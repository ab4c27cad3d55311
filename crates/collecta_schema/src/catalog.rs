//! Schema catalog: every table of one configuration, validated once.
//!
//! The catalog is an explicit value handed to each pass (usually behind an
//! `Arc`). Loading fails on any configuration defect; nothing is patched up
//! silently.

use crate::column::{Column, OutputPolicy};
use crate::formula::Formula;
use crate::schema::{Relation, Schema};
use collecta_protocol::{HeaderField, OperationField};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Configuration defects. Always fatal; never retried.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Duplicate schema name: {0}")]
    DuplicateSchema(String),

    #[error("Duplicate column '{column}' in schema '{schema}'")]
    DuplicateColumn { schema: String, column: String },

    #[error("Schema '{0}' cannot be its own direct child")]
    SelfRelation(String),

    #[error("More than one direct relation {parent} -> {child}")]
    DuplicateRelation { parent: String, child: String },

    #[error("Direct relations form a cycle: {}", .0.join(" -> "))]
    RelationCycle(Vec<String>),

    #[error("Column '{column}' of '{schema}' is routed to the {section} block but is not a {section} field")]
    UnknownEnvelopeField {
        schema: String,
        column: String,
        section: &'static str,
    },

    #[error("Invalid formula on {schema}.{column}: {reason}")]
    InvalidFormula {
        schema: String,
        column: String,
        reason: String,
    },

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog definition: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for SchemaError {
    fn from(err: toml::de::Error) -> Self {
        SchemaError::Parse(err.to_string())
    }
}

/// Serialized form of one schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDef {
    pub name: String,
    #[serde(default)]
    pub traversable: bool,
    #[serde(default)]
    pub generates_record: bool,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl SchemaDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traversable: false,
            generates_record: false,
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn traversable(mut self) -> Self {
        self.traversable = true;
        self
    }

    pub fn record(mut self) -> Self {
        self.generates_record = true;
        self
    }
}

/// Serialized form of a whole catalog (`[[schemas]]` + `[[relations]]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDef {
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl CatalogDef {
    pub fn schema(mut self, schema: SchemaDef) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }
}

/// All schemas of one configuration.
#[derive(Debug, Clone)]
pub struct Catalog {
    schemas: HashMap<String, Arc<Schema>>,
    order: Vec<String>,
}

impl Catalog {
    /// Validate a definition and build the catalog.
    pub fn build(def: CatalogDef) -> Result<Self, SchemaError> {
        let mut staged: HashMap<String, Schema> = HashMap::new();
        let mut order = Vec::new();

        for schema_def in def.schemas {
            if staged.contains_key(&schema_def.name) {
                return Err(SchemaError::DuplicateSchema(schema_def.name));
            }
            validate_columns(&schema_def)?;
            order.push(schema_def.name.clone());
            let schema = Schema::new(
                schema_def.name.clone(),
                schema_def.columns,
                schema_def.traversable,
                schema_def.generates_record,
            );
            staged.insert(schema_def.name, schema);
        }

        let mut seen_direct = HashSet::new();
        for relation in &def.relations {
            for end in [&relation.parent, &relation.child] {
                if !staged.contains_key(end) {
                    return Err(SchemaError::SchemaNotFound(end.clone()));
                }
            }
            if relation.direct {
                if relation.parent == relation.child {
                    return Err(SchemaError::SelfRelation(relation.parent.clone()));
                }
                if !seen_direct.insert((relation.parent.clone(), relation.child.clone())) {
                    return Err(SchemaError::DuplicateRelation {
                        parent: relation.parent.clone(),
                        child: relation.child.clone(),
                    });
                }
            }
        }
        check_cycles(&order, &def.relations)?;

        for relation in &def.relations {
            if let Some(parent) = staged.get_mut(&relation.parent) {
                parent.add_child(relation.clone());
            }
            if let Some(child) = staged.get_mut(&relation.child) {
                if !child.has_column(&relation.foreign_key()) {
                    child.push_column(Column::foreign_key(&relation.parent));
                }
                child.add_parent(relation.clone());
            }
        }

        debug!(
            schemas = order.len(),
            relations = def.relations.len(),
            "Catalog built"
        );

        Ok(Self {
            schemas: staged
                .into_iter()
                .map(|(name, schema)| (name, Arc::new(schema)))
                .collect(),
            order,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let def: CatalogDef = toml::from_str(content)?;
        Self::build(def)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Look up a schema by name. An unknown name is a configuration defect.
    pub fn schema(&self, name: &str) -> Result<Arc<Schema>, SchemaError> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::SchemaNotFound(name.to_string()))
    }

    /// Schemas in definition order.
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.order.iter().filter_map(|name| self.schemas.get(name))
    }

    /// Schemas without a direct parent (report roots).
    pub fn roots(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas().filter(|s| s.direct_parents().next().is_none())
    }

    /// Chain of direct relations leading from `start` up to the nearest
    /// ancestor schema declaring `column`, child-most edge first.
    ///
    /// Breadth-first, so the closest owner wins.
    pub fn path_to_ancestor_column(&self, start: &str, column: &str) -> Option<Vec<Relation>> {
        let mut queue: std::collections::VecDeque<(String, Vec<Relation>)> =
            std::collections::VecDeque::new();
        let mut visited = HashSet::new();
        queue.push_back((start.to_string(), Vec::new()));
        visited.insert(start.to_string());

        while let Some((name, path)) = queue.pop_front() {
            let schema = self.schemas.get(&name)?;
            for relation in schema.direct_parents() {
                if !visited.insert(relation.parent.clone()) {
                    continue;
                }
                let mut next = path.clone();
                next.push(relation.clone());
                match self.schemas.get(&relation.parent) {
                    Some(parent) if parent.has_column(column) => return Some(next),
                    Some(_) => queue.push_back((relation.parent.clone(), next)),
                    None => {}
                }
            }
        }
        None
    }
}

fn validate_columns(def: &SchemaDef) -> Result<(), SchemaError> {
    let mut ids = HashSet::new();
    for column in &def.columns {
        if !ids.insert(column.id.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                schema: def.name.clone(),
                column: column.id.clone(),
            });
        }

        let section_ok = match column.output {
            OutputPolicy::Header => column.id.parse::<HeaderField>().is_ok(),
            OutputPolicy::Operation => column.id.parse::<OperationField>().is_ok(),
            OutputPolicy::None | OutputPolicy::Record => true,
        };
        if !section_ok {
            return Err(SchemaError::UnknownEnvelopeField {
                schema: def.name.clone(),
                column: column.id.clone(),
                section: if column.output == OutputPolicy::Header {
                    "header"
                } else {
                    "operation"
                },
            });
        }

        for text in [&column.code_formula, &column.label_formula].into_iter().flatten() {
            Formula::compile(text).map_err(|e| SchemaError::InvalidFormula {
                schema: def.name.clone(),
                column: column.id.clone(),
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Reject cycles among direct relations (the exporter would never finish).
fn check_cycles(order: &[String], relations: &[Relation]) -> Result<(), SchemaError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for relation in relations.iter().filter(|r| r.direct) {
        children
            .entry(relation.parent.as_str())
            .or_default()
            .push(relation.child.as_str());
    }

    let mut marks: HashMap<&str, Mark> = order.iter().map(|n| (n.as_str(), Mark::Unvisited)).collect();
    for start in order {
        if marks.get(start.as_str()) != Some(&Mark::Unvisited) {
            continue;
        }
        // (node, next child index)
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        marks.insert(start.as_str(), Mark::InProgress);
        while let Some((node, idx)) = stack.pop() {
            let next = children.get(node).and_then(|c| c.get(idx)).copied();
            match next {
                Some(child) => {
                    stack.push((node, idx + 1));
                    match marks.get(child).copied().unwrap_or(Mark::Unvisited) {
                        Mark::InProgress => {
                            let mut cycle: Vec<String> =
                                stack.iter().map(|(n, _)| n.to_string()).collect();
                            let from = cycle.iter().position(|n| n == child).unwrap_or(0);
                            cycle.drain(..from);
                            cycle.push(child.to_string());
                            return Err(SchemaError::RelationCycle(cycle));
                        }
                        Mark::Unvisited => {
                            marks.insert(child, Mark::InProgress);
                            stack.push((child, 0));
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks.insert(node, Mark::Done);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    const CATALOG: &str = r#"
        [[schemas]]
        name = "report"
        traversable = true

        [[schemas.columns]]
        id = "reportYear"
        output = "record"

        [[schemas.columns]]
        id = "dcCode"
        output = "operation"

        [[schemas]]
        name = "sample"
        traversable = true
        generates_record = true

        [[schemas.columns]]
        id = "sampId"
        natural_key = true
        output = "record"

        [[schemas.columns]]
        id = "year"
        type = "formula"
        code_formula = "%reportYear.code"

        [[relations]]
        parent = "report"
        child = "sample"
    "#;

    #[test]
    fn test_load_from_toml() {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        let sample = catalog.schema("sample").unwrap();
        assert!(sample.generates_record());
        assert!(sample.is_traversable());
        // foreign key appended after declared columns
        let ids: Vec<_> = sample.ordered_columns().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["sampId", "year", "reportId"]);
        assert_eq!(sample.relation_to_parent("report").unwrap().child, "sample");

        let report = catalog.schema("report").unwrap();
        assert_eq!(report.direct_children().count(), 1);
        let roots: Vec<_> = catalog.roots().map(|s| s.name().to_string()).collect();
        assert_eq!(roots, vec!["report"]);
    }

    #[test]
    fn test_unknown_schema_is_fatal() {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        let err = catalog.schema("animal").unwrap_err();
        assert!(matches!(err, SchemaError::SchemaNotFound(name) if name == "animal"));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let def = CatalogDef::default().schema(
            SchemaDef::new("t")
                .column(Column::new("a", ColumnType::String))
                .column(Column::new("a", ColumnType::Number)),
        );
        let err = Catalog::build(def).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_self_relation_rejected() {
        let def = CatalogDef::default()
            .schema(SchemaDef::new("t"))
            .relation(Relation::direct("t", "t"));
        assert!(matches!(Catalog::build(def), Err(SchemaError::SelfRelation(_))));

        // A transitive self edge is not a direct cycle.
        let def = CatalogDef::default()
            .schema(SchemaDef::new("t"))
            .relation(Relation::transitive("t", "t"));
        assert!(Catalog::build(def).is_ok());
    }

    #[test]
    fn test_duplicate_direct_relation_rejected() {
        let def = CatalogDef::default()
            .schema(SchemaDef::new("a"))
            .schema(SchemaDef::new("b"))
            .relation(Relation::direct("a", "b"))
            .relation(Relation::direct("a", "b"));
        assert!(matches!(
            Catalog::build(def),
            Err(SchemaError::DuplicateRelation { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let def = CatalogDef::default()
            .schema(SchemaDef::new("a"))
            .schema(SchemaDef::new("b"))
            .schema(SchemaDef::new("c"))
            .relation(Relation::direct("a", "b"))
            .relation(Relation::direct("b", "c"))
            .relation(Relation::direct("c", "a"));
        match Catalog::build(def) {
            Err(SchemaError::RelationCycle(path)) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_relation_to_missing_schema() {
        let def = CatalogDef::default()
            .schema(SchemaDef::new("a"))
            .relation(Relation::direct("a", "ghost"));
        assert!(matches!(Catalog::build(def), Err(SchemaError::SchemaNotFound(n)) if n == "ghost"));
    }

    #[test]
    fn test_envelope_columns_validated() {
        let def = CatalogDef::default().schema(
            SchemaDef::new("report")
                .column(Column::new("senderId", ColumnType::String).with_output(OutputPolicy::Header)),
        );
        assert!(Catalog::build(def).is_ok());

        let def = CatalogDef::default().schema(
            SchemaDef::new("report")
                .column(Column::new("sender", ColumnType::String).with_output(OutputPolicy::Header)),
        );
        assert!(matches!(
            Catalog::build(def),
            Err(SchemaError::UnknownEnvelopeField { section: "header", .. })
        ));
    }

    #[test]
    fn test_bad_formula_rejected_at_load() {
        let def = CatalogDef::default().schema(
            SchemaDef::new("t").column(Column::new("a", ColumnType::Formula).with_code_formula("%a.b.code")),
        );
        assert!(matches!(Catalog::build(def), Err(SchemaError::InvalidFormula { .. })));
    }

    #[test]
    fn test_path_to_ancestor_column() {
        let def = CatalogDef::default()
            .schema(SchemaDef::new("dataset").column(Column::new("country", ColumnType::String)))
            .schema(SchemaDef::new("report"))
            .schema(SchemaDef::new("sample"))
            .relation(Relation::direct("dataset", "report"))
            .relation(Relation::direct("report", "sample"));
        let catalog = Catalog::build(def).unwrap();

        let path = catalog.path_to_ancestor_column("sample", "country").unwrap();
        let hops: Vec<_> = path.iter().map(|r| r.parent.as_str()).collect();
        assert_eq!(hops, vec!["report", "dataset"]);
        assert!(catalog.path_to_ancestor_column("sample", "nowhere").is_none());
    }
}
