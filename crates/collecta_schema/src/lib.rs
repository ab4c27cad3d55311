//! Relational report model.
//!
//! - [`Catalog`]: every [`Schema`] of one configuration, validated at load
//! - [`Row`]: one record of a table
//! - [`FormulaEngine`]: computes formula columns, including across parents
//! - [`DataAccess`]: storage contract, with [`MemoryStore`] for files and tests
//! - [`RelationResolver`]: pass-scoped parent lookup with a single-slot cache

pub mod catalog;
pub mod column;
pub mod formula;
pub mod resolver;
pub mod row;
pub mod schema;
pub mod storage;

pub use catalog::{Catalog, CatalogDef, SchemaDef, SchemaError};
pub use column::{Column, ColumnType, OutputPolicy};
pub use formula::{ColumnFormulaError, Formula, FormulaEngine, FormulaError, FormulaField, FormulaValue};
pub use resolver::{RelationResolver, ResolveError};
pub use row::{Cell, CellValue, Row, RowError, RowRecord};
pub use schema::{foreign_key_name, Relation, Schema};
pub use storage::{DataAccess, MemoryStore, StorageError};
