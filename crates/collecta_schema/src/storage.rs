//! Storage contract and the in-memory store used by the CLI and tests.

use crate::catalog::{Catalog, SchemaError};
use crate::row::{Row, RowError, RowRecord};
use crate::schema::{foreign_key_name, Schema};
use collecta_ids::RowId;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Invalid data file: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to read data file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Persistent row storage.
///
/// Implementations use interior mutability so a store can be shared as
/// `Arc<dyn DataAccess>` with a worker thread.
pub trait DataAccess: Send + Sync {
    fn get_by_id(&self, schema: &Arc<Schema>, id: RowId) -> Result<Option<Row>, StorageError>;

    /// Rows of `schema` whose `<parent_table>Id` cell equals `parent_id`.
    fn get_by_parent_id(
        &self,
        schema: &Arc<Schema>,
        parent_table: &str,
        parent_id: RowId,
    ) -> Result<Vec<Row>, StorageError>;

    fn get_all(&self, schema: &Arc<Schema>) -> Result<Vec<Row>, StorageError>;

    /// Insert the row, assigning an identity when it has none.
    fn add(&self, row: &mut Row) -> Result<RowId, StorageError>;

    /// Replace a stored row. `false` when no row has that identity.
    fn update(&self, row: &Row) -> Result<bool, StorageError>;

    fn delete(&self, schema: &Schema, id: RowId) -> Result<bool, StorageError>;
}

#[derive(Default)]
struct Tables {
    rows: HashMap<String, BTreeMap<RowId, Row>>,
    next_id: i64,
}

/// Mutex-guarded in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON data file: `{ "<table>": [ { "id": 1, "cells": {...} } ] }`.
    pub fn from_json_str(catalog: &Catalog, content: &str) -> Result<Self, StorageError> {
        let tables: BTreeMap<String, Vec<RowRecord>> = serde_json::from_str(content)?;
        let store = Self::new();
        let mut count = 0usize;
        for (table, records) in tables {
            let schema = catalog.schema(&table)?;
            for record in records {
                let mut row = Row::from_record(schema.clone(), record)?;
                store.add(&mut row)?;
                count += 1;
            }
        }
        debug!(rows = count, "Loaded data file");
        Ok(store)
    }

    pub fn load_json(catalog: &Catalog, path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(catalog, &content)?;
        info!(path = %path.display(), "Data file loaded");
        Ok(store)
    }

    pub fn to_json_string(&self) -> Result<String, StorageError> {
        let tables = self.lock()?;
        let dump: BTreeMap<&str, Vec<RowRecord>> = tables
            .rows
            .iter()
            .map(|(table, rows)| (table.as_str(), rows.values().map(Row::to_record).collect()))
            .collect();
        Ok(serde_json::to_string_pretty(&dump)?)
    }

    /// Number of `get_by_id` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.rows.values().map(BTreeMap::len).sum()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl DataAccess for MemoryStore {
    fn get_by_id(&self, schema: &Arc<Schema>, id: RowId) -> Result<Option<Row>, StorageError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let tables = self.lock()?;
        Ok(tables
            .rows
            .get(schema.name())
            .and_then(|rows| rows.get(&id))
            .cloned())
    }

    fn get_by_parent_id(
        &self,
        schema: &Arc<Schema>,
        parent_table: &str,
        parent_id: RowId,
    ) -> Result<Vec<Row>, StorageError> {
        let fk = foreign_key_name(parent_table);
        let wanted = parent_id.to_string();
        let tables = self.lock()?;
        Ok(tables
            .rows
            .get(schema.name())
            .map(|rows| {
                rows.values()
                    .filter(|row| row.code(&fk).map(str::trim) == Some(wanted.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_all(&self, schema: &Arc<Schema>) -> Result<Vec<Row>, StorageError> {
        let tables = self.lock()?;
        Ok(tables
            .rows
            .get(schema.name())
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn add(&self, row: &mut Row) -> Result<RowId, StorageError> {
        let mut tables = self.lock()?;
        let id = if row.id().is_set() {
            row.id()
        } else {
            RowId::new(tables.next_id.max(1))
        };
        tables.next_id = tables.next_id.max(id.as_i64() + 1);
        row.set_id(id);
        tables
            .rows
            .entry(row.table().to_string())
            .or_default()
            .insert(id, row.clone());
        Ok(id)
    }

    fn update(&self, row: &Row) -> Result<bool, StorageError> {
        let mut tables = self.lock()?;
        match tables
            .rows
            .get_mut(row.table())
            .and_then(|rows| rows.get_mut(&row.id()))
        {
            Some(stored) => {
                *stored = row.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, schema: &Schema, id: RowId) -> Result<bool, StorageError> {
        let mut tables = self.lock()?;
        Ok(tables
            .rows
            .get_mut(schema.name())
            .and_then(|rows| rows.remove(&id))
            .is_some())
    }
}
