//! Parent lookup with a single-slot cache per parent table.
//!
//! A [`RelationResolver`] lives for one export or parse pass. Siblings
//! under the same parent hit the cache; moving to another parent replaces
//! the slot immediately.

use crate::catalog::{Catalog, SchemaError};
use crate::row::Row;
use crate::schema::Relation;
use crate::storage::{DataAccess, StorageError};
use collecta_ids::RowId;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Parent row {table}#{id} not found")]
    ParentNotFound { table: String, id: RowId },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct CachedParent {
    id: RowId,
    row: Row,
}

/// Pass-scoped parent resolver.
pub struct RelationResolver<'a> {
    catalog: &'a Catalog,
    store: &'a dyn DataAccess,
    cache: HashMap<String, CachedParent>,
    fetches: usize,
    hits: usize,
}

impl<'a> RelationResolver<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a dyn DataAccess) -> Self {
        Self {
            catalog,
            store,
            cache: HashMap::new(),
            fetches: 0,
            hits: 0,
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Parent row of `relation.parent` with identity `parent_id`.
    ///
    /// Served from the table's slot only when the slot holds that same id;
    /// otherwise fetched from storage, replacing the slot.
    pub fn get_parent_value(
        &mut self,
        relation: &Relation,
        parent_id: RowId,
    ) -> Result<&Row, ResolveError> {
        let table = relation.parent.as_str();
        let hit = self
            .cache
            .get(table)
            .map_or(false, |slot| slot.id == parent_id);

        if hit {
            self.hits += 1;
        } else {
            self.cache.remove(table);
            let schema = self.catalog.schema(table)?;
            self.fetches += 1;
            debug!(table, id = %parent_id, "Fetching parent row");
            let row = self
                .store
                .get_by_id(&schema, parent_id)?
                .ok_or_else(|| ResolveError::ParentNotFound {
                    table: table.to_string(),
                    id: parent_id,
                })?;
            self.cache.insert(
                table.to_string(),
                CachedParent { id: parent_id, row },
            );
        }

        self.cache
            .get(table)
            .map(|slot| &slot.row)
            .ok_or_else(|| ResolveError::ParentNotFound {
                table: table.to_string(),
                id: parent_id,
            })
    }

    /// Copy the parent's identity into the child's foreign-key cell.
    ///
    /// Ancestor identities the parent carries are copied as well when the
    /// child declares the same foreign key. Without a declared relation
    /// between the two tables nothing is written and `false` is returned.
    pub fn inject_parent(parent: &Row, child: &mut Row) -> bool {
        let Some(relation) = child.schema().relation_to_parent(parent.table()).cloned() else {
            warn!(
                parent = parent.table(),
                child = child.table(),
                "No relation declared; parent not injected"
            );
            return false;
        };

        if let Err(err) = child.set_parent_id(&relation.parent, parent.id()) {
            warn!(error = %err, "Failed to inject parent identity");
            return false;
        }

        let ancestors: Vec<(String, RowId)> = parent
            .schema()
            .parents()
            .iter()
            .filter_map(|up| parent.parent_id(&up.parent).map(|id| (up.parent.clone(), id)))
            .collect();
        for (ancestor, id) in ancestors {
            if child.schema().has_column(&crate::schema::foreign_key_name(&ancestor))
                && child.parent_id(&ancestor).is_none()
            {
                if let Err(err) = child.set_parent_id(&ancestor, id) {
                    warn!(error = %err, ancestor = %ancestor, "Failed to inject ancestor identity");
                }
            }
        }
        true
    }

    /// Drop every slot. Call between independent passes sharing a resolver.
    pub fn empty_cache(&mut self) {
        self.cache.clear();
    }

    /// Invalidate the slot holding `row`, if any.
    pub fn row_updated(&mut self, row: &Row) {
        if self
            .cache
            .get(row.table())
            .map_or(false, |slot| slot.id == row.id())
        {
            self.cache.remove(row.table());
        }
    }

    /// Storage round trips so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }
}
