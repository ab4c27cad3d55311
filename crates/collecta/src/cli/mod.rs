//! CLI commands for the `collecta` binary.

pub mod check_config;
pub mod compare;
pub mod error;
pub mod export;
pub mod output;
pub mod parse;
pub mod status;

use collecta::AppConfig;
use collecta_schema::{Catalog, Schema};
use error::HelpfulError;
use std::path::Path;
use std::sync::Arc;

/// Load the configuration file and build its catalog.
pub fn load_config(path: &Path) -> Result<(AppConfig, Catalog), HelpfulError> {
    let config = AppConfig::load(path).map_err(|e| HelpfulError::invalid_config(path, &e))?;
    let catalog = config
        .catalog()
        .map_err(|e| HelpfulError::invalid_config(path, &e))?;
    Ok((config, catalog))
}

/// Look up a table, listing the declared ones when it is missing.
pub fn schema_for(catalog: &Catalog, table: &str) -> Result<Arc<Schema>, HelpfulError> {
    catalog.schema(table).map_err(|_| {
        let known: Vec<String> = catalog.schemas().map(|s| s.name().to_string()).collect();
        HelpfulError::unknown_table(table, &known)
    })
}
