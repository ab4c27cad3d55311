//! Formula resolution across parent rows, through a real catalog file and
//! the in-memory store.

use collecta_ids::RowId;
use collecta_schema::{
    Catalog, DataAccess, FormulaEngine, FormulaError, MemoryStore, RelationResolver, Row,
};
use std::fs;
use tempfile::TempDir;

const CATALOG: &str = r#"
[[schemas]]
name = "dataset"

[[schemas.columns]]
id = "country"
type = "picklist"

[[schemas]]
name = "report"
traversable = true

[[schemas.columns]]
id = "year"
type = "number"

[[schemas.columns]]
id = "originCountry"
type = "formula"
code_formula = "%country.code"
label_formula = "%country.label"

[[schemas]]
name = "sample"
traversable = true
generates_record = true

[[schemas.columns]]
id = "sampId"

[[schemas.columns]]
id = "sampYear"
type = "formula"
code_formula = "%year.code"

[[schemas.columns]]
id = "sampCountry"
type = "formula"
code_formula = "%originCountry.label"

[[relations]]
parent = "dataset"
child = "report"

[[relations]]
parent = "report"
child = "sample"
"#;

const DATA: &str = r#"{
    "dataset": [ { "id": 1, "cells": { "country": { "code": "IT", "label": "Italy" } } } ],
    "report": [
        { "id": 2, "cells": { "year": "2024", "datasetId": "1" } },
        { "id": 3, "cells": { "year": "2025", "datasetId": "1" } }
    ],
    "sample": [
        { "id": 10, "cells": { "sampId": "S1", "reportId": "2" } },
        { "id": 11, "cells": { "sampId": "S2", "reportId": "2" } },
        { "id": 12, "cells": { "sampId": "S3", "reportId": "2" } },
        { "id": 13, "cells": { "sampId": "S4", "reportId": "3" } }
    ]
}"#;

fn setup() -> (TempDir, Catalog, MemoryStore) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("collecta.toml");
    fs::write(&path, CATALOG).unwrap();
    let catalog = Catalog::load(&path).unwrap();
    let store = MemoryStore::from_json_str(&catalog, DATA).unwrap();
    (dir, catalog, store)
}

// =============================================================================
// Cross-row resolution
// =============================================================================

#[test]
fn test_sample_reads_report_and_dataset() {
    let (_dir, catalog, store) = setup();
    let samples = catalog.schema("sample").unwrap();
    let mut row = store.get_by_id(&samples, RowId::new(10)).unwrap().unwrap();

    let mut resolver = RelationResolver::new(&catalog, &store);
    let errors = FormulaEngine::new(&mut resolver).resolve_row(&mut row);
    assert!(errors.is_empty(), "{:?}", errors);

    assert_eq!(row.code("sampYear"), Some("2024"));
    // report.originCountry is an unset formula in storage; its label
    // formula is chased up to the dataset
    assert_eq!(row.code("sampCountry"), Some("Italy"));
}

#[test]
fn test_siblings_share_parent_fetches() {
    let (_dir, catalog, store) = setup();
    let samples = catalog.schema("sample").unwrap();
    let mut resolver = RelationResolver::new(&catalog, &store);

    let mut rows = store.get_all(&samples).unwrap();
    rows.sort_by_key(|r| r.id());
    for row in rows.iter_mut().take(3) {
        let errors = FormulaEngine::new(&mut resolver).resolve_row(row);
        assert!(errors.is_empty());
    }
    // one report and one dataset fetch serve all three siblings
    assert_eq!(resolver.fetches(), 2);

    // moving to a sample of another report refetches only the report
    let errors = FormulaEngine::new(&mut resolver).resolve_row(&mut rows[3]);
    assert!(errors.is_empty());
    assert_eq!(rows[3].code("sampYear"), Some("2025"));
    assert_eq!(resolver.fetches(), 3);
}

#[test]
fn test_missing_parent_is_scoped_to_column() {
    let (_dir, catalog, store) = setup();
    let mut orphan = Row::new(catalog.schema("sample").unwrap());
    orphan.put_code("sampId", "ORPHAN").unwrap();

    let mut resolver = RelationResolver::new(&catalog, &store);
    let errors = FormulaEngine::new(&mut resolver).resolve_row(&mut orphan);

    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e.source, FormulaError::MissingParent { .. })));
    assert_eq!(orphan.code("sampId"), Some("ORPHAN"));
    assert_eq!(orphan.code("sampYear"), None);
}

#[test]
fn test_dangling_parent_reference() {
    let (_dir, catalog, store) = setup();
    let mut row = Row::new(catalog.schema("sample").unwrap());
    row.set_parent_id("report", RowId::new(404)).unwrap();

    let mut resolver = RelationResolver::new(&catalog, &store);
    let errors = FormulaEngine::new(&mut resolver).resolve_row(&mut row);
    assert!(errors
        .iter()
        .all(|e| matches!(e.source, FormulaError::Lookup(_))));
}
