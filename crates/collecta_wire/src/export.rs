//! Report export: walks a row tree and streams the wire document.

use crate::error::ExportError;
use crate::message::{MessageConfig, Operation};
use chrono::Utc;
use collecta_ids::{MessageId, PassId};
use collecta_protocol::wire::{
    DATASET_TAG, HEADER_TAG, MESSAGE_TAG, OPERATION_TAG, PAYLOAD_TAG, RESULT_TAG,
};
use collecta_protocol::{HeaderField, OperationField};
use collecta_schema::{
    Catalog, ColumnFormulaError, DataAccess, FormulaEngine, OutputPolicy, RelationResolver, Row,
};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::HashSet;
use std::io::Write;
use tracing::{debug, info, info_span, warn};

/// One `result` element: `(columnId, code)` pairs in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireRecord {
    pub fields: Vec<(String, String)>,
}

impl WireRecord {
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of one export pass.
#[derive(Debug)]
pub struct ExportSummary {
    pub pass_id: PassId,
    pub message_id: MessageId,
    pub records: usize,
    pub rows_visited: usize,
    pub parent_fetches: usize,
    /// Columns omitted because their formula failed
    pub formula_errors: Vec<ColumnFormulaError>,
}

/// Streams report trees onto the wire.
pub struct ReportExporter<'a> {
    catalog: &'a Catalog,
    store: &'a dyn DataAccess,
    message: &'a MessageConfig,
}

struct Frame {
    row: Row,
    inherited: Vec<(String, String)>,
}

/// State of a single traversal: resolver, counters and collected errors.
struct Pass<'a> {
    catalog: &'a Catalog,
    store: &'a dyn DataAccess,
    resolver: RelationResolver<'a>,
    rows_visited: usize,
    records: usize,
    formula_errors: Vec<ColumnFormulaError>,
}

impl<'a> Pass<'a> {
    fn new(catalog: &'a Catalog, store: &'a dyn DataAccess) -> Self {
        Self {
            catalog,
            store,
            resolver: RelationResolver::new(catalog, store),
            rows_visited: 0,
            records: 0,
            formula_errors: Vec::new(),
        }
    }

    /// Refresh formulas; returns the columns that failed.
    fn refresh(&mut self, row: &mut Row) -> HashSet<String> {
        let errors = FormulaEngine::new(&mut self.resolver).resolve_row(row);
        let failed = errors.iter().map(|e| e.column.clone()).collect();
        for err in &errors {
            warn!(error = %err, "Formula failed; column omitted");
        }
        self.formula_errors.extend(errors);
        failed
    }

    /// Depth-first walk from an already refreshed root.
    fn walk<F>(&mut self, root: Row, root_failed: HashSet<String>, mut sink: F) -> Result<(), ExportError>
    where
        F: FnMut(&[(String, String)]) -> Result<(), ExportError>,
    {
        let mut stack = vec![Frame {
            row: root,
            inherited: Vec::new(),
        }];
        let mut pending_failed = Some(root_failed);

        while let Some(Frame { mut row, inherited }) = stack.pop() {
            let failed = match pending_failed.take() {
                Some(failed) => failed,
                None => self.refresh(&mut row),
            };
            self.rows_visited += 1;

            let schema = row.schema().clone();
            let own: Vec<(String, String)> = schema
                .columns_with_output(OutputPolicy::Record)
                .filter(|column| !failed.contains(&column.id))
                .map(|column| {
                    let code = row.code(&column.id).unwrap_or_default();
                    (column.id.clone(), code.to_string())
                })
                .collect();
            let mut fields: Vec<(String, String)> = inherited
                .into_iter()
                .filter(|(tag, _)| !own.iter().any(|(o, _)| o == tag))
                .collect();
            fields.extend(own);

            if schema.generates_record() {
                sink(&fields)?;
                self.records += 1;
            }

            for relation in schema.direct_children() {
                let child_schema = self.catalog.schema(&relation.child)?;
                if !child_schema.is_traversable() {
                    continue;
                }
                let children = self
                    .store
                    .get_by_parent_id(&child_schema, schema.name(), row.id())?;
                debug!(
                    parent = schema.name(),
                    child = %relation.child,
                    count = children.len(),
                    "Descending"
                );
                for mut child in children.into_iter().rev() {
                    RelationResolver::inject_parent(&row, &mut child);
                    stack.push(Frame {
                        row: child,
                        inherited: fields.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl<'a> ReportExporter<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a dyn DataAccess, message: &'a MessageConfig) -> Self {
        Self {
            catalog,
            store,
            message,
        }
    }

    /// Write the full message for the report rooted at `root`.
    pub fn export<W: Write>(
        &self,
        root: &Row,
        operation: &Operation,
        writer: W,
    ) -> Result<ExportSummary, ExportError> {
        self.message.validate()?;
        let pass_id = PassId::new();
        let message_id = MessageId::new();
        let span = info_span!("export", pass = %pass_id, table = root.table(), op = %operation.op_type);
        let _enter = span.enter();

        let mut pass = Pass::new(self.catalog, self.store);
        let mut root = root.clone();
        let root_failed = pass.refresh(&mut root);

        let mut header = self.message.header(&message_id, Utc::now());
        let mut op_fields = operation.fields();
        apply_root_overrides(&root, &root_failed, &mut header, &mut op_fields);

        let mut xml = Writer::new_with_indent(writer, b' ', 2);
        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        xml.write_event(Event::Start(BytesStart::new(MESSAGE_TAG)))?;

        xml.write_event(Event::Start(BytesStart::new(HEADER_TAG)))?;
        for (field, value) in &header {
            write_leaf(&mut xml, field.tag(), value)?;
        }
        xml.write_event(Event::End(BytesEnd::new(HEADER_TAG)))?;

        xml.write_event(Event::Start(BytesStart::new(PAYLOAD_TAG)))?;
        xml.write_event(Event::Start(BytesStart::new(OPERATION_TAG)))?;
        for (field, value) in &op_fields {
            write_leaf(&mut xml, field.tag(), value)?;
        }
        xml.write_event(Event::End(BytesEnd::new(OPERATION_TAG)))?;

        if operation.op_type.carries_dataset() {
            xml.write_event(Event::Start(BytesStart::new(DATASET_TAG)))?;
            pass.walk(root, root_failed, |fields| {
                xml.write_event(Event::Start(BytesStart::new(RESULT_TAG)))?;
                for (tag, value) in fields {
                    write_leaf(&mut xml, tag, value)?;
                }
                xml.write_event(Event::End(BytesEnd::new(RESULT_TAG)))?;
                Ok(())
            })?;
            xml.write_event(Event::End(BytesEnd::new(DATASET_TAG)))?;
        }

        xml.write_event(Event::End(BytesEnd::new(PAYLOAD_TAG)))?;
        xml.write_event(Event::End(BytesEnd::new(MESSAGE_TAG)))?;
        xml.into_inner().flush()?;

        let summary = ExportSummary {
            pass_id,
            message_id,
            records: pass.records,
            rows_visited: pass.rows_visited,
            parent_fetches: pass.resolver.fetches(),
            formula_errors: pass.formula_errors,
        };
        info!(
            records = summary.records,
            rows = summary.rows_visited,
            formula_errors = summary.formula_errors.len(),
            "Export complete"
        );
        Ok(summary)
    }

    /// The records `export` would write, without any XML.
    pub fn flatten(&self, root: &Row) -> Result<Vec<WireRecord>, ExportError> {
        let pass_id = PassId::new();
        let span = info_span!("flatten", pass = %pass_id, table = root.table());
        let _enter = span.enter();

        let mut pass = Pass::new(self.catalog, self.store);
        let mut root = root.clone();
        let root_failed = pass.refresh(&mut root);
        let mut records = Vec::new();
        pass.walk(root, root_failed, |fields| {
            records.push(WireRecord {
                fields: fields.to_vec(),
            });
            Ok(())
        })?;
        debug!(records = records.len(), "Flattened");
        Ok(records)
    }
}

/// Root `header`/`operation` columns replace the matching envelope values.
fn apply_root_overrides(
    root: &Row,
    failed: &HashSet<String>,
    header: &mut [(HeaderField, String)],
    operation: &mut Vec<(OperationField, String)>,
) {
    let schema = root.schema();
    for column in schema.columns_with_output(OutputPolicy::Header) {
        let (Ok(field), Some(code)) = (column.id.parse::<HeaderField>(), root.code(&column.id)) else {
            continue;
        };
        if failed.contains(&column.id) {
            continue;
        }
        if let Some(slot) = header.iter_mut().find(|(f, _)| *f == field) {
            slot.1 = code.to_string();
        }
    }
    for column in schema.columns_with_output(OutputPolicy::Operation) {
        let (Ok(field), Some(code)) = (column.id.parse::<OperationField>(), root.code(&column.id)) else {
            continue;
        };
        if failed.contains(&column.id) {
            continue;
        }
        match operation.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = code.to_string(),
            None => operation.push((field, code.to_string())),
        }
    }
    operation.sort_by_key(|(field, _)| *field);
}

fn write_leaf<W: Write>(xml: &mut Writer<W>, tag: &str, value: &str) -> Result<(), ExportError> {
    if value.is_empty() {
        xml.write_event(Event::Empty(BytesStart::new(tag)))?;
    } else {
        xml.write_event(Event::Start(BytesStart::new(tag)))?;
        xml.write_event(Event::Text(BytesText::new(value)))?;
        xml.write_event(Event::End(BytesEnd::new(tag)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use collecta_protocol::OperationType;
    use collecta_schema::{CatalogDef, Column, ColumnType, MemoryStore, Relation, SchemaDef};

    fn catalog() -> Catalog {
        Catalog::build(
            CatalogDef::default()
                .schema(
                    SchemaDef::new("report")
                        .traversable()
                        .column(Column::new("repYear", ColumnType::Number).with_output(OutputPolicy::Record))
                        .column(Column::new("dcCode", ColumnType::String).with_output(OutputPolicy::Operation))
                        .column(Column::new("note", ColumnType::String)),
                )
                .schema(
                    SchemaDef::new("sample")
                        .traversable()
                        .record()
                        .column(Column::new("sampId", ColumnType::String).with_output(OutputPolicy::Record))
                        .column(
                            Column::new("year", ColumnType::Formula)
                                .with_code_formula("%repYear.code")
                                .with_output(OutputPolicy::Record),
                        )
                        .column(
                            Column::new("broken", ColumnType::Formula)
                                .with_code_formula("%ghost.code")
                                .with_output(OutputPolicy::Record),
                        ),
                )
                .relation(Relation::direct("report", "sample")),
        )
        .unwrap()
    }

    fn seed(catalog: &Catalog) -> (MemoryStore, Row) {
        let store = MemoryStore::new();
        let mut report = Row::new(catalog.schema("report").unwrap());
        report.put_code("repYear", "2024").unwrap();
        report.put_code("dcCode", "DC_2024").unwrap();
        store.add(&mut report).unwrap();
        for id in ["S1", "S2"] {
            let mut sample = Row::new(catalog.schema("sample").unwrap());
            sample.put_code("sampId", id).unwrap();
            RelationResolver::inject_parent(&report, &mut sample);
            store.add(&mut sample).unwrap();
        }
        (store, report)
    }

    #[test]
    fn test_flatten_inherits_and_resolves() {
        let catalog = catalog();
        let (store, report) = seed(&catalog);
        let message = MessageConfig::new("S", "O");
        let exporter = ReportExporter::new(&catalog, &store, &message);

        let mut records = exporter.flatten(&report).unwrap();
        records.sort_by(|a, b| a.get("sampId").cmp(&b.get("sampId")));
        assert_eq!(records.len(), 2);
        let tags: Vec<_> = records[0].fields.iter().map(|(t, _)| t.as_str()).collect();
        // failed formula column omitted
        assert_eq!(tags, vec!["repYear", "sampId", "year"]);
        assert_eq!(records[0].get("year"), Some("2024"));
        assert_eq!(records[1].get("sampId"), Some("S2"));
    }

    #[test]
    fn test_export_writes_envelope() {
        let catalog = catalog();
        let (store, report) = seed(&catalog);
        let message = MessageConfig::new("SENDER", "ORG");
        let exporter = ReportExporter::new(&catalog, &store, &message);

        let mut out = Vec::new();
        let summary = exporter
            .export(&report, &Operation::new(OperationType::Insert).with_comment("first"), &mut out)
            .unwrap();
        let xml = String::from_utf8(out).unwrap();

        assert!(xml.contains("<senderId>SENDER</senderId>"));
        assert!(xml.contains(&format!("<messageId>{}</messageId>", summary.message_id)));
        assert!(xml.contains("<opType>Insert</opType>"));
        // root operation column overrides the envelope
        assert!(xml.contains("<dcCode>DC_2024</dcCode>"));
        assert!(xml.contains("<opCom>first</opCom>"));
        assert_eq!(xml.matches("<result>").count(), 2);
        assert!(!xml.contains("<broken"));

        assert_eq!(summary.records, 2);
        assert_eq!(summary.rows_visited, 3);
        assert_eq!(summary.formula_errors.len(), 2);
    }

    #[test]
    fn test_submit_carries_no_dataset() {
        let catalog = catalog();
        let (store, report) = seed(&catalog);
        let message = MessageConfig::new("SENDER", "ORG");
        let exporter = ReportExporter::new(&catalog, &store, &message);

        let mut out = Vec::new();
        let summary = exporter
            .export(&report, &Operation::new(OperationType::Submit), &mut out)
            .unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(!xml.contains("<dataset"));
        assert_eq!(summary.records, 0);
    }

    #[test]
    fn test_incomplete_message_config() {
        let catalog = catalog();
        let (store, report) = seed(&catalog);
        let message = MessageConfig::default();
        let exporter = ReportExporter::new(&catalog, &store, &message);
        let err = exporter
            .export(&report, &Operation::new(OperationType::Insert), Vec::<u8>::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::Message(_)));
    }
}
