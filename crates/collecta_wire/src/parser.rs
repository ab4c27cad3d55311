//! Pull parser for wire documents.
//!
//! The parser is a forward-only state machine over XML events:
//!
//! ```text
//! Start -> Message -> Header -> Message -> Payload -> Operation -> Payload
//!                                                  -> Dataset -> Result* -> Payload
//!       -> Message -> Done
//! ```
//!
//! Each `result` element is handed to a [`RecordAssembler`] field by field
//! and surfaces from [`WireParser::next_record`] once its end tag is read.

use crate::error::{AssembleError, ParseError};
use collecta_protocol::defaults::{DEFAULT_COMPOSITE_COLUMN, DEFAULT_COMPOSITE_TAG};
use collecta_protocol::wire::{
    DATASET_TAG, HEADER_TAG, MESSAGE_TAG, OPERATION_TAG, PAYLOAD_TAG, RESULT_TAG, VERSION_TAG,
};
use collecta_protocol::{HeaderField, OperationField, OperationType, VocabularyError};
use collecta_schema::{Row, Schema};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Arc;
use tracing::debug;

/// Builds one record from the fields of a `result` element.
pub trait RecordAssembler {
    type Record;

    /// A `result` element opened.
    fn begin_record(&mut self);

    /// A leaf of the open `result`.
    fn field(&mut self, tag: &str, text: &str) -> Result<(), AssembleError>;

    /// The `result` element closed.
    fn finish_record(&mut self) -> Result<Self::Record, AssembleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Message,
    Header,
    HeaderField(HeaderField),
    Payload,
    Operation,
    OperationField(OperationField),
    Dataset,
    Result,
    Field,
    Done,
    Failed,
}

impl State {
    fn open_tag(&self) -> &'static str {
        match self {
            State::Start | State::Done | State::Failed => "",
            State::Message => MESSAGE_TAG,
            State::Header => HEADER_TAG,
            State::HeaderField(field) => field.tag(),
            State::Payload => PAYLOAD_TAG,
            State::Operation => OPERATION_TAG,
            State::OperationField(field) => field.tag(),
            State::Dataset => DATASET_TAG,
            State::Result | State::Field => RESULT_TAG,
        }
    }
}

/// Streaming wire parser; one record per `next_record` call.
pub struct WireParser<R: BufRead, A: RecordAssembler> {
    reader: Reader<R>,
    assembler: A,
    state: State,
    buf: Vec<u8>,
    field_tag: String,
    text: String,
    header: BTreeMap<HeaderField, String>,
    operation: BTreeMap<OperationField, String>,
    records: usize,
}

enum Step<T> {
    Continue,
    Record(T),
    Finished,
}

impl<R: BufRead, A: RecordAssembler> WireParser<R, A> {
    pub fn new(input: R, assembler: A) -> Self {
        Self {
            reader: Reader::from_reader(input),
            assembler,
            state: State::Start,
            buf: Vec::new(),
            field_tag: String::new(),
            text: String::new(),
            header: BTreeMap::new(),
            operation: BTreeMap::new(),
            records: 0,
        }
    }

    /// Header values seen so far.
    pub fn header(&self) -> &BTreeMap<HeaderField, String> {
        &self.header
    }

    /// Operation values seen so far.
    pub fn operation(&self) -> &BTreeMap<OperationField, String> {
        &self.operation
    }

    pub fn operation_type(&self) -> Option<Result<OperationType, VocabularyError>> {
        self.operation
            .get(&OperationField::OpType)
            .map(|value| value.parse())
    }

    /// Byte offset of the reader.
    pub fn byte_position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Records returned so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Pull the next complete record; `Ok(None)` once the document ended.
    ///
    /// After an error the parser stays failed and yields nothing more.
    pub fn next_record(&mut self) -> Result<Option<A::Record>, ParseError> {
        if matches!(self.state, State::Done | State::Failed) {
            return Ok(None);
        }
        loop {
            match self.step() {
                Ok(Step::Continue) => continue,
                Ok(Step::Record(record)) => {
                    self.records += 1;
                    return Ok(Some(record));
                }
                Ok(Step::Finished) => {
                    debug!(records = self.records, "Wire document parsed");
                    return Ok(None);
                }
                Err(err) => {
                    self.state = State::Failed;
                    return Err(err);
                }
            }
        }
    }

    fn step(&mut self) -> Result<Step<A::Record>, ParseError> {
        self.buf.clear();
        let position = self.byte_position();
        let event = self
            .reader
            .read_event_into(&mut self.buf)
            .map_err(|err| ParseError::Xml {
                position,
                message: err.to_string(),
            })?;

        match event {
            Event::Start(start) => {
                let tag = utf8(start.name().as_ref(), position)?.to_string();
                self.open(&tag, position)?;
                Ok(Step::Continue)
            }
            Event::Empty(start) => {
                let tag = utf8(start.name().as_ref(), position)?.to_string();
                self.open(&tag, position)?;
                self.close(position)
            }
            Event::End(_) => self.close(position),
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|err| ParseError::Xml {
                        position,
                        message: err.to_string(),
                    })?
                    .into_owned();
                self.push_text(&text, position)?;
                Ok(Step::Continue)
            }
            Event::CData(data) => {
                let text = utf8(&data, position)?.to_string();
                self.push_text(&text, position)?;
                Ok(Step::Continue)
            }
            Event::Eof => {
                if self.state == State::Done {
                    Ok(Step::Finished)
                } else {
                    Err(ParseError::UnexpectedEof {
                        open: self.state.open_tag().to_string(),
                        position,
                    })
                }
            }
            // declaration, comments, processing instructions, doctype
            _ => Ok(Step::Continue),
        }
    }

    fn open(&mut self, tag: &str, position: u64) -> Result<(), ParseError> {
        let unexpected = || ParseError::UnexpectedTag {
            tag: tag.to_string(),
            position,
        };
        let envelope = |err: VocabularyError| ParseError::Record {
            position,
            source: AssembleError::Vocabulary(err),
        };

        self.state = match (self.state, tag) {
            (State::Start, MESSAGE_TAG) => State::Message,
            (State::Message, HEADER_TAG) => State::Header,
            (State::Message, PAYLOAD_TAG) => State::Payload,
            (State::Header, field) => State::HeaderField(field.parse().map_err(envelope)?),
            (State::Payload, OPERATION_TAG) => State::Operation,
            (State::Payload, DATASET_TAG) => State::Dataset,
            (State::Operation, field) => State::OperationField(field.parse().map_err(envelope)?),
            (State::Dataset, RESULT_TAG) => {
                self.assembler.begin_record();
                State::Result
            }
            (State::Result, field) => {
                self.field_tag = field.to_string();
                State::Field
            }
            _ => return Err(unexpected()),
        };
        self.text.clear();
        Ok(())
    }

    fn close(&mut self, position: u64) -> Result<Step<A::Record>, ParseError> {
        let text = std::mem::take(&mut self.text);
        let (next, step) = match self.state {
            State::HeaderField(field) => {
                self.header.insert(field, text);
                (State::Header, Step::Continue)
            }
            State::OperationField(field) => {
                self.operation.insert(field, text);
                (State::Operation, Step::Continue)
            }
            State::Field => {
                self.assembler
                    .field(&self.field_tag, &text)
                    .map_err(|err| ParseError::from_assemble(err, position))?;
                (State::Result, Step::Continue)
            }
            State::Result => {
                let record = self
                    .assembler
                    .finish_record()
                    .map_err(|err| ParseError::from_assemble(err, position))?;
                (State::Dataset, Step::Record(record))
            }
            State::Header | State::Payload => (State::Message, Step::Continue),
            State::Operation | State::Dataset => (State::Payload, Step::Continue),
            State::Message => (State::Done, Step::Continue),
            State::Start | State::Done | State::Failed => {
                return Err(ParseError::UnexpectedTag {
                    tag: "/".to_string(),
                    position,
                })
            }
        };
        self.state = next;
        Ok(step)
    }

    fn push_text(&mut self, text: &str, position: u64) -> Result<(), ParseError> {
        match self.state {
            State::HeaderField(_) | State::OperationField(_) | State::Field => {
                self.text.push_str(text);
                Ok(())
            }
            _ if text.trim().is_empty() => Ok(()),
            _ => Err(ParseError::UnexpectedText { position }),
        }
    }
}

impl<R: BufRead, A: RecordAssembler> Iterator for WireParser<R, A> {
    type Item = Result<A::Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn utf8(bytes: &[u8], position: u64) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding { position })
}

/// A `result` tag whose text is `key=value`; only the value is kept, under
/// a synthetic column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeField {
    pub tag: String,
    pub column: String,
}

impl Default for CompositeField {
    fn default() -> Self {
        Self {
            tag: DEFAULT_COMPOSITE_TAG.to_string(),
            column: DEFAULT_COMPOSITE_COLUMN.to_string(),
        }
    }
}

/// The `[parser]` configuration table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserOptions {
    #[serde(default)]
    pub composite: Option<CompositeField>,
}

impl ParserOptions {
    pub fn with_composite(tag: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            composite: Some(CompositeField {
                tag: tag.into(),
                column: column.into(),
            }),
        }
    }
}

/// Assembles `result` elements into [`Row`]s of one schema.
pub struct RowAssembler {
    schema: Arc<Schema>,
    options: ParserOptions,
    current: Option<Row>,
}

impl RowAssembler {
    pub fn new(schema: Arc<Schema>, options: ParserOptions) -> Self {
        Self {
            schema,
            options,
            current: None,
        }
    }
}

impl RecordAssembler for RowAssembler {
    type Record = Row;

    fn begin_record(&mut self) {
        self.current = Some(Row::new(self.schema.clone()));
    }

    fn field(&mut self, tag: &str, text: &str) -> Result<(), AssembleError> {
        let row = self.current.get_or_insert_with(|| Row::new(self.schema.clone()));

        if let Some(composite) = self.options.composite.as_ref().filter(|c| c.tag == tag) {
            let value = text.split_once('=').map_or(text, |(_, rhs)| rhs).trim();
            row.put_code(&composite.column, value)?;
            return Ok(());
        }
        if tag == VERSION_TAG && !self.schema.has_column(tag) {
            row.set_version(Some(text.to_string()));
            return Ok(());
        }
        row.put_code(tag, text)?;
        Ok(())
    }

    fn finish_record(&mut self) -> Result<Row, AssembleError> {
        Ok(self
            .current
            .take()
            .unwrap_or_else(|| Row::new(self.schema.clone())))
    }
}

/// Parser producing rows of `schema`.
pub fn row_parser<R: BufRead>(
    input: R,
    schema: Arc<Schema>,
    options: ParserOptions,
) -> WireParser<R, RowAssembler> {
    WireParser::new(input, RowAssembler::new(schema, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use collecta_schema::{Catalog, CatalogDef, Column, ColumnType, SchemaDef};

    fn schema() -> Arc<Schema> {
        Catalog::build(
            CatalogDef::default().schema(
                SchemaDef::new("sample")
                    .column(Column::new("sampId", ColumnType::String))
                    .column(Column::new("sampCountry", ColumnType::Picklist))
                    .column(Column::new("sampInfoValue", ColumnType::String)),
            ),
        )
        .unwrap()
        .schema("sample")
        .unwrap()
    }

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<message>
  <header>
    <messageId>m-1</messageId>
    <senderId>EFSA01</senderId>
  </header>
  <payload>
    <operation>
      <opType>Insert</opType>
      <dcCode>DC</dcCode>
    </operation>
    <dataset>
      <result>
        <sampId>S1</sampId>
        <sampCountry>IT</sampCountry>
        <sampInfo>lab=L&amp;1</sampInfo>
      </result>
      <result>
        <sampId>S2</sampId>
        <sampCountry/>
      </result>
    </dataset>
  </payload>
</message>
"#;

    #[test]
    fn test_pull_records_and_envelope() {
        let mut parser = row_parser(DOC.as_bytes(), schema(), ParserOptions::with_composite("sampInfo", "sampInfoValue"));

        let first = parser.next_record().unwrap().unwrap();
        assert_eq!(first.code("sampId"), Some("S1"));
        assert_eq!(first.code("sampInfoValue"), Some("L&1"));
        assert_eq!(parser.header().get(&HeaderField::SenderId).map(String::as_str), Some("EFSA01"));
        assert_eq!(parser.operation_type(), Some(Ok(OperationType::Insert)));

        let second = parser.next_record().unwrap().unwrap();
        assert_eq!(second.code("sampCountry"), Some(""));
        assert!(parser.next_record().unwrap().is_none());
        assert!(parser.next_record().unwrap().is_none());
        assert_eq!(parser.records(), 2);
        assert_eq!(parser.byte_position(), DOC.len() as u64);
    }

    #[test]
    fn test_unknown_column() {
        let doc = DOC.replace("sampCountry>IT", "sampColour>IT").replace("</sampCountry>\n        <sampInfo", "</sampColour>\n        <sampInfo");
        let results: Vec<_> = row_parser(doc.as_bytes(), schema(), ParserOptions::default()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0],
            Err(ParseError::UnknownColumn { column, .. }) if column == "sampColour"
        ));
    }

    #[test]
    fn test_unknown_header_field() {
        let doc = DOC.replace("senderId", "sender");
        let mut parser = row_parser(doc.as_bytes(), schema(), ParserOptions::default());
        let err = parser.next_record().unwrap_err();
        assert!(matches!(
            err,
            ParseError::Record {
                source: AssembleError::Vocabulary(VocabularyError::UnknownHeaderField(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_mismatched_end_tag() {
        let doc = DOC.replace("<sampId>S2</sampId>", "<sampId>S2</sampID>");
        let mut parser = row_parser(doc.as_bytes(), schema(), ParserOptions::with_composite("sampInfo", "sampInfoValue"));
        assert!(parser.next_record().unwrap().is_some());
        let err = parser.next_record().unwrap_err();
        assert!(matches!(err, ParseError::Xml { .. }));
        assert!(parser.next_record().unwrap().is_none());
    }

    #[test]
    fn test_truncated_document() {
        let cut = DOC.find("<sampId>S2").unwrap();
        let doc = &DOC[..cut];
        let results: Vec<_> =
            row_parser(doc.as_bytes(), schema(), ParserOptions::with_composite("sampInfo", "sampInfoValue")).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(&results[1], Err(ParseError::UnexpectedEof { open, .. }) if open == "result"));
    }

    #[test]
    fn test_text_outside_leaf() {
        let doc = DOC.replace("<dataset>", "<dataset>stray");
        let results: Vec<_> = row_parser(doc.as_bytes(), schema(), ParserOptions::default()).collect();
        assert!(matches!(results.last(), Some(Err(ParseError::UnexpectedText { .. }))));
    }
}
