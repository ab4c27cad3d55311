//! Codec errors.

use collecta_protocol::{HeaderField, VocabularyError};
use collecta_schema::{RowError, SchemaError, StorageError};
use thiserror::Error;

/// Problems with the `[message]` header configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error(transparent)]
    UnknownField(#[from] VocabularyError),

    #[error("Header field '{0}' is generated per message and cannot be configured")]
    GeneratedField(HeaderField),

    #[error("Header field '{0}' must be configured")]
    MissingField(HeaderField),
}

/// Failure writing a wire document. Formula failures are not here: they
/// only drop the affected column and are reported in the export summary.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("XML write failed: {0}")]
    Xml(String),

    #[error("Output write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ExportError {
    fn from(err: quick_xml::Error) -> Self {
        ExportError::Xml(err.to_string())
    }
}

/// A record-level problem raised by an assembler; the parser adds the
/// byte position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("Column '{column}' is not defined in schema '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Invalid value '{value}' for <{tag}>")]
    InvalidValue { tag: String, value: String },

    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
}

impl From<RowError> for AssembleError {
    fn from(err: RowError) -> Self {
        match err {
            RowError::UnknownColumn { schema, column } => AssembleError::UnknownColumn {
                table: schema,
                column,
            },
        }
    }
}

/// Failure reading a wire document. Aborts the pass; records already
/// returned stay valid.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("Invalid UTF-8 at byte {position}")]
    Encoding { position: u64 },

    #[error("Unexpected <{tag}> at byte {position}")]
    UnexpectedTag { tag: String, position: u64 },

    #[error("Unexpected text at byte {position}")]
    UnexpectedText { position: u64 },

    #[error("Document ended inside <{open}> at byte {position}")]
    UnexpectedEof { open: String, position: u64 },

    #[error("Column '{column}' is not defined in schema '{table}' (byte {position})")]
    UnknownColumn {
        table: String,
        column: String,
        position: u64,
    },

    #[error("Record at byte {position} has no row id")]
    MissingRowId { position: u64 },

    #[error("Row id '{row_id}' appears twice (byte {position})")]
    DuplicateRowId { row_id: String, position: u64 },

    #[error("{source} (byte {position})")]
    Record {
        position: u64,
        #[source]
        source: AssembleError,
    },
}

impl ParseError {
    pub fn position(&self) -> u64 {
        match self {
            ParseError::Xml { position, .. }
            | ParseError::Encoding { position }
            | ParseError::UnexpectedTag { position, .. }
            | ParseError::UnexpectedText { position }
            | ParseError::UnexpectedEof { position, .. }
            | ParseError::UnknownColumn { position, .. }
            | ParseError::MissingRowId { position }
            | ParseError::DuplicateRowId { position, .. }
            | ParseError::Record { position, .. } => *position,
        }
    }

    pub(crate) fn from_assemble(err: AssembleError, position: u64) -> Self {
        match err {
            AssembleError::UnknownColumn { table, column } => ParseError::UnknownColumn {
                table,
                column,
                position,
            },
            other => ParseError::Record {
                position,
                source: other,
            },
        }
    }
}
