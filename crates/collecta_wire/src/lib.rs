//! Wire codec for Collecta report exchange.
//!
//! - [`ReportExporter`] writes a report tree as one XML message
//! - [`WireParser`] pulls records back out, one `result` at a time
//! - [`DatasetComparator`] diffs two dataset documents into amendments

pub mod comparator;
pub mod error;
pub mod export;
pub mod message;
pub mod parser;

pub use comparator::{comparison_parser, ComparisonAssembler, DatasetComparator, DatasetComparison, Fragment};
pub use error::{AssembleError, ExportError, MessageError, ParseError};
pub use export::{ExportSummary, ReportExporter, WireRecord};
pub use message::{MessageConfig, Operation};
pub use parser::{row_parser, CompositeField, ParserOptions, RecordAssembler, RowAssembler, WireParser};
