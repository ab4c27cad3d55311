//! Wire vocabulary for the report exchange envelope.
//!
//! ```text
//! <message>
//!   <header> messageId senderId senderOrg created protocolVersion </header>
//!   <payload>
//!     <operation> opType dcCode opCom </operation>
//!     <dataset>
//!       <result> <columnId>code</columnId> ... </result>
//!       ...
//!     </dataset>
//!   </payload>
//! </message>
//! ```
//!
//! Envelope tag names map onto closed field kinds. Unknown names are
//! rejected rather than ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MESSAGE_TAG: &str = "message";
pub const HEADER_TAG: &str = "header";
pub const PAYLOAD_TAG: &str = "payload";
pub const OPERATION_TAG: &str = "operation";
pub const DATASET_TAG: &str = "dataset";
pub const RESULT_TAG: &str = "result";

/// Row identity inside an amendment `result`.
pub const ROW_ID_TAG: &str = "recordId";
/// Row was nullified by the amendment.
pub const NULLIFIED_TAG: &str = "nullified";
/// Amendment type code (see [`AmendmentType`]).
pub const AMENDMENT_TYPE_TAG: &str = "amType";
/// Dataset version the row was captured at, e.g. `IT-2024-0042.03`.
pub const VERSION_TAG: &str = "datasetVersion";

/// Error for unrecognised envelope vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VocabularyError {
    #[error("Unknown header field: '{0}'")]
    UnknownHeaderField(String),

    #[error("Unknown operation field: '{0}'")]
    UnknownOperationField(String),

    #[error("Unknown operation type: '{0}'")]
    UnknownOperationType(String),

    #[error("Unknown amendment type code: '{0}'")]
    UnknownAmendmentType(String),
}

/// Fields of the `header` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeaderField {
    MessageId,
    SenderId,
    SenderOrg,
    Created,
    ProtocolVersion,
}

impl HeaderField {
    /// Emission order.
    pub const ALL: [HeaderField; 5] = [
        HeaderField::MessageId,
        HeaderField::SenderId,
        HeaderField::SenderOrg,
        HeaderField::Created,
        HeaderField::ProtocolVersion,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            HeaderField::MessageId => "messageId",
            HeaderField::SenderId => "senderId",
            HeaderField::SenderOrg => "senderOrg",
            HeaderField::Created => "created",
            HeaderField::ProtocolVersion => "protocolVersion",
        }
    }

    /// Filled in per message rather than taken from configuration.
    pub fn is_generated(&self) -> bool {
        matches!(self, HeaderField::MessageId | HeaderField::Created)
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for HeaderField {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeaderField::ALL
            .iter()
            .copied()
            .find(|field| field.tag() == s)
            .ok_or_else(|| VocabularyError::UnknownHeaderField(s.to_string()))
    }
}

/// Fields of the `operation` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationField {
    /// Action type (see [`OperationType`])
    OpType,
    /// Target data collection
    DataCollection,
    /// Free-text comment
    Comment,
}

impl OperationField {
    pub const ALL: [OperationField; 3] = [
        OperationField::OpType,
        OperationField::DataCollection,
        OperationField::Comment,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            OperationField::OpType => "opType",
            OperationField::DataCollection => "dcCode",
            OperationField::Comment => "opCom",
        }
    }
}

impl fmt::Display for OperationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for OperationField {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationField::ALL
            .iter()
            .copied()
            .find(|field| field.tag() == s)
            .ok_or_else(|| VocabularyError::UnknownOperationField(s.to_string()))
    }
}

/// Action carried in `opType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Insert,
    Replace,
    Reject,
    Submit,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "Insert",
            OperationType::Replace => "Replace",
            OperationType::Reject => "Reject",
            OperationType::Submit => "Submit",
        }
    }

    /// Status a report moves to once the transport accepted the message.
    pub fn in_flight_status(&self) -> crate::DatasetStatus {
        match self {
            OperationType::Insert | OperationType::Replace => crate::DatasetStatus::Uploaded,
            OperationType::Submit => crate::DatasetStatus::SubmissionSent,
            OperationType::Reject => crate::DatasetStatus::RejectionSent,
        }
    }

    /// Whether the message carries the dataset rows.
    pub fn carries_dataset(&self) -> bool {
        matches!(self, OperationType::Insert | OperationType::Replace)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insert" => Ok(OperationType::Insert),
            "replace" => Ok(OperationType::Replace),
            "reject" => Ok(OperationType::Reject),
            "submit" => Ok(OperationType::Submit),
            _ => Err(VocabularyError::UnknownOperationType(s.to_string())),
        }
    }
}

/// Per-row amendment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmendmentType {
    Added,
    Modified,
    Deleted,
}

impl AmendmentType {
    pub fn code(&self) -> &'static str {
        match self {
            AmendmentType::Added => "A",
            AmendmentType::Modified => "M",
            AmendmentType::Deleted => "D",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AmendmentType::Added => "ADDED",
            AmendmentType::Modified => "MODIFIED",
            AmendmentType::Deleted => "DELETED",
        }
    }

    /// Map a wire code. An empty code means "unchanged".
    pub fn from_code(code: &str) -> Result<Option<AmendmentType>, VocabularyError> {
        match code.trim() {
            "" => Ok(None),
            "A" => Ok(Some(AmendmentType::Added)),
            "M" => Ok(Some(AmendmentType::Modified)),
            "D" => Ok(Some(AmendmentType::Deleted)),
            other => Err(VocabularyError::UnknownAmendmentType(other.to_string())),
        }
    }
}

impl fmt::Display for AmendmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Compiled once; the pattern is a literal.
static VERSION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(\d{2})$").expect("version suffix pattern"));

/// Extract the two-digit version suffix from a dataset version string.
///
/// `"IT-2024-0042.03"` yields `Some("03")`; text without a trailing `.NN`
/// yields `None`.
pub fn version_suffix(text: &str) -> Option<String> {
    VERSION_SUFFIX
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
