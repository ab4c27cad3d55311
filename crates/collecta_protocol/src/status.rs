//! Dataset status machine.
//!
//! A report and its remote dataset each carry exactly one [`DatasetStatus`].
//! Legal operations are expressed as capability predicates rather than a
//! transition table: several states share the same outgoing capability, and
//! the workflow layer only ever asks "may I do X now?".
//!
//! The remote authority speaks its own, smaller vocabulary
//! ([`RemoteStatus`]); [`DatasetStatus::from_remote`] translates it.
//! User-facing labels are deliberately absent here.

use crate::wire::OperationType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by status parsing and gating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("Missing remote status")]
    MissingRemoteStatus,

    #[error("Unknown remote status: '{0}'")]
    UnknownRemoteStatus(String),

    #[error("Unknown dataset status: '{0}'")]
    UnknownStatus(String),

    #[error("Action '{action}' is not permitted while the dataset is {status}")]
    NotPermitted {
        status: DatasetStatus,
        action: ReportAction,
    },
}

/// Lifecycle state of a report / remote dataset.
///
/// This is the CANONICAL definition. Local-only states never come back from
/// the authority: they describe what this side has done (or failed to do).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetStatus {
    /// Created locally, never validated
    #[default]
    Draft,
    /// Passed local checks, not yet sent
    LocallyValidated,
    /// Payload handed to the transport, waiting for an acknowledgement
    Uploaded,
    /// Transport rejected the upload
    UploadFailed,
    /// Authority is still validating the dataset
    Processing,
    Valid,
    ValidWithWarnings,
    /// Rejected by the authority, may be corrected and re-sent
    RejectedEditable,
    Rejected,
    SubmissionSent,
    SubmissionFailed,
    Submitted,
    RejectionSent,
    RejectionFailed,
    /// Accepted into the authority's warehouse
    Accepted,
    Deleted,
    /// Remote status outside the published vocabulary
    Other,
}

impl DatasetStatus {
    pub const ALL: [DatasetStatus; 17] = [
        DatasetStatus::Draft,
        DatasetStatus::LocallyValidated,
        DatasetStatus::Uploaded,
        DatasetStatus::UploadFailed,
        DatasetStatus::Processing,
        DatasetStatus::Valid,
        DatasetStatus::ValidWithWarnings,
        DatasetStatus::RejectedEditable,
        DatasetStatus::Rejected,
        DatasetStatus::SubmissionSent,
        DatasetStatus::SubmissionFailed,
        DatasetStatus::Submitted,
        DatasetStatus::RejectionSent,
        DatasetStatus::RejectionFailed,
        DatasetStatus::Accepted,
        DatasetStatus::Deleted,
        DatasetStatus::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Draft => "DRAFT",
            DatasetStatus::LocallyValidated => "LOCALLY_VALIDATED",
            DatasetStatus::Uploaded => "UPLOADED",
            DatasetStatus::UploadFailed => "UPLOAD_FAILED",
            DatasetStatus::Processing => "PROCESSING",
            DatasetStatus::Valid => "VALID",
            DatasetStatus::ValidWithWarnings => "VALID_WITH_WARNINGS",
            DatasetStatus::RejectedEditable => "REJECTED_EDITABLE",
            DatasetStatus::Rejected => "REJECTED",
            DatasetStatus::SubmissionSent => "SUBMISSION_SENT",
            DatasetStatus::SubmissionFailed => "SUBMISSION_FAILED",
            DatasetStatus::Submitted => "SUBMITTED",
            DatasetStatus::RejectionSent => "REJECTION_SENT",
            DatasetStatus::RejectionFailed => "REJECTION_FAILED",
            DatasetStatus::Accepted => "ACCEPTED",
            DatasetStatus::Deleted => "DELETED",
            DatasetStatus::Other => "OTHER",
        }
    }

    /// Local rows of the report may be changed.
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Draft | DatasetStatus::LocallyValidated | DatasetStatus::UploadFailed
        )
    }

    /// The report may be exported and uploaded (insert or replace).
    pub fn can_be_sent(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Draft | DatasetStatus::LocallyValidated | DatasetStatus::UploadFailed
        )
    }

    pub fn can_be_made_editable(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Valid
                | DatasetStatus::ValidWithWarnings
                | DatasetStatus::RejectedEditable
                | DatasetStatus::Rejected
                | DatasetStatus::Deleted
        )
    }

    pub fn can_be_rejected(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Valid | DatasetStatus::ValidWithWarnings | DatasetStatus::RejectionFailed
        )
    }

    pub fn can_be_submitted(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Valid
                | DatasetStatus::ValidWithWarnings
                | DatasetStatus::SubmissionFailed
        )
    }

    /// An amended version may be compared against this dataset.
    pub fn can_be_amended(&self) -> bool {
        matches!(self, DatasetStatus::Accepted)
    }

    /// An acknowledgement is pending for the last operation.
    pub fn can_get_ack(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Uploaded | DatasetStatus::SubmissionSent | DatasetStatus::RejectionSent
        )
    }

    pub fn can_be_refreshed(&self) -> bool {
        self.exists_remotely() || matches!(self, DatasetStatus::Uploaded)
    }

    pub fn exists_remotely(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Processing
                | DatasetStatus::Valid
                | DatasetStatus::ValidWithWarnings
                | DatasetStatus::RejectedEditable
                | DatasetStatus::Rejected
                | DatasetStatus::SubmissionSent
                | DatasetStatus::SubmissionFailed
                | DatasetStatus::Submitted
                | DatasetStatus::RejectionSent
                | DatasetStatus::RejectionFailed
                | DatasetStatus::Accepted
                | DatasetStatus::Other
        )
    }

    /// Failure counterpart of an in-flight state.
    ///
    /// Only the three "sent, awaiting answer" states have one.
    pub fn failed_version_of(status: DatasetStatus) -> Option<DatasetStatus> {
        match status {
            DatasetStatus::Uploaded => Some(DatasetStatus::UploadFailed),
            DatasetStatus::SubmissionSent => Some(DatasetStatus::SubmissionFailed),
            DatasetStatus::RejectionSent => Some(DatasetStatus::RejectionFailed),
            _ => None,
        }
    }

    /// Translate the authority's status into the local vocabulary.
    pub fn from_remote(remote: RemoteStatus) -> DatasetStatus {
        match remote {
            RemoteStatus::AcceptedDwh => DatasetStatus::Accepted,
            RemoteStatus::Deleted => DatasetStatus::Deleted,
            RemoteStatus::Processing => DatasetStatus::Processing,
            RemoteStatus::Rejected => DatasetStatus::Rejected,
            RemoteStatus::RejectedEditable => DatasetStatus::RejectedEditable,
            RemoteStatus::Submitted => DatasetStatus::Submitted,
            RemoteStatus::Valid => DatasetStatus::Valid,
            RemoteStatus::ValidWithWarnings => DatasetStatus::ValidWithWarnings,
            RemoteStatus::Other => DatasetStatus::Other,
        }
    }

    /// Parse a raw remote code and translate it in one step.
    pub fn from_remote_code(code: Option<&str>) -> Result<DatasetStatus, StatusError> {
        let code = code.ok_or(StatusError::MissingRemoteStatus)?;
        Ok(Self::from_remote(code.parse()?))
    }

    pub fn permits(&self, action: ReportAction) -> bool {
        match action {
            ReportAction::Send(OperationType::Insert) | ReportAction::Send(OperationType::Replace) => {
                self.can_be_sent()
            }
            ReportAction::Send(OperationType::Submit) => self.can_be_submitted(),
            ReportAction::Send(OperationType::Reject) => self.can_be_rejected(),
            ReportAction::Compare => self.can_be_amended(),
            ReportAction::Refresh => self.can_be_refreshed(),
            ReportAction::MakeEditable => self.can_be_made_editable(),
            ReportAction::GetAck => self.can_get_ack(),
        }
    }

    pub fn ensure_permitted(&self, action: ReportAction) -> Result<(), StatusError> {
        if self.permits(action) {
            Ok(())
        } else {
            Err(StatusError::NotPermitted {
                status: *self,
                action,
            })
        }
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatasetStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace(['-', ' '], "_");
        DatasetStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| StatusError::UnknownStatus(s.to_string()))
    }
}

/// Status vocabulary used by the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    AcceptedDwh,
    Deleted,
    /// Catch-all the authority uses for codes outside its published set
    Other,
    Processing,
    Rejected,
    RejectedEditable,
    Submitted,
    Valid,
    ValidWithWarnings,
}

impl RemoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::AcceptedDwh => "ACCEPTED_DWH",
            RemoteStatus::Deleted => "DELETED",
            RemoteStatus::Other => "OTHER",
            RemoteStatus::Processing => "PROCESSING",
            RemoteStatus::Rejected => "REJECTED",
            RemoteStatus::RejectedEditable => "REJECTED_EDITABLE",
            RemoteStatus::Submitted => "SUBMITTED",
            RemoteStatus::Valid => "VALID",
            RemoteStatus::ValidWithWarnings => "VALID_WITH_WARNINGS",
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RemoteStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(StatusError::MissingRemoteStatus),
            "ACCEPTED_DWH" => Ok(RemoteStatus::AcceptedDwh),
            "DELETED" => Ok(RemoteStatus::Deleted),
            "OTHER" => Ok(RemoteStatus::Other),
            "PROCESSING" => Ok(RemoteStatus::Processing),
            "REJECTED" => Ok(RemoteStatus::Rejected),
            "REJECTED_EDITABLE" => Ok(RemoteStatus::RejectedEditable),
            "SUBMITTED" => Ok(RemoteStatus::Submitted),
            "VALID" => Ok(RemoteStatus::Valid),
            "VALID_WITH_WARNINGS" => Ok(RemoteStatus::ValidWithWarnings),
            other => Err(StatusError::UnknownRemoteStatus(other.to_string())),
        }
    }
}

/// Something a caller wants to do with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportAction {
    Send(OperationType),
    /// Compare an amended version against the accepted dataset
    Compare,
    Refresh,
    MakeEditable,
    GetAck,
}

impl fmt::Display for ReportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportAction::Send(op) => write!(f, "send ({})", op),
            ReportAction::Compare => write!(f, "compare"),
            ReportAction::Refresh => write!(f, "refresh"),
            ReportAction::MakeEditable => write!(f, "make editable"),
            ReportAction::GetAck => write!(f, "get acknowledgement"),
        }
    }
}
