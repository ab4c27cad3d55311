//! Boundary types exchanged with the remote transport.
//!
//! The transport itself lives outside this workspace. These types are the
//! structured answers it hands back; the workflow exposes them unchanged.

use crate::status::{DatasetStatus, RemoteStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed classification of transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("No connection to the collection authority")]
    NoConnection,

    #[error("Credentials rejected by the collection authority")]
    Unauthorized,

    #[error("Account is not allowed to perform this operation")]
    Forbidden,

    #[error("Message could not be sent: {0}")]
    SendFailed(String),

    #[error("Transport error: {0}")]
    General(String),
}

/// A dataset as currently known by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDataset {
    pub dataset_id: String,
    pub status: RemoteStatus,
}

impl RemoteDataset {
    pub fn local_status(&self) -> DatasetStatus {
        DatasetStatus::from_remote(self.status)
    }
}

/// Acknowledgement returned for a processed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckLog {
    /// Message-level outcome codes as reported by the authority
    pub status_codes: Vec<String>,
    /// Dataset the message was applied to, once the authority assigned one
    pub dataset_id: Option<String>,
    /// Status of the dataset after processing, if already known
    pub dataset_status: Option<RemoteStatus>,
    /// Free-text processing log
    pub log: String,
}

impl AckLog {
    pub fn is_ready(&self) -> bool {
        self.dataset_status.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_serializes_with_kind() {
        let json = serde_json::to_string(&TransportError::SendFailed("timeout".into())).unwrap();
        assert_eq!(json, r#"{"kind":"send_failed","detail":"timeout"}"#);
        let back: TransportError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TransportError::SendFailed("timeout".into()));
    }

    #[test]
    fn test_remote_dataset_local_status() {
        let dataset = RemoteDataset {
            dataset_id: "DS-1".into(),
            status: RemoteStatus::ValidWithWarnings,
        };
        assert_eq!(dataset.local_status(), DatasetStatus::ValidWithWarnings);
    }
}
