//! Canonical vocabulary for Collecta report exchange.
//!
//! Everything the other crates agree on lives here: the dataset status
//! machine, the remote status vocabulary, envelope field kinds, amendment
//! codes and the transport error classification.

pub mod defaults;
pub mod paths;
pub mod status;
pub mod transport;
pub mod wire;

pub use status::{DatasetStatus, RemoteStatus, ReportAction, StatusError};
pub use transport::{AckLog, RemoteDataset, TransportError};
pub use wire::{
    version_suffix, AmendmentType, HeaderField, OperationField, OperationType, VocabularyError,
};
