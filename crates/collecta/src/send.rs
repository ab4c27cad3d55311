//! Report-send workflow.
//!
//! Sending a report runs four steps in order:
//!
//! 1. status gate: the report's local status must permit the operation
//! 2. remote check: an existing remote dataset must be overwritable
//! 3. export: the report tree is written into one wire message
//! 4. transport: the message is handed to the collection authority
//!
//! Steps 1 and 2 fail before any wire I/O. [`ReportSender::spawn`] runs the
//! sequence on a dedicated worker thread and reports through a
//! [`ProgressListener`] from that thread.

use collecta_ids::MessageId;
use collecta_protocol::{
    AckLog, DatasetStatus, OperationType, RemoteDataset, RemoteStatus, ReportAction,
    TransportError,
};
use collecta_schema::{Catalog, ColumnFormulaError, DataAccess, Row};
use collecta_wire::{ExportError, ExportSummary, MessageConfig, Operation, ReportExporter};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{info, info_span, warn};

/// Connection to the collection authority.
pub trait Transport: Send + Sync {
    /// Upload one message.
    fn send(&self, op_type: OperationType, payload: &[u8]) -> Result<AckLog, TransportError>;

    /// The dataset as the authority currently stores it, `None` if unknown.
    fn remote_dataset(&self, dataset_id: &str) -> Result<Option<RemoteDataset>, TransportError>;

    /// Acknowledgement for a previously sent message.
    fn get_ack(&self, message_id: &MessageId) -> Result<AckLog, TransportError>;
}

/// Callbacks invoked from the send worker.
pub trait ProgressListener: Send + Sync {
    /// Fraction of the workflow done, `0.0..=1.0`.
    fn progress_changed(&self, progress: f64);
    fn progress_completed(&self);
    fn progress_stopped(&self, error: &SendError);
}

/// Listener that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn progress_changed(&self, _progress: f64) {}
    fn progress_completed(&self) {}
    fn progress_stopped(&self, _error: &SendError) {}
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Action '{action}' is not permitted while the report is {status}")]
    NotPermitted {
        status: DatasetStatus,
        action: ReportAction,
    },

    #[error("Remote dataset is {remote} and cannot be overwritten")]
    NotOverwritable { remote: RemoteStatus },

    #[error("Report has no remote dataset id")]
    MissingDatasetId,

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("{} formula column(s) could not be resolved", .0.len())]
    FormulaErrors(Vec<ColumnFormulaError>),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Send worker panicked")]
    WorkerPanicked,
}

impl SendError {
    /// Whether the failure happened after the message left this side.
    pub fn reached_transport(&self) -> bool {
        matches!(self, SendError::Transport(_))
    }

    /// Local status of a report after `op_type` failed with this error.
    ///
    /// Only transport failures move the report, into the failed version of
    /// the in-flight status. Everything else left it untouched.
    pub fn status_after(&self, op_type: OperationType, current: DatasetStatus) -> DatasetStatus {
        if self.reached_transport() {
            DatasetStatus::failed_version_of(op_type.in_flight_status()).unwrap_or(current)
        } else {
            current
        }
    }
}

/// A report as the send workflow sees it.
#[derive(Debug, Clone)]
pub struct Report {
    pub root: Row,
    pub status: DatasetStatus,
    /// Assigned by the authority after the first successful upload
    pub dataset_id: Option<String>,
}

impl Report {
    pub fn new(root: Row, status: DatasetStatus) -> Self {
        Self {
            root,
            status,
            dataset_id: None,
        }
    }

    pub fn with_dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }
}

/// Outcome of a successful send.
#[derive(Debug)]
pub struct SendReceipt {
    /// New local status of the report
    pub status: DatasetStatus,
    pub summary: ExportSummary,
    pub ack: AckLog,
    pub payload_bytes: usize,
}

impl SendReceipt {
    pub fn message_id(&self) -> &MessageId {
        &self.summary.message_id
    }
}

/// Runs the send workflow against one storage and transport.
#[derive(Clone)]
pub struct ReportSender {
    catalog: Arc<Catalog>,
    store: Arc<dyn DataAccess>,
    message: Arc<MessageConfig>,
    transport: Arc<dyn Transport>,
}

/// Handle to a send running on its worker thread.
pub struct SendHandle {
    inner: JoinHandle<Result<SendReceipt, SendError>>,
}

impl SendHandle {
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for the worker. Dropping the handle instead detaches it.
    pub fn join(self) -> Result<SendReceipt, SendError> {
        self.inner.join().map_err(|_| SendError::WorkerPanicked)?
    }
}

impl ReportSender {
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn DataAccess>,
        message: Arc<MessageConfig>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            catalog,
            store,
            message,
            transport,
        }
    }

    /// Run [`ReportSender::send`] on a dedicated worker thread.
    pub fn spawn(
        &self,
        report: Report,
        operation: Operation,
        listener: Arc<dyn ProgressListener>,
    ) -> std::io::Result<SendHandle> {
        let sender = self.clone();
        let inner = thread::Builder::new()
            .name("collecta-send".to_string())
            .spawn(move || sender.send(&report, &operation, listener.as_ref()))?;
        Ok(SendHandle { inner })
    }

    /// Run the whole workflow on the calling thread.
    pub fn send(
        &self,
        report: &Report,
        operation: &Operation,
        listener: &dyn ProgressListener,
    ) -> Result<SendReceipt, SendError> {
        let span = info_span!(
            "send",
            table = report.root.table(),
            row = %report.root.id(),
            op = %operation.op_type
        );
        let _enter = span.enter();

        match self.run(report, operation, listener) {
            Ok(receipt) => {
                info!(status = %receipt.status, bytes = receipt.payload_bytes, "Report sent");
                listener.progress_completed();
                Ok(receipt)
            }
            Err(err) => {
                warn!(error = %err, "Report send stopped");
                listener.progress_stopped(&err);
                Err(err)
            }
        }
    }

    fn run(
        &self,
        report: &Report,
        operation: &Operation,
        listener: &dyn ProgressListener,
    ) -> Result<SendReceipt, SendError> {
        let op_type = operation.op_type;
        let action = ReportAction::Send(op_type);
        if !report.status.permits(action) {
            return Err(SendError::NotPermitted {
                status: report.status,
                action,
            });
        }
        listener.progress_changed(0.1);

        self.check_remote(report, op_type)?;
        listener.progress_changed(0.3);

        let mut payload = Vec::new();
        let exporter = ReportExporter::new(&self.catalog, self.store.as_ref(), &self.message);
        let mut summary = exporter.export(&report.root, operation, &mut payload)?;
        if !summary.formula_errors.is_empty() {
            return Err(SendError::FormulaErrors(std::mem::take(
                &mut summary.formula_errors,
            )));
        }
        listener.progress_changed(0.6);

        let ack = self.transport.send(op_type, &payload)?;
        listener.progress_changed(1.0);

        Ok(SendReceipt {
            status: op_type.in_flight_status(),
            summary,
            ack,
            payload_bytes: payload.len(),
        })
    }

    /// Uploads may only replace a remote dataset that can be made editable.
    /// Submit and reject act on the remote dataset, so it must be known.
    fn check_remote(&self, report: &Report, op_type: OperationType) -> Result<(), SendError> {
        match (op_type.carries_dataset(), report.dataset_id.as_deref()) {
            (true, None) => Ok(()),
            (false, None) => Err(SendError::MissingDatasetId),
            (false, Some(_)) => Ok(()),
            (true, Some(dataset_id)) => {
                let Some(remote) = self.transport.remote_dataset(dataset_id)? else {
                    return Ok(());
                };
                let status = remote.local_status();
                if status.exists_remotely() && !status.can_be_made_editable() {
                    return Err(SendError::NotOverwritable {
                        remote: remote.status,
                    });
                }
                Ok(())
            }
        }
    }

    /// Ask the authority for the current dataset status.
    pub fn refresh(&self, report: &Report) -> Result<DatasetStatus, SendError> {
        if !report.status.permits(ReportAction::Refresh) {
            return Err(SendError::NotPermitted {
                status: report.status,
                action: ReportAction::Refresh,
            });
        }
        let dataset_id = report
            .dataset_id
            .as_deref()
            .ok_or(SendError::MissingDatasetId)?;
        Ok(self
            .transport
            .remote_dataset(dataset_id)?
            .map_or(report.status, |remote| remote.local_status()))
    }

    /// Fetch and apply the acknowledgement of a sent message.
    pub fn fetch_ack(
        &self,
        status: DatasetStatus,
        message_id: &MessageId,
    ) -> Result<(DatasetStatus, AckLog), SendError> {
        if !status.permits(ReportAction::GetAck) {
            return Err(SendError::NotPermitted {
                status,
                action: ReportAction::GetAck,
            });
        }
        let ack = self.transport.get_ack(message_id)?;
        let next = apply_ack(status, &ack)?;
        Ok((next, ack))
    }
}

/// New local status once an acknowledgement arrived.
///
/// An acknowledgement without a dataset status is not ready yet and leaves
/// the report where it was.
pub fn apply_ack(status: DatasetStatus, ack: &AckLog) -> Result<DatasetStatus, SendError> {
    if !status.permits(ReportAction::GetAck) {
        return Err(SendError::NotPermitted {
            status,
            action: ReportAction::GetAck,
        });
    }
    Ok(ack
        .dataset_status
        .map_or(status, DatasetStatus::from_remote))
}
