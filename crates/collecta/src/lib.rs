//! Collecta application layer: configuration and the report-send workflow.

pub mod config;
pub mod send;

pub use config::{AppConfig, ConfigError};
pub use send::{
    apply_ack, NoProgress, ProgressListener, Report, ReportSender, SendError, SendHandle,
    SendReceipt, Transport,
};
