//! Export command - write a stored report as one wire message

use anyhow::{Context, Result};
use clap::Args;
use collecta_ids::RowId;
use collecta_protocol::defaults::DEFAULT_CONFIG_FILE;
use collecta_protocol::{DatasetStatus, OperationType, ReportAction};
use collecta_schema::{DataAccess, MemoryStore};
use collecta_wire::{Operation, ReportExporter};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use crate::cli::error::HelpfulError;
use crate::cli::{load_config, schema_for};

/// Arguments for the `export` command
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "COLLECTA_CONFIG")]
    pub config: PathBuf,

    /// JSON data file holding the stored rows
    #[arg(short, long)]
    pub data: PathBuf,

    /// Table of the report root
    #[arg(long)]
    pub root_table: String,

    /// Row id of the report root
    #[arg(long)]
    pub root_id: RowId,

    /// Operation type: insert, replace, submit, reject
    #[arg(long, default_value = "insert")]
    pub op: OperationType,

    /// Current status of the report; the operation must be permitted
    #[arg(long, default_value = "draft")]
    pub status: DatasetStatus,

    /// Data collection code, unless the root row carries one
    #[arg(long)]
    pub data_collection: Option<String>,

    /// Free-text operation comment
    #[arg(long)]
    pub comment: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: ExportArgs) -> Result<()> {
    let action = ReportAction::Send(args.op);
    if !args.status.permits(action) {
        return Err(HelpfulError::new(format!(
            "Cannot {} a report whose status is {}",
            action, args.status
        ))
        .with_suggestion("TRY: collecta status <STATUS> shows the permitted actions")
        .into());
    }

    let (config, catalog) = load_config(&args.config)?;
    if !args.data.exists() {
        return Err(HelpfulError::file_not_found(&args.data).into());
    }
    let store = MemoryStore::load_json(&catalog, &args.data)
        .with_context(|| format!("Failed to load data file: {}", args.data.display()))?;

    let schema = schema_for(&catalog, &args.root_table)?;
    let root = store.get_by_id(&schema, args.root_id)?.ok_or_else(|| {
        HelpfulError::new(format!("No {} row with id {}", args.root_table, args.root_id))
            .with_context(format!("Data file: {}", args.data.display()))
    })?;

    let mut operation = Operation::new(args.op);
    if let Some(code) = args.data_collection {
        operation = operation.with_data_collection(code);
    }
    if let Some(comment) = args.comment {
        operation = operation.with_comment(comment);
    }

    let exporter = ReportExporter::new(&catalog, &store, &config.message);
    let summary = match &args.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            let summary = exporter.export(&root, &operation, &mut writer)?;
            writer.flush()?;
            summary
        }
        None => {
            let stdout = io::stdout();
            let summary = exporter.export(&root, &operation, stdout.lock())?;
            println!();
            summary
        }
    };

    for err in &summary.formula_errors {
        eprintln!("WARNING: column omitted: {}", err);
    }
    info!(message_id = %summary.message_id, records = summary.records, "Exported");
    eprintln!(
        "Exported {} record(s) from {} row(s), message {}",
        summary.records, summary.rows_visited, summary.message_id
    );
    Ok(())
}
