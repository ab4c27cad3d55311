//! Parse command - read a wire message into rows of one table

use anyhow::{Context, Result};
use clap::Args;
use collecta_protocol::defaults::DEFAULT_CONFIG_FILE;
use collecta_wire::row_parser;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use tracing::info;

use crate::cli::error::HelpfulError;
use crate::cli::{load_config, schema_for};

/// Arguments for the `parse` command
#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Wire document to read
    pub file: PathBuf,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "COLLECTA_CONFIG")]
    pub config: PathBuf,

    /// Table the records are read into
    #[arg(short, long)]
    pub table: String,

    /// Print the message header before the rows
    #[arg(long)]
    pub header: bool,
}

pub fn run(args: ParseArgs) -> Result<()> {
    let (config, catalog) = load_config(&args.config)?;
    let schema = schema_for(&catalog, &args.table)?;

    if !args.file.exists() {
        return Err(HelpfulError::file_not_found(&args.file).into());
    }
    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open: {}", args.file.display()))?;
    let mut parser = row_parser(BufReader::new(file), schema, config.parser.clone());

    // Rows are written as they arrive; a later parse error keeps them valid
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut header_printed = !args.header;
    loop {
        let next = parser.next_record();
        if !header_printed && !parser.header().is_empty() {
            let header: BTreeMap<&str, &str> = parser
                .header()
                .iter()
                .map(|(field, value)| (field.tag(), value.as_str()))
                .collect();
            writeln!(out, "{}", serde_json::to_string(&header)?)?;
            header_printed = true;
        }
        match next {
            Ok(Some(row)) => writeln!(out, "{}", serde_json::to_string(&row.to_record())?)?,
            Ok(None) => break,
            Err(err) => {
                out.flush()?;
                return Err(HelpfulError::wire_parse_error(&args.file, parser.records(), &err).into());
            }
        }
    }

    info!(records = parser.records(), file = %args.file.display(), "Parsed");
    Ok(())
}
