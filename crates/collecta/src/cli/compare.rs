//! Compare command - amendments between two dataset documents

use anyhow::{Context, Result};
use clap::Args;
use collecta_protocol::{DatasetStatus, ReportAction};
use collecta_wire::{DatasetComparator, DatasetComparison};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::cli::error::HelpfulError;
use crate::cli::output::{print_table, truncate, yes_no};

/// Arguments for the `compare` command
#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Previously accepted dataset
    pub old: PathBuf,

    /// Amended dataset
    pub new: PathBuf,

    /// Status of the previously accepted dataset; only accepted ones can be amended
    #[arg(long, default_value = "accepted")]
    pub status: DatasetStatus,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn open(path: &Path) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(HelpfulError::file_not_found(path).into());
    }
    let file = File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
    Ok(BufReader::new(file))
}

pub fn run(args: CompareArgs) -> Result<()> {
    args.status.ensure_permitted(ReportAction::Compare).map_err(|e| {
        HelpfulError::new(e.to_string())
            .with_context(format!("Comparing {} against {}", args.new.display(), args.old.display()))
            .with_suggestion("TRY: collecta status accepted shows the permitted actions")
    })?;

    let amendments = DatasetComparator::diff(open(&args.old)?, open(&args.new)?).map_err(|e| {
        HelpfulError::new(format!("Cannot compare datasets: {}", e)).with_suggestions([
            "TRY: Every result must carry a recordId".to_string(),
            format!("TRY: Inspect both files: collecta parse {} --table <TABLE>", args.new.display()),
        ])
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&amendments)?);
        return Ok(());
    }

    if amendments.is_empty() {
        println!("No differences");
        return Ok(());
    }
    print_table(
        &["Record", "Amendment", "Version", "Nullified", "Fields"],
        amendments.iter().map(table_row).collect(),
    );
    Ok(())
}

fn table_row(c: &DatasetComparison) -> Vec<String> {
    let fields: Vec<String> = c.fragments.iter().map(|f| f.render()).collect();
    vec![
        c.row_id.clone().unwrap_or_default(),
        c.amendment.map(|a| a.as_str().to_string()).unwrap_or_default(),
        c.version.clone().unwrap_or_default(),
        yes_no(c.nullified),
        truncate(&fields.join(""), 60),
    ]
}
