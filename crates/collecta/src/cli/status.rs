//! Status command - capability predicates of the dataset status machine

use anyhow::Result;
use clap::Args;
use collecta_protocol::DatasetStatus;

use crate::cli::output::{print_table, yes_no};

/// Arguments for the `status` command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Status to inspect (all statuses when omitted)
    pub status: Option<DatasetStatus>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

const PREDICATES: [(&str, fn(&DatasetStatus) -> bool); 9] = [
    ("editable", DatasetStatus::is_editable),
    ("send", DatasetStatus::can_be_sent),
    ("make editable", DatasetStatus::can_be_made_editable),
    ("reject", DatasetStatus::can_be_rejected),
    ("submit", DatasetStatus::can_be_submitted),
    ("amend", DatasetStatus::can_be_amended),
    ("ack", DatasetStatus::can_get_ack),
    ("refresh", DatasetStatus::can_be_refreshed),
    ("remote", DatasetStatus::exists_remotely),
];

pub fn run(args: StatusArgs) -> Result<()> {
    let statuses: Vec<DatasetStatus> = match args.status {
        Some(status) => vec![status],
        None => DatasetStatus::ALL.to_vec(),
    };

    if args.json {
        let report: Vec<serde_json::Value> = statuses.iter().map(status_json).collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut headers = vec!["Status", "Failed as"];
    headers.extend(PREDICATES.iter().map(|(name, _)| *name));
    let rows = statuses
        .iter()
        .map(|status| {
            let mut row = vec![
                status.to_string(),
                DatasetStatus::failed_version_of(*status)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            ];
            row.extend(PREDICATES.iter().map(|(_, check)| yes_no(check(status))));
            row
        })
        .collect();
    print_table(&headers, rows);
    Ok(())
}

fn status_json(status: &DatasetStatus) -> serde_json::Value {
    let permits: serde_json::Map<String, serde_json::Value> = PREDICATES
        .iter()
        .map(|(name, check)| (name.to_string(), serde_json::Value::Bool(check(status))))
        .collect();
    serde_json::json!({
        "status": status,
        "failed_version": DatasetStatus::failed_version_of(*status),
        "permits": permits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_matches_predicates() {
        let value = status_json(&DatasetStatus::Uploaded);
        assert_eq!(value["status"], "UPLOADED");
        assert_eq!(value["failed_version"], "UPLOAD_FAILED");
        assert_eq!(value["permits"]["ack"], true);
        assert_eq!(value["permits"]["refresh"], true);
        assert_eq!(value["permits"]["send"], false);
    }

    #[test]
    fn test_status_without_failed_version() {
        let value = status_json(&DatasetStatus::Accepted);
        assert!(value["failed_version"].is_null());
        assert_eq!(value["permits"]["amend"], true);
    }
}
