//! Check-config command - validate a configuration file

use anyhow::Result;
use clap::Args;
use collecta_protocol::defaults::DEFAULT_CONFIG_FILE;
use collecta_protocol::HeaderField;
use collecta_schema::{Catalog, OutputPolicy};
use std::path::PathBuf;

use crate::cli::load_config;
use crate::cli::output::{print_table, yes_no};

/// Arguments for the `check-config` command
#[derive(Debug, Args)]
pub struct CheckConfigArgs {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "COLLECTA_CONFIG")]
    pub config: PathBuf,
}

pub fn run(args: CheckConfigArgs) -> Result<()> {
    let (config, catalog) = load_config(&args.config)?;

    println!("Configuration OK: {}", args.config.display());
    for field in HeaderField::ALL {
        if let Some(value) = config.message.value(field) {
            println!("  {} = {}", field.tag(), value);
        }
    }
    if let Some(composite) = &config.parser.composite {
        println!("  composite {} -> {}", composite.tag, composite.column);
    }
    println!();
    print_table(
        &["Schema", "Columns", "Record", "Header", "Operation", "Traverse", "Emits", "Parents"],
        schema_rows(&catalog),
    );
    Ok(())
}

fn schema_rows(catalog: &Catalog) -> Vec<Vec<String>> {
    catalog
        .schemas()
        .map(|schema| {
            let count = |policy| schema.columns_with_output(policy).count().to_string();
            let parents: Vec<&str> = schema.direct_parents().map(|r| r.parent.as_str()).collect();
            vec![
                schema.name().to_string(),
                schema.ordered_columns().len().to_string(),
                count(OutputPolicy::Record),
                count(OutputPolicy::Header),
                count(OutputPolicy::Operation),
                yes_no(schema.is_traversable()),
                yes_no(schema.generates_record()),
                parents.join(", "),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_rows() {
        let catalog = Catalog::from_toml_str(
            r#"
[[schemas]]
name = "report"
traversable = true

[[schemas.columns]]
id = "repYear"
output = "record"

[[schemas.columns]]
id = "dcCode"
output = "operation"

[[schemas]]
name = "sample"
generates_record = true

[[relations]]
parent = "report"
child = "sample"
"#,
        )
        .unwrap();

        let rows = schema_rows(&catalog);
        assert_eq!(rows.len(), 2);
        let report = rows.iter().find(|r| r[0] == "report").unwrap();
        assert_eq!(report[2], "1");
        assert_eq!(report[4], "1");
        assert_eq!(report[5], "yes");
        let sample = rows.iter().find(|r| r[0] == "sample").unwrap();
        // the foreign key column is added by the catalog
        assert_eq!(sample[1], "1");
        assert_eq!(sample[7], "report");
    }
}
