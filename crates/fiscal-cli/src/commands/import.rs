//! Import command - one validated document per row of a CSV export.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use console::style;
use tracing::debug;

use fiscal_core::models::tax::default_taxes;
use fiscal_core::normalize::TableField;
use fiscal_core::validation::validate;
use fiscal_core::{
    Classification, DocumentKind, InputFormat, ProcessedDocument, TableImporter, TaxRegistry,
};

use super::load_config;
use super::process::{format_document, OutputFormat};

/// Arguments for the import command.
#[derive(Args)]
pub struct ImportArgs {
    /// CSV file exported from a spreadsheet or ERP
    #[arg(required = true)]
    input: PathBuf,

    /// Directory for the per-row documents (readable by `fiscal analyze`)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each row
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Column delimiter (default: sniffed from the header row)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Only print the detected column mapping
    #[arg(long)]
    mapping: bool,
}

pub async fn run(args: ImportArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let tax_ids: Vec<String> = if config.registry.path.exists() {
        TaxRegistry::open(&config.registry.path)?.tax_ids(true)?
    } else {
        debug!("No tax configuration, using defaults");
        default_taxes().into_iter().map(|t| t.id).collect()
    };

    let mut importer = TableImporter::new(tax_ids.iter().cloned());
    if let Some(delimiter) = args.delimiter {
        if !delimiter.is_ascii() {
            anyhow::bail!("Delimiter must be a single ASCII character");
        }
        importer = importer.with_delimiter(delimiter as u8);
    }

    let import = importer.read_path(&args.input)?;

    if args.mapping {
        let fields = TableField::standard()
            .into_iter()
            .chain(tax_ids.iter().map(|id| TableField::Tax(id.clone())));
        for field in fields {
            let header = import.mapping.header(&field).unwrap_or("-");
            println!("  {:<16} {}", field, header);
        }
        let unmapped = import.mapping.unmapped();
        if !unmapped.is_empty() {
            println!("{} Unmapped: {}", style("ℹ").blue(), unmapped.join(", "));
        }
        return Ok(());
    }

    let stem = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("table")
        .to_string();

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let mut invalid = 0;
    for row in &import.rows {
        let validation = validate(&row.record);
        if !validation.is_valid {
            invalid += 1;
        }
        let document = ProcessedDocument {
            source: args.input.clone(),
            classification: Classification::new(
                InputFormat::Structured,
                DocumentKind::Known(row.document_type),
            ),
            record: row.record.clone(),
            validation,
            processed_at: Utc::now(),
        };

        let output = format_document(&document, args.format, false)?;
        match &args.output_dir {
            Some(dir) => {
                let path = dir.join(format!("{}-{}.{}", stem, row.row, args.format.extension()));
                fs::write(&path, output)?;
                debug!("Wrote row {} to {}", row.row, path.display());
            }
            None => println!("{}", output),
        }
    }

    println!(
        "{} Imported {} rows from {} ({} with validation errors)",
        style("✓").green(),
        import.rows.len(),
        args.input.display(),
        invalid
    );
    for (row, reason) in &import.skipped {
        println!("  {} row {}: {}", style("skipped").yellow(), row, reason);
    }

    Ok(())
}
