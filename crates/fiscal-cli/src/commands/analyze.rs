//! Analyze command - aggregate statistics over processed documents.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::{debug, warn};

use fiscal_core::analysis::{analyze, tax_totals, top_products};
use fiscal_core::extract::format_brl_amount;
use fiscal_core::models::tax::default_taxes;
use fiscal_core::{DocumentSummary, FiscalRecord, ProcessedDocument, TaxRegistry};

use super::load_config;

/// Arguments for the analyze command.
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Directory with processed JSON documents (as written by `fiscal batch -o`)
    #[arg(required = true)]
    input: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: ReportFormat,

    /// Number of products to list
    #[arg(long, default_value = "5")]
    top: usize,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ReportFormat {
    /// JSON output
    Json,
    /// Plain text report
    Text,
}

pub async fn run(args: AnalyzeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if !args.input.is_dir() {
        anyhow::bail!("Not a directory: {}", args.input.display());
    }

    let documents = read_documents(&args.input)?;
    if documents.is_empty() {
        anyhow::bail!("No processed documents found in {}", args.input.display());
    }

    let taxes = if config.registry.path.exists() {
        TaxRegistry::open(&config.registry.path)?.enabled()?
    } else {
        debug!("No tax configuration, using defaults");
        default_taxes()
    };

    let summaries: Vec<DocumentSummary> = documents.iter().map(DocumentSummary::from).collect();
    let records: Vec<FiscalRecord> = documents.into_iter().map(|d| d.record).collect();

    let report = analyze(&summaries);
    let totals = tax_totals(&records, &taxes);
    let products = top_products(&records, args.top);

    match args.format {
        ReportFormat::Json => {
            let output = serde_json::json!({
                "report": report,
                "tax_totals": totals,
                "top_products": products,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        ReportFormat::Text => {
            let overview = &report.overview;
            println!("{}", style("Overview").bold());
            println!("  Documents:   {}", overview.total_documents);
            println!("  Total value: {}", format_brl_amount(overview.total_value));
            println!("  Total taxes: {}", format_brl_amount(overview.total_taxes));
            println!("  Average:     {}", format_brl_amount(overview.average_value));
            println!("  Tax burden:  {:.2}%", overview.tax_burden_percent);

            println!();
            println!("{}", style("By type").bold());
            for (doc_type, count) in &report.by_type {
                println!("  {:<16} {}", doc_type, count);
            }

            println!();
            println!("{}", style("Top issuers").bold());
            for issuer in &report.top_issuers {
                println!("  {:<40} {}", issuer.name, issuer.count);
            }

            println!();
            println!("{}", style("Monthly trend").bold());
            for (month, bucket) in &report.monthly_trend {
                println!(
                    "  {}  {:>4} docs  {:>16}  taxes {}",
                    month,
                    bucket.count,
                    format_brl_amount(bucket.total_value),
                    format_brl_amount(bucket.total_taxes)
                );
            }

            println!();
            println!("{}", style("Taxes").bold());
            for (id, value) in &totals {
                println!("  {:<8} {}", id.to_uppercase(), format_brl_amount(*value));
            }

            if !products.is_empty() {
                println!();
                println!("{}", style("Top products").bold());
                for product in &products {
                    println!("  {:<40} {}", product.description, product.count);
                }
            }

            println!();
            println!("{}", style("Insights").bold());
            for insight in &report.insights {
                println!("  - {}", insight);
            }
        }
    }

    Ok(())
}

/// Every `*.json` file in `dir` that holds a processed document.
fn read_documents(dir: &Path) -> anyhow::Result<Vec<ProcessedDocument>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<ProcessedDocument>(&content) {
            Ok(document) => documents.push(document),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(documents)
}
