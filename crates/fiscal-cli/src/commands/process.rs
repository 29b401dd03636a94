//! Process command - run one document through the pipeline.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{debug, info};

use fiscal_core::analysis::analyze_document;
use fiscal_core::extract::format_brl_amount;
use fiscal_core::validation::rules::{format_cnpj, format_cpf};
use fiscal_core::{Pipeline, PipelineState, PipelineStatus, ProcessedDocument};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (XML, PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Include the per-document analysis
    #[arg(long)]
    analysis: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    // The pipeline and its HTTP client are blocking.
    let input = args.input.clone();
    let worker_pb = pb.clone();
    let state = tokio::task::spawn_blocking(move || -> anyhow::Result<PipelineState> {
        let pipeline = Pipeline::from_config(&config)?;
        let mut state = PipelineState::new(&input);
        while !state.status.is_terminal() {
            worker_pb.set_message(step_message(state.status));
            pipeline.advance(&mut state);
        }
        Ok(state)
    })
    .await??;

    pb.finish_and_clear();

    if state.status == PipelineStatus::Error {
        eprintln!("{}", style("Processing failed:").red());
        for error in &state.errors {
            eprintln!("  - {}", error);
        }
        if let Some(raw) = &state.raw_reply {
            eprintln!("{}", style("Raw oracle reply:").yellow());
            eprintln!("{}", raw);
        }
        anyhow::bail!("Could not process {}", args.input.display());
    }

    let document = state
        .outcome()
        .ok_or_else(|| anyhow::anyhow!("Pipeline finished without a result"))?;

    print_issues(&document);

    let output = format_document(&document, args.format, args.analysis)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn step_message(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::Pending => "Reading document...",
        PipelineStatus::Normalized => "Classifying...",
        PipelineStatus::Classified => "Extracting fields...",
        PipelineStatus::Extracted => "Validating...",
        PipelineStatus::Validated | PipelineStatus::Error => "Done",
    }
}

fn print_issues(document: &ProcessedDocument) {
    let validation = &document.validation;
    if !validation.errors.is_empty() {
        eprintln!("{}", style("Validation errors:").red());
        for error in &validation.errors {
            eprintln!("  - {}", error);
        }
    }
    if !validation.warnings.is_empty() {
        eprintln!("{}", style("Validation warnings:").yellow());
        for warning in &validation.warnings {
            eprintln!("  - {}", warning);
        }
    }
}

pub fn format_document(
    document: &ProcessedDocument,
    format: OutputFormat,
    with_analysis: bool,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json if with_analysis => {
            let analysis = analyze_document(&document.record, &document.validation);
            Ok(serde_json::to_string_pretty(&json!({
                "document": document,
                "analysis": analysis,
            }))?)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(document)?),
        OutputFormat::Csv => format_csv(document),
        OutputFormat::Text => Ok(format_text(document, with_analysis)),
    }
}

fn format_csv(document: &ProcessedDocument) -> anyhow::Result<String> {
    let record = &document.record;
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec![
        "document_type".to_string(),
        "number".to_string(),
        "series".to_string(),
        "issue_date".to_string(),
        "access_key".to_string(),
        "issuer_cnpj".to_string(),
        "issuer_name".to_string(),
        "recipient_id".to_string(),
        "recipient_name".to_string(),
        "products_total".to_string(),
        "discount".to_string(),
        "tax_total".to_string(),
        "grand_total".to_string(),
    ];
    header.extend(record.taxes.keys().cloned());
    header.push("is_valid".to_string());
    wtr.write_record(&header)?;

    let recipient_id = record
        .recipient
        .tax_id
        .clone()
        .or_else(|| record.recipient.personal_id.clone())
        .unwrap_or_default();
    let mut row = vec![
        document.classification.document_type.label(),
        record.metadata.number.clone(),
        record.metadata.series.clone(),
        record.metadata.issue_date.clone(),
        record.metadata.access_key.clone().unwrap_or_default(),
        record.issuer.tax_id.clone().unwrap_or_default(),
        record.issuer.legal_name.clone(),
        recipient_id,
        record.recipient.name.clone(),
        record.totals.products_total.to_string(),
        record.totals.discount.to_string(),
        record.totals.tax_total.to_string(),
        record.totals.grand_total.to_string(),
    ];
    row.extend(record.taxes.values().map(|v| v.to_string()));
    row.push(document.validation.is_valid.to_string());
    wtr.write_record(&row)?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(document: &ProcessedDocument, with_analysis: bool) -> String {
    let record = &document.record;
    let mut output = String::new();

    output.push_str(&format!(
        "Document: {} {} (series {})\n",
        document.classification.document_type,
        record.metadata.number,
        record.metadata.series
    ));
    output.push_str(&format!("Issued: {}\n", record.metadata.issue_date));
    if let Some(key) = &record.metadata.access_key {
        output.push_str(&format!("Access key: {}\n", key));
    }
    output.push('\n');

    output.push_str("Issuer:\n");
    output.push_str(&format!("  {}\n", record.issuer.legal_name));
    if let Some(cnpj) = &record.issuer.tax_id {
        output.push_str(&format!("  CNPJ: {}\n", format_cnpj(cnpj)));
    }
    if !record.issuer.address.is_empty() {
        output.push_str(&format!("  {}\n", record.issuer.address));
    }
    output.push('\n');

    output.push_str("Recipient:\n");
    output.push_str(&format!("  {}\n", record.recipient.name));
    if let Some(cnpj) = &record.recipient.tax_id {
        output.push_str(&format!("  CNPJ: {}\n", format_cnpj(cnpj)));
    } else if let Some(cpf) = &record.recipient.personal_id {
        output.push_str(&format!("  CPF: {}\n", format_cpf(cpf)));
    }
    output.push('\n');

    if !record.line_items.is_empty() {
        output.push_str("Items:\n");
        for (i, item) in record.line_items.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {}  {} {} x {} = {}\n",
                i + 1,
                item.description,
                item.quantity.normalize(),
                item.unit,
                format_brl_amount(item.unit_price),
                format_brl_amount(item.line_total)
            ));
        }
        output.push('\n');
    }

    output.push_str("Totals:\n");
    output.push_str(&format!("  Products: {}\n", format_brl_amount(record.totals.products_total)));
    output.push_str(&format!("  Discount: {}\n", format_brl_amount(record.totals.discount)));
    output.push_str(&format!("  Taxes:    {}\n", format_brl_amount(record.totals.tax_total)));
    output.push_str(&format!("  Total:    {}\n", format_brl_amount(record.totals.grand_total)));
    output.push('\n');

    output.push_str("Taxes:\n");
    for (id, value) in &record.taxes {
        output.push_str(&format!("  {:<8} {}\n", id.to_uppercase(), format_brl_amount(*value)));
    }
    output.push('\n');

    let validation = &document.validation;
    output.push_str(&format!(
        "Validation: {} ({} errors, {} warnings)\n",
        if validation.is_valid { "valid" } else { "INVALID" },
        validation.errors.len(),
        validation.warnings.len()
    ));

    if with_analysis {
        let analysis = analyze_document(record, validation);
        output.push_str(&format!("\nTax burden: {:.2}%\n", analysis.taxes.burden_percent));
        output.push_str("Recommendations:\n");
        for recommendation in &analysis.recommendations {
            output.push_str(&format!("  - {}\n", recommendation));
        }
    }

    output
}
