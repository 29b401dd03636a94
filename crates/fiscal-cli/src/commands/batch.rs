//! Batch processing command for multiple fiscal documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use fiscal_core::normalize::detect_format;
use fiscal_core::{BatchQueue, BatchRunner, Pipeline, QueueStatus};

use super::load_config;
use super::process::{format_document, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input files
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (default: from config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Attempts per document before giving up (default: from config)
    #[arg(long)]
    retries: Option<u32>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    // Expand glob pattern, keeping only formats the normalizer accepts
    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file() && detect_format(p).is_ok())
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let workers = args.jobs.unwrap_or(config.batch.workers);
    let max_attempts = args.retries.unwrap_or(config.batch.max_attempts);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap()
            .progress_chars("=>-"),
    );

    let worker_pb = pb.clone();
    let queue = tokio::task::spawn_blocking(move || -> anyhow::Result<BatchQueue> {
        let pipeline = Pipeline::from_config(&config)?;
        let mut queue = BatchQueue::from_paths(files);
        BatchRunner::new(workers)
            .with_max_attempts(max_attempts)
            .with_auto_retry(max_attempts > 1)
            .run(&mut queue, |path| {
                let state = pipeline.run(path);
                worker_pb.inc(1);
                state.outcome().ok_or_else(|| {
                    state
                        .error_message()
                        .unwrap_or("pipeline did not complete")
                        .to_string()
                })
            });
        Ok(queue)
    })
    .await??;

    pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        for item in queue.items() {
            let Some(document) = &item.document else { continue };
            let output_path = output_dir.join(format!(
                "{}.{}",
                file_stem(&item.path),
                args.format.extension()
            ));
            fs::write(&output_path, format_document(document, args.format, false)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &queue)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let stats = queue.stats();
    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        stats.total,
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(stats.completed).green(),
        style(stats.failed).red()
    );

    let failed: Vec<_> = queue
        .items()
        .iter()
        .filter(|i| i.status == QueueStatus::Failed)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for item in failed {
            println!(
                "  - {} ({} attempts): {}",
                item.path.display(),
                item.attempts,
                item.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("document")
}

fn write_summary(path: &Path, queue: &BatchQueue) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "attempts",
        "document_type",
        "number",
        "issuer_cnpj",
        "issuer_name",
        "grand_total",
        "tax_total",
        "is_valid",
        "errors",
        "warnings",
        "error",
    ])?;

    for item in queue.items() {
        let filename = item.path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        let attempts = item.attempts.to_string();

        if let Some(document) = &item.document {
            let record = &document.record;
            wtr.write_record([
                filename,
                "success",
                &attempts,
                &document.classification.document_type.label(),
                &record.metadata.number,
                record.issuer.tax_id.as_deref().unwrap_or(""),
                &record.issuer.legal_name,
                &record.totals.grand_total.to_string(),
                &record.totals.tax_total.to_string(),
                &document.validation.is_valid.to_string(),
                &document.validation.errors.len().to_string(),
                &document.validation.warnings.len().to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                &attempts,
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                item.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
