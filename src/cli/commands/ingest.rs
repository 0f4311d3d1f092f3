use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use super::{Providers, open_knowledge_base};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::ContentType;
use crate::utils::read_file_bytes;

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(required = true, help = "Document to ingest (PDF, DOCX or plain text)")]
    pub path: PathBuf,

    #[arg(
        long,
        help = "MIME type of the document (guessed from the extension when omitted)"
    )]
    pub content_type: Option<String>,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let content_type = match args.content_type {
        Some(ct) => ct,
        None => ContentType::from_path(&args.path)
            .map(|ct| ct.mime().to_string())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "cannot infer content type of {}; pass --content-type",
                    args.path.display()
                )
            })?,
    };

    let filename = args
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.path.display().to_string());

    let bytes = read_file_bytes(&args.path, config.chunking.max_file_size)
        .with_context(|| format!("failed to read {}", args.path.display()))?;

    if verbose {
        eprintln!("Ingesting {} ({}, {} bytes)", filename, content_type, bytes.len());
    }

    let kb = open_knowledge_base(
        config,
        Providers {
            embedding: true,
            ..Default::default()
        },
    )
    .await?;

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Processing {}", filename));
    pb.enable_steady_tick(Duration::from_millis(120));

    let result = kb.ingest(&filename, &content_type, bytes).await;
    pb.finish_and_clear();

    let document = result.with_context(|| format!("failed to ingest {}", filename))?;

    if format == OutputFormat::Json {
        print!("{}", formatter.format_document(&document));
    } else {
        print!(
            "{}",
            formatter.format_message(&format!(
                "Ingested {} as {} ({} passages)",
                document.filename, document.id, document.chunk_count
            ))
        );
    }

    Ok(())
}
