//! CLI module for the knowledge base.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Ask questions about your documents, answered from their own text.
#[derive(Debug, Parser)]
#[command(name = "kbase")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check store connectivity and provider credentials
    Status,

    /// Extract, chunk, embed and store a document
    Ingest(commands::IngestArgs),

    /// Answer a question from the ingested documents
    Ask(commands::AskArgs),

    /// Find the passages most similar to a query
    Search(commands::SearchArgs),

    /// Manage ingested documents
    #[command(subcommand)]
    Documents(commands::DocumentsCommand),

    /// Manage conversations
    #[command(subcommand)]
    Conversations(commands::ConversationsCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
