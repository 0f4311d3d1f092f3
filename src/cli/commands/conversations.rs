use anyhow::{Context, Result};
use clap::Subcommand;
use uuid::Uuid;

use super::{Providers, open_knowledge_base};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConversationsCommand {
    #[command(about = "List conversations, newest first")]
    List,
    #[command(about = "Start an empty conversation")]
    New {
        #[arg(long, short = 't', help = "Conversation title")]
        title: Option<String>,
    },
    #[command(about = "Show a conversation and its messages")]
    Show {
        #[arg(help = "Conversation ID")]
        id: Uuid,
    },
    #[command(about = "Delete a conversation and its messages")]
    Delete {
        #[arg(help = "Conversation ID")]
        id: Uuid,
    },
}

pub async fn handle_conversations(
    cmd: ConversationsCommand,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let kb = open_knowledge_base(config, Providers::default()).await?;

    match cmd {
        ConversationsCommand::List => {
            let conversations = kb
                .list_conversations()
                .await
                .context("failed to list conversations")?;
            print!("{}", formatter.format_conversations(&conversations));
        }
        ConversationsCommand::New { title } => {
            let title = title.filter(|t| !t.trim().is_empty());
            let conversation = kb
                .create_conversation(title)
                .await
                .context("failed to create conversation")?;
            print!("{}", formatter.format_conversation(&conversation, &[]));
        }
        ConversationsCommand::Show { id } => {
            let (conversation, turns) = kb.conversation_turns(id).await?;
            print!("{}", formatter.format_conversation(&conversation, &turns));
        }
        ConversationsCommand::Delete { id } => {
            kb.delete_conversation(id).await?;
            print!(
                "{}",
                formatter.format_message(&format!("Deleted conversation {}", id))
            );
        }
    }

    Ok(())
}
