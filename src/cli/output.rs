use std::fmt::Write as FmtWrite;

use console::style;
use serde::Serialize;

use crate::models::{
    ChatResponse, Conversation, ConversationSummary, ConversationTurn, Document, OutputFormat,
    Role, SearchResults,
};
use crate::services::StoreStats;
use crate::utils::truncate_with_ellipsis;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_answer(&self, response: &ChatResponse) -> String;
    fn format_document(&self, document: &Document) -> String;
    fn format_documents(&self, documents: &[Document]) -> String;
    fn format_conversation(&self, conversation: &Conversation, turns: &[ConversationTurn])
    -> String;
    fn format_conversations(&self, conversations: &[ConversationSummary]) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub store_driver: String,
    pub store_location: String,
    pub store_connected: bool,
    pub stats: Option<StoreStats>,
    pub embedding_model: String,
    pub embedding_configured: bool,
    pub generation_model: String,
    pub generation_configured: bool,
    pub pdftotext_available: bool,
}

pub struct TextFormatter;

impl TextFormatter {
    fn heading(out: &mut String, title: &str) -> std::fmt::Result {
        writeln!(out, "{}", style(title).bold())?;
        writeln!(out, "{}", "-".repeat(title.chars().count()))
    }

    fn flag(ok: bool, yes: &str, no: &str) -> String {
        if ok {
            style(format!("[{yes}]")).green().to_string()
        } else {
            style(format!("[{no}]")).red().to_string()
        }
    }

    fn write_search_results(out: &mut String, results: &SearchResults) -> std::fmt::Result {
        if results.is_empty() {
            return writeln!(out, "No results found for: {}", results.query);
        }

        writeln!(out, "Search results for: \"{}\"", results.query)?;
        writeln!(
            out,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )?;

        for (i, passage) in results.results.iter().enumerate() {
            writeln!(
                out,
                "{}. {}",
                i + 1,
                style(format!("[Similarity: {:.3}]", passage.similarity)).cyan()
            )?;
            writeln!(
                out,
                "   Document: {} (passage {})",
                passage.document_id, passage.ordinal
            )?;
            writeln!(out, "   ---")?;
            for line in truncate_with_ellipsis(&passage.text, PREVIEW_CHARS).lines() {
                writeln!(out, "   {}", line)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_answer(out: &mut String, response: &ChatResponse) -> std::fmt::Result {
        writeln!(out, "{}\n", response.answer)?;
        if !response.sources.is_empty() {
            writeln!(out, "{}", style("Sources").bold())?;
            for (i, source) in response.sources.iter().enumerate() {
                writeln!(
                    out,
                    "  [Document {}] {} (similarity {:.3})",
                    i + 1,
                    source.document_id,
                    source.similarity
                )?;
                writeln!(out, "    {}", source.text.replace('\n', " "))?;
            }
            writeln!(out)?;
        }
        writeln!(
            out,
            "{}",
            style(format!("Conversation: {}", response.conversation_id)).dim()
        )
    }

    fn write_document(out: &mut String, document: &Document) -> std::fmt::Result {
        Self::heading(out, &document.filename)?;
        writeln!(out, "ID:           {}", document.id)?;
        writeln!(out, "Content type: {}", document.content_type)?;
        writeln!(
            out,
            "Uploaded:     {}",
            document.uploaded_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(
            out,
            "Processed:    {}",
            Self::flag(document.processed, "YES", "NO")
        )?;
        writeln!(out, "Passages:     {}", document.chunk_count)?;
        writeln!(out, "Checksum:     {}", document.checksum)
    }

    fn write_documents(out: &mut String, documents: &[Document]) -> std::fmt::Result {
        if documents.is_empty() {
            return writeln!(out, "No documents ingested.");
        }

        Self::heading(out, "Documents")?;
        for document in documents {
            writeln!(
                out,
                "  {}  {}  {} passages  {}",
                document.id,
                document.uploaded_at.format("%Y-%m-%d %H:%M"),
                document.chunk_count,
                document.filename
            )?;
        }
        Ok(())
    }

    fn write_conversation(
        out: &mut String,
        conversation: &Conversation,
        turns: &[ConversationTurn],
    ) -> std::fmt::Result {
        let title = conversation.title.as_deref().unwrap_or("(untitled)");
        Self::heading(out, title)?;
        writeln!(out, "ID:      {}", conversation.id)?;
        writeln!(
            out,
            "Created: {}\n",
            conversation.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;

        if turns.is_empty() {
            return writeln!(out, "No messages yet.");
        }

        for turn in turns {
            let speaker = match turn.role {
                Role::User => style("You").bold().cyan(),
                Role::Assistant => style("Assistant").bold().green(),
            };
            writeln!(out, "{} ({})", speaker, turn.created_at.format("%H:%M:%S"))?;
            for line in turn.text.lines() {
                writeln!(out, "  {}", line)?;
            }
            if let Some(sources) = turn.sources.as_ref().filter(|s| !s.is_empty()) {
                writeln!(
                    out,
                    "  {}",
                    style(format!("{} sources", sources.len())).dim()
                )?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_conversations(
        out: &mut String,
        conversations: &[ConversationSummary],
    ) -> std::fmt::Result {
        if conversations.is_empty() {
            return writeln!(out, "No conversations.");
        }

        Self::heading(out, "Conversations")?;
        for summary in conversations {
            let conversation = &summary.conversation;
            writeln!(
                out,
                "  {}  {}  {:>3} messages  {}",
                conversation.id,
                conversation.created_at.format("%Y-%m-%d %H:%M"),
                summary.turn_count,
                conversation.title.as_deref().unwrap_or("(untitled)")
            )?;
        }
        Ok(())
    }

    fn write_status(out: &mut String, status: &StatusInfo) -> std::fmt::Result {
        Self::heading(out, "Status")?;

        writeln!(
            out,
            "Store:       {} {}",
            status.store_driver,
            Self::flag(status.store_connected, "CONNECTED", "DISCONNECTED")
        )?;
        writeln!(out, "  Location:  {}", status.store_location)?;
        if let Some(stats) = &status.stats {
            writeln!(out, "  Documents: {}", stats.documents)?;
            writeln!(
                out,
                "  Passages:  {} ({} embedded)",
                stats.passages, stats.embedded_passages
            )?;
            writeln!(out, "  Conversations: {}", stats.conversations)?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "Embedding:   {} {}",
            status.embedding_model,
            Self::flag(status.embedding_configured, "KEY SET", "NO KEY")
        )?;
        writeln!(
            out,
            "Generation:  {} {}",
            status.generation_model,
            Self::flag(status.generation_configured, "KEY SET", "NO KEY")
        )?;
        writeln!(
            out,
            "pdftotext:   {}",
            Self::flag(status.pdftotext_available, "FOUND", "MISSING")
        )
    }

    fn render(write: impl FnOnce(&mut String) -> std::fmt::Result) -> String {
        let mut out = String::new();
        write(&mut out).map(|()| out).unwrap_or_default()
    }
}

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        Self::render(|out| Self::write_search_results(out, results))
    }

    fn format_answer(&self, response: &ChatResponse) -> String {
        Self::render(|out| Self::write_answer(out, response))
    }

    fn format_document(&self, document: &Document) -> String {
        Self::render(|out| Self::write_document(out, document))
    }

    fn format_documents(&self, documents: &[Document]) -> String {
        Self::render(|out| Self::write_documents(out, documents))
    }

    fn format_conversation(
        &self,
        conversation: &Conversation,
        turns: &[ConversationTurn],
    ) -> String {
        Self::render(|out| Self::write_conversation(out, conversation, turns))
    }

    fn format_conversations(&self, conversations: &[ConversationSummary]) -> String {
        Self::render(|out| Self::write_conversations(out, conversations))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        Self::render(|out| Self::write_status(out, status))
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("{} {}\n", style("Error:").red().bold(), error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut json =
            result.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
        json.push('\n');
        json
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.to_json(results)
    }

    fn format_answer(&self, response: &ChatResponse) -> String {
        self.to_json(response)
    }

    fn format_document(&self, document: &Document) -> String {
        self.to_json(document)
    }

    fn format_documents(&self, documents: &[Document]) -> String {
        self.to_json(&serde_json::json!({ "documents": documents }))
    }

    fn format_conversation(
        &self,
        conversation: &Conversation,
        turns: &[ConversationTurn],
    ) -> String {
        self.to_json(&serde_json::json!({
            "conversation": conversation,
            "turns": turns,
        }))
    }

    fn format_conversations(&self, conversations: &[ConversationSummary]) -> String {
        self.to_json(&serde_json::json!({ "conversations": conversations }))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.to_json(status)
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({ "message": message }))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({ "error": error }))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
