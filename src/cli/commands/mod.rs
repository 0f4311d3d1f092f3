mod ask;
mod config;
mod conversations;
mod documents;
mod ingest;
mod search;
mod status;

pub use ask::AskArgs;
pub use config::ConfigCommand;
pub use conversations::ConversationsCommand;
pub use documents::DocumentsCommand;
pub use ingest::IngestArgs;
pub use search::SearchArgs;

pub use ask::handle_ask;
pub use config::handle_config;
pub use conversations::handle_conversations;
pub use documents::handle_documents;
pub use ingest::handle_ingest;
pub use search::handle_search;
pub use status::handle_status;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::services::{
    AnthropicProvider, KnowledgeBase, KnowledgeStore, VoyageProvider, create_store,
};

/// Providers a command needs on top of the store.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Providers {
    pub embedding: bool,
    pub generation: bool,
}

pub(crate) async fn open_store(config: &Config) -> Result<Arc<dyn KnowledgeStore>> {
    let store = create_store(&config.store, config.embedding.dimension as usize)
        .await
        .with_context(|| format!("failed to open {} store", config.store.driver))?;
    store
        .initialize()
        .await
        .context("failed to initialize store schema")?;
    Ok(store)
}

pub(crate) async fn open_knowledge_base(
    config: Config,
    providers: Providers,
) -> Result<KnowledgeBase> {
    let store = open_store(&config).await?;

    let embedder = if providers.embedding {
        Some(Arc::new(VoyageProvider::new(&config.embedding)?))
    } else {
        None
    };
    let generator = if providers.generation {
        Some(Arc::new(AnthropicProvider::new(&config.generation)?))
    } else {
        None
    };

    let mut kb = KnowledgeBase::new(config, store);
    if let Some(embedder) = embedder {
        kb = kb.with_embedder(embedder);
    }
    if let Some(generator) = generator {
        kb = kb.with_generator(generator);
    }
    Ok(kb)
}
