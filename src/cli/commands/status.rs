use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, StoreDriver};
use crate::services::{create_store, pdftotext_available};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let (store_connected, stats) =
        match create_store(&config.store, config.embedding.dimension as usize).await {
            Ok(store) => {
                let connected = store.health_check().await.unwrap_or(false);
                let stats = if connected {
                    match store.initialize().await {
                        Ok(()) => store.stats().await.ok(),
                        Err(_) => None,
                    }
                } else {
                    None
                };
                (connected, stats)
            }
            Err(e) => {
                tracing::warn!("store unavailable: {}", e);
                (false, None)
            }
        };

    let store_location = match config.store.driver {
        StoreDriver::PostgreSQL => redact_url(&config.store.url),
        StoreDriver::Memory => config
            .store
            .resolved_snapshot_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(in-process)".to_string()),
    };

    let status = StatusInfo {
        store_driver: config.store.driver.to_string(),
        store_location,
        store_connected,
        stats,
        embedding_model: config.embedding.model.clone(),
        embedding_configured: config.embedding.api_key.is_some(),
        generation_model: config.generation.model.clone(),
        generation_configured: config.generation.api_key.is_some(),
        pdftotext_available: pdftotext_available(),
    };

    print!("{}", formatter.format_status(&status));

    if !store_connected {
        eprintln!();
        match config.store.driver {
            StoreDriver::PostgreSQL => {
                eprintln!("Warning: PostgreSQL not accessible. Check store.url and that the pgvector extension is installed.");
            }
            StoreDriver::Memory => {
                eprintln!("Warning: snapshot file could not be loaded.");
            }
        }
    }

    Ok(())
}

/// Hide the password part of a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or("");
            format!("{scheme}://{user}:***@{host}")
        }
        None => url.to_string(),
    }
}
