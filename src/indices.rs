//! Index administration and lookup commands for the CLI.

use anyhow::{bail, Context, Result};

use search_gateway_core::error::StoreError;
use search_gateway_core::query::documents_index_schema;
use search_gateway_core::store::{ensure_index, DocumentStore};

use crate::config::Config;

/// `sgw ping`: fails unless the cluster answers.
pub async fn run_ping(store: &dyn DocumentStore, config: &Config) -> Result<()> {
    let reachable = store
        .ping()
        .await
        .with_context(|| format!("Search backend at {} is unreachable", config.store.url))?;
    if !reachable {
        bail!("Search backend at {} answered with an error", config.store.url);
    }
    println!("ok {}", config.store.url);
    Ok(())
}

/// `sgw index create`: creates the documents index unless present.
pub async fn run_create(store: &dyn DocumentStore, config: &Config) -> Result<()> {
    let index = &config.indices.documents;
    let created = ensure_index(store, index, &documents_index_schema())
        .await
        .with_context(|| format!("Failed to create index '{}'", index))?;
    if created {
        println!("created {}", index);
    } else {
        println!("exists {}", index);
    }
    Ok(())
}

pub async fn run_delete(store: &dyn DocumentStore, index: &str) -> Result<()> {
    match store.delete_index(index).await {
        Ok(()) => println!("deleted {}", index),
        Err(StoreError::NotFound(_)) => println!("missing {}", index),
        Err(e) => return Err(e).with_context(|| format!("Failed to delete index '{}'", index)),
    }
    Ok(())
}

pub async fn run_refresh(store: &dyn DocumentStore, index: &str) -> Result<()> {
    store
        .refresh(index)
        .await
        .with_context(|| format!("Failed to refresh index '{}'", index))?;
    println!("refreshed {}", index);
    Ok(())
}

/// `sgw index clean`: deletes every document but keeps the index.
pub async fn run_clean(store: &dyn DocumentStore, index: &str) -> Result<()> {
    let deleted = store
        .clean_index(index)
        .await
        .with_context(|| format!("Failed to clean index '{}'", index))?;
    println!("cleaned {}", index);
    println!("  deleted: {}", deleted);
    Ok(())
}

/// `sgw get`: prints a stored document as pretty JSON.
pub async fn run_get(store: &dyn DocumentStore, index: &str, id: &str) -> Result<()> {
    let Some(doc) = store.get_by_id(index, id).await? else {
        bail!("document not found: {}/{}", index, id);
    };
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
