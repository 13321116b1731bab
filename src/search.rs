//! Free-text search over the documents index.
//!
//! Translates a `(query, mode)` pair into one store search and returns the
//! matching file names, de-duplicated in ranking order.

use anyhow::Result;

use search_gateway_core::query::{document_search_body, SearchMode};
use search_gateway_core::reshape::{dedup_file_names, FileHit};
use search_gateway_core::store::DocumentStore;

use crate::config::Config;
use crate::error::ApiError;

/// Mode used when the request names none.
pub const DEFAULT_MODE: &str = "match";

/// Runs a document search.
///
/// The mode is validated first. A blank query yields no results for
/// `match` and `wildcard` without querying the store; `match_all`
/// ignores the text.
pub async fn search_documents(
    store: &dyn DocumentStore,
    config: &Config,
    query: &str,
    mode: &str,
) -> Result<Vec<FileHit>, ApiError> {
    let mode: SearchMode = mode.parse().map_err(|_| ApiError::InvalidMode)?;
    let query = query.trim();
    if query.is_empty() && mode.needs_query() {
        return Ok(Vec::new());
    }

    let body = document_search_body(mode, query, config.search.max_results);
    let resp = store.search(&config.indices.documents, &body).await?;
    let hits = dedup_file_names(&resp);
    tracing::debug!(%mode, query, raw = resp.hits.hits.len(), unique = hits.len(), "document search");
    Ok(hits)
}

/// `sgw search`: prints matching file names, one per line.
pub async fn run_search(store: &dyn DocumentStore, config: &Config, query: &str, mode: &str) -> Result<()> {
    let hits = search_documents(store, config, query, mode).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. {}", i + 1, hit.file_name);
    }
    Ok(())
}
