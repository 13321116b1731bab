//! Storage abstraction for Search Gateway.
//!
//! The [`DocumentStore`] trait covers every operation the gateway issues
//! against the search engine. The production implementation talks to
//! Elasticsearch over HTTP; [`memory::InMemoryStore`] evaluates the same
//! query bodies locally for tests and development.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
mod query_eval;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::models::{BulkSummary, SearchResponse, StoredDoc};

/// Abstract search/document backend.
///
/// Every call is a single attempt: no retries and no backoff.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_by_id`](DocumentStore::get_by_id) | Fetch one document, `None` when absent |
/// | [`index_exists`](DocumentStore::index_exists) | Check for an index |
/// | [`create_index`](DocumentStore::create_index) | Create an index from a settings/mappings body |
/// | [`delete_index`](DocumentStore::delete_index) | Drop an index |
/// | [`bulk_index`](DocumentStore::bulk_index) | Index many documents in one request |
/// | [`index_document`](DocumentStore::index_document) | Index one document, returning its id |
/// | [`delete_by_id`](DocumentStore::delete_by_id) | Delete one document |
/// | [`clean_index`](DocumentStore::clean_index) | Delete every document, keep the index |
/// | [`refresh`](DocumentStore::refresh) | Make recent writes searchable |
/// | [`search`](DocumentStore::search) | Run a query DSL body |
/// | [`ping`](DocumentStore::ping) | Reachability probe |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id. A missing document or index reads as `None`.
    async fn get_by_id(&self, index: &str, id: &str) -> StoreResult<Option<StoredDoc>>;

    async fn index_exists(&self, index: &str) -> StoreResult<bool>;

    /// Create `index` with the given settings/mappings body.
    async fn create_index(&self, index: &str, schema: &Value) -> StoreResult<()>;

    /// Drop `index`. Fails with `NotFound` when it does not exist.
    async fn delete_index(&self, index: &str) -> StoreResult<()>;

    async fn bulk_index(&self, index: &str, docs: &[Value]) -> StoreResult<BulkSummary>;

    /// Index a single document under a store-generated id.
    async fn index_document(&self, index: &str, doc: &Value) -> StoreResult<String>;

    /// Delete one document. Fails with `NotFound` when it does not exist.
    async fn delete_by_id(&self, index: &str, id: &str) -> StoreResult<()>;

    /// Delete all documents in `index`, returning how many were removed.
    async fn clean_index(&self, index: &str) -> StoreResult<u64>;

    async fn refresh(&self, index: &str) -> StoreResult<()>;

    /// Run a search body. A missing index reads as an empty response.
    async fn search(&self, index: &str, body: &Value) -> StoreResult<SearchResponse>;

    async fn ping(&self) -> StoreResult<bool>;
}

/// Create `index` unless it already exists. Returns `true` when created.
pub async fn ensure_index(
    store: &dyn DocumentStore,
    index: &str,
    schema: &Value,
) -> StoreResult<bool> {
    if store.index_exists(index).await? {
        return Ok(false);
    }
    store.create_index(index, schema).await?;
    Ok(true)
}
