//! In-memory [`DocumentStore`] implementation for tests and local runs.
//!
//! Indices are `HashMap`s behind `std::sync::RwLock`, keyed by index name.
//! Documents keep insertion order so unsorted searches are deterministic.
//! Writes are visible immediately; [`refresh`](DocumentStore::refresh) is a
//! no-op apart from checking that the index exists.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{project_fields, BulkSummary, Hit, Hits, SearchResponse, StoredDoc};

use super::query_eval::{aggregate, matches, sort_docs, DocRef};
use super::DocumentStore;

#[derive(Default)]
struct MemIndex {
    schema: Value,
    docs: Vec<(String, Value)>,
}

/// In-memory store evaluating the query subset the gateway issues.
pub struct InMemoryStore {
    indices: RwLock<HashMap<String, MemIndex>>,
    auto_create: bool,
}

impl InMemoryStore {
    /// A store that, like a default cluster, creates indices on first write.
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            auto_create: true,
        }
    }

    /// A store that rejects writes to indices that were never created.
    pub fn strict() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            auto_create: false,
        }
    }

    /// Seeds a document under a caller-chosen id, creating the index if needed.
    pub fn insert(&self, index: &str, id: &str, source: Value) {
        let mut indices = self.indices.write().unwrap();
        let idx = indices.entry(index.to_string()).or_default();
        match idx.docs.iter_mut().find(|(doc_id, _)| doc_id == id) {
            Some(slot) => slot.1 = source,
            None => idx.docs.push((id.to_string(), source)),
        }
    }

    /// Number of documents held in `index` (0 when absent).
    pub fn len(&self, index: &str) -> usize {
        let indices = self.indices.read().unwrap();
        indices.get(index).map(|i| i.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, index: &str) -> bool {
        self.len(index) == 0
    }

    /// The schema body an index was created with.
    pub fn schema(&self, index: &str) -> Option<Value> {
        let indices = self.indices.read().unwrap();
        indices.get(index).map(|i| i.schema.clone())
    }

    fn write_doc(&self, index: &str, source: &Value) -> StoreResult<String> {
        if !source.is_object() {
            return Err(StoreError::Rejected {
                status: 400,
                reason: "document must be a JSON object".to_string(),
            });
        }
        let mut indices = self.indices.write().unwrap();
        if !self.auto_create && !indices.contains_key(index) {
            return Err(index_missing(index));
        }
        let id = Uuid::new_v4().to_string();
        indices
            .entry(index.to_string())
            .or_default()
            .docs
            .push((id.clone(), source.clone()));
        Ok(id)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn index_missing(index: &str) -> StoreError {
    StoreError::NotFound(format!("no such index [{}]", index))
}

fn size_param(body: &Value, key: &str, default: usize) -> usize {
    body.get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn source_fields(body: &Value) -> Option<Vec<String>> {
    match body.get("_source")? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect(),
        ),
        Value::String(one) => Some(vec![one.clone()]),
        _ => None,
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_by_id(&self, index: &str, id: &str) -> StoreResult<Option<StoredDoc>> {
        let indices = self.indices.read().unwrap();
        Ok(indices.get(index).and_then(|idx| {
            idx.docs
                .iter()
                .find(|(doc_id, _)| doc_id == id)
                .map(|(doc_id, source)| StoredDoc {
                    id: doc_id.clone(),
                    source: source.clone(),
                })
        }))
    }

    async fn index_exists(&self, index: &str) -> StoreResult<bool> {
        Ok(self.indices.read().unwrap().contains_key(index))
    }

    async fn create_index(&self, index: &str, schema: &Value) -> StoreResult<()> {
        let mut indices = self.indices.write().unwrap();
        if indices.contains_key(index) {
            return Err(StoreError::Rejected {
                status: 400,
                reason: format!("index [{}] already exists", index),
            });
        }
        indices.insert(
            index.to_string(),
            MemIndex {
                schema: schema.clone(),
                docs: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        let mut indices = self.indices.write().unwrap();
        indices
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| index_missing(index))
    }

    async fn bulk_index(&self, index: &str, docs: &[Value]) -> StoreResult<BulkSummary> {
        let mut summary = BulkSummary::default();
        for doc in docs {
            match self.write_doc(index, doc) {
                Ok(id) => {
                    summary.indexed += 1;
                    summary.ids.push(id);
                }
                Err(StoreError::Rejected { .. }) => summary.failed += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }

    async fn index_document(&self, index: &str, doc: &Value) -> StoreResult<String> {
        self.write_doc(index, doc)
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> StoreResult<()> {
        let mut indices = self.indices.write().unwrap();
        let idx = indices.get_mut(index).ok_or_else(|| index_missing(index))?;
        let before = idx.docs.len();
        idx.docs.retain(|(doc_id, _)| doc_id != id);
        if idx.docs.len() == before {
            return Err(StoreError::NotFound(format!("document [{}]", id)));
        }
        Ok(())
    }

    async fn clean_index(&self, index: &str) -> StoreResult<u64> {
        let mut indices = self.indices.write().unwrap();
        let idx = indices.get_mut(index).ok_or_else(|| index_missing(index))?;
        let removed = idx.docs.len() as u64;
        idx.docs.clear();
        Ok(removed)
    }

    async fn refresh(&self, index: &str) -> StoreResult<()> {
        if self.indices.read().unwrap().contains_key(index) {
            Ok(())
        } else {
            Err(index_missing(index))
        }
    }

    async fn search(&self, index: &str, body: &Value) -> StoreResult<SearchResponse> {
        let indices = self.indices.read().unwrap();
        let idx = match indices.get(index) {
            Some(idx) => idx,
            None => return Ok(SearchResponse::default()),
        };

        let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));
        let mut matched: Vec<DocRef<'_>> = Vec::new();
        for (id, source) in &idx.docs {
            if matches(&query, (id.as_str(), source))? {
                matched.push((id.as_str(), source));
            }
        }
        if let Some(sort) = body.get("sort") {
            sort_docs(&mut matched, sort)?;
        }

        let aggregations = match body.get("aggs").or_else(|| body.get("aggregations")) {
            Some(aggs) => Some(aggregate(aggs, &matched)?),
            None => None,
        };

        let from = size_param(body, "from", 0);
        let size = size_param(body, "size", 10);
        let fields = source_fields(body);
        let hits = matched
            .iter()
            .skip(from)
            .take(size)
            .map(|(id, source)| Hit {
                id: id.to_string(),
                score: Some(1.0),
                source: match &fields {
                    Some(f) => project_fields(source, f),
                    None => (*source).clone(),
                },
            })
            .collect();

        Ok(SearchResponse {
            hits: Hits {
                total: matched.len() as u64,
                hits,
            },
            aggregations,
        })
    }

    async fn ping(&self) -> StoreResult<bool> {
        Ok(true)
    }
}
