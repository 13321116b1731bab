//! Elasticsearch [`DocumentStore`] over the REST API.
//!
//! Uses `reqwest` with rustls; no official client crate. Each trait call is
//! exactly one HTTP request with the configured timeout, no retries.
//! Failures are logged here, at the client boundary, and returned to the
//! caller as [`StoreError`] kinds:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | connect error / timeout | `Unavailable` |
//! | 404 on a read (`get_by_id`, `search`) | empty / `None` |
//! | 404 on a write or admin call | `NotFound` |
//! | other non-2xx | `Rejected { status, reason }` |
//! | unparseable body | `Malformed` |

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use search_gateway_core::error::{StoreError, StoreResult};
use search_gateway_core::models::{BulkSummary, SearchResponse, StoredDoc};
use search_gateway_core::store::DocumentStore;

use crate::config::StoreConfig;

/// Reason strings taken from error bodies are cut to this many chars.
const MAX_REASON_CHARS: usize = 300;

pub struct ElasticsearchStore {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for the search backend")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, index: &str, tail: &str) -> String {
        if tail.is_empty() {
            format!("{}/{}", self.base_url, urlencoding::encode(index))
        } else {
            format!("{}/{}/{}", self.base_url, urlencoding::encode(index), tail)
        }
    }

    fn doc_url(&self, index: &str, id: &str) -> String {
        self.url(index, &format!("_doc/{}", urlencoding::encode(id)))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    /// Sends a request, mapping transport failures to `Unavailable`.
    async fn send(&self, op: &str, index: &str, req: RequestBuilder) -> StoreResult<Response> {
        self.authed(req).send().await.map_err(|e| {
            tracing::error!(op, index, error = %e, "search backend unreachable");
            StoreError::Unavailable(e.to_string())
        })
    }

    async fn json_body<T: serde::de::DeserializeOwned>(
        op: &str,
        index: &str,
        resp: Response,
    ) -> StoreResult<T> {
        resp.json::<T>().await.map_err(|e| {
            tracing::error!(op, index, error = %e, "unparseable search backend response");
            StoreError::Malformed(e.to_string())
        })
    }

    /// Turns a non-2xx response into a store error, logging it.
    async fn failure(op: &str, index: &str, resp: Response) -> StoreError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let reason = error_reason(&text);
        if status == StatusCode::NOT_FOUND {
            tracing::warn!(op, index, %reason, "not found");
            StoreError::NotFound(reason)
        } else {
            tracing::error!(op, index, status = status.as_u16(), %reason, "search backend rejected request");
            StoreError::Rejected {
                status: status.as_u16(),
                reason,
            }
        }
    }
}

/// Pulls `error.reason` (or `error.type`) out of an error body.
fn error_reason(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let reason = parsed.as_ref().and_then(|v| match v.get("error") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(err) => err
            .get("reason")
            .or_else(|| err.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string),
        None => None,
    });
    let raw = reason.unwrap_or_else(|| body.trim().to_string());
    if raw.is_empty() {
        "no reason given".to_string()
    } else {
        raw.chars().take(MAX_REASON_CHARS).collect()
    }
}

/// NDJSON body for `_bulk`: an `index` action line before every document.
fn bulk_payload(docs: &[Value]) -> String {
    let mut out = String::new();
    for doc in docs {
        out.push_str("{\"index\":{}}\n");
        out.push_str(&doc.to_string());
        out.push('\n');
    }
    out
}

/// Counts per-item outcomes of a `_bulk` response.
fn summarize_bulk(resp: &Value) -> BulkSummary {
    let mut summary = BulkSummary::default();
    let items = resp.get("items").and_then(Value::as_array);
    for item in items.into_iter().flatten() {
        let Some(action) = item.get("index").or_else(|| item.get("create")) else {
            continue;
        };
        let ok = action.get("error").is_none()
            && action
                .get("status")
                .and_then(Value::as_u64)
                .map(|s| (200..300).contains(&s))
                .unwrap_or(true);
        if ok {
            summary.indexed += 1;
            if let Some(id) = action.get("_id").and_then(Value::as_str) {
                summary.ids.push(id.to_string());
            }
        } else {
            summary.failed += 1;
        }
    }
    summary
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn get_by_id(&self, index: &str, id: &str) -> StoreResult<Option<StoredDoc>> {
        let resp = self
            .send("get", index, self.client.get(self.doc_url(index, id)))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::failure("get", index, resp).await);
        }
        let body: Value = Self::json_body("get", index, resp).await?;
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn index_exists(&self, index: &str) -> StoreResult<bool> {
        let resp = self
            .send("exists", index, self.client.head(self.url(index, "")))
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::failure("exists", index, resp).await),
        }
    }

    async fn create_index(&self, index: &str, schema: &Value) -> StoreResult<()> {
        let resp = self
            .send(
                "create_index",
                index,
                self.client.put(self.url(index, "")).json(schema),
            )
            .await?;
        if !resp.status().is_success() {
            return Err(Self::failure("create_index", index, resp).await);
        }
        tracing::info!(index, "index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        let resp = self
            .send("delete_index", index, self.client.delete(self.url(index, "")))
            .await?;
        if !resp.status().is_success() {
            return Err(Self::failure("delete_index", index, resp).await);
        }
        tracing::info!(index, "index deleted");
        Ok(())
    }

    async fn bulk_index(&self, index: &str, docs: &[Value]) -> StoreResult<BulkSummary> {
        if docs.is_empty() {
            return Ok(BulkSummary::default());
        }
        let req = self
            .client
            .post(self.url(index, "_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_payload(docs));
        let resp = self.send("bulk", index, req).await?;
        if !resp.status().is_success() {
            return Err(Self::failure("bulk", index, resp).await);
        }
        let body: Value = Self::json_body("bulk", index, resp).await?;
        let summary = summarize_bulk(&body);
        if summary.failed > 0 {
            tracing::warn!(index, failed = summary.failed, indexed = summary.indexed, "bulk indexing partially failed");
        }
        Ok(summary)
    }

    async fn index_document(&self, index: &str, doc: &Value) -> StoreResult<String> {
        let resp = self
            .send("index", index, self.client.post(self.url(index, "_doc")).json(doc))
            .await?;
        if !resp.status().is_success() {
            return Err(Self::failure("index", index, resp).await);
        }
        let body: Value = Self::json_body("index", index, resp).await?;
        body.get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Malformed("index response without _id".to_string()))
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> StoreResult<()> {
        let resp = self
            .send("delete", index, self.client.delete(self.doc_url(index, id)))
            .await?;
        if !resp.status().is_success() {
            return Err(Self::failure("delete", index, resp).await);
        }
        Ok(())
    }

    async fn clean_index(&self, index: &str) -> StoreResult<u64> {
        let req = self
            .client
            .post(self.url(index, "_delete_by_query"))
            .json(&json!({"query": {"match_all": {}}}));
        let resp = self.send("clean", index, req).await?;
        if !resp.status().is_success() {
            return Err(Self::failure("clean", index, resp).await);
        }
        let body: Value = Self::json_body("clean", index, resp).await?;
        Ok(body.get("deleted").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn refresh(&self, index: &str) -> StoreResult<()> {
        let resp = self
            .send("refresh", index, self.client.post(self.url(index, "_refresh")))
            .await?;
        if !resp.status().is_success() {
            return Err(Self::failure("refresh", index, resp).await);
        }
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> StoreResult<SearchResponse> {
        let resp = self
            .send("search", index, self.client.post(self.url(index, "_search")).json(body))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!(index, "search on missing index");
            return Ok(SearchResponse::default());
        }
        if !resp.status().is_success() {
            return Err(Self::failure("search", index, resp).await);
        }
        Self::json_body("search", index, resp).await
    }

    async fn ping(&self) -> StoreResult<bool> {
        let resp = self
            .send("ping", "", self.client.get(format!("{}/", self.base_url)))
            .await?;
        Ok(resp.status().is_success())
    }
}
