//! Inventory endpoints over the `nodes_index` family of indices.
//!
//! Summary, paginated listing, export and the per-node detail view. The
//! detail view composes the node with three related aggregations (alarms,
//! incidents, change requests); each of those degrades to `{}` on failure
//! and is named in `degraded`.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use search_gateway_core::models::{Node, NodeAttribute};
use search_gateway_core::query::{export_body, list_body, related_terms_body, summary_body};
use search_gateway_core::reshape::{hit_sources, vendor_subtype_summary};
use search_gateway_core::store::DocumentStore;

use crate::config::Config;
use crate::error::ApiError;

pub const NODE_NOT_FOUND: &str = "Node with provided id doesn't exist";
const LAST_MODIFIED_ON: &str = "LAST_MODIFIED_ON";

#[derive(Debug, Default, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub filter: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub sort_by: Option<Value>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

fn default_page() -> i64 {
    1
}
fn default_page_size() -> i64 {
    10
}

impl ListRequest {
    /// `(from, size)` for the store query.
    pub fn window(&self) -> Result<(usize, usize), ApiError> {
        if self.page < 1 || self.size < 1 {
            return Err(ApiError::InvalidPageArgs);
        }
        let size = self.size as usize;
        let from = (self.page as usize - 1)
            .checked_mul(size)
            .ok_or(ApiError::InvalidPageArgs)?;
        Ok((from, size))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub sort_by: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ListPage {
    pub total: u64,
    pub items: Vec<Value>,
}

/// A rendered export file.
#[derive(Debug)]
pub struct Export {
    pub filename: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct NodeDetail {
    pub name: Option<Value>,
    pub status: Option<Value>,
    pub vendor: Option<Value>,
    pub oem: Option<Value>,
    #[serde(rename = "type")]
    pub node_type: Option<Value>,
    pub site: Option<Value>,
    pub subtype: Option<Value>,
    pub region: Option<Value>,
    pub cloud_node: Option<Value>,
    pub physical: Option<Value>,
    pub attributes: Vec<NodeAttribute>,
    pub alarms: Value,
    pub incidents: Value,
    pub changes: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

/// `{vendor: {subtype: count}}` under the request's bool filter.
pub async fn summary(
    store: &dyn DocumentStore,
    config: &Config,
    req: &SummaryRequest,
) -> Result<BTreeMap<String, BTreeMap<String, u64>>, ApiError> {
    let body = summary_body(req.filter.as_ref(), config.search.summary_buckets);
    let resp = store.search(&config.indices.inventory_nodes, &body).await?;
    let buckets = resp.buckets(&["filter", "vendor"]).unwrap_or_default();
    Ok(vendor_subtype_summary(&buckets))
}

pub async fn list(
    store: &dyn DocumentStore,
    config: &Config,
    req: &ListRequest,
) -> Result<ListPage, ApiError> {
    let (from, size) = req.window()?;
    let body = list_body(req.filter.as_ref(), req.sort_by.as_ref(), from, size);
    let resp = store.search(&config.indices.inventory_nodes, &body).await?;
    Ok(ListPage {
        total: resp.hits.total,
        items: hit_sources(&resp),
    })
}

/// Everything matching the filter, up to the size cap, as pretty JSON.
pub async fn export(
    store: &dyn DocumentStore,
    config: &Config,
    customer: &str,
    req: &ExportRequest,
) -> Result<Export, ApiError> {
    let body = export_body(req.filter.as_ref(), req.sort_by.as_ref(), config.search.size_cap);
    let resp = store.search(&config.indices.inventory_nodes, &body).await?;
    let items = hit_sources(&resp);
    tracing::info!(customer, count = items.len(), "inventory export");
    let body = serde_json::to_string_pretty(&items).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Export {
        filename: format!("inventory_export_{}.json", export_slug(customer)),
        body,
    })
}

/// Keeps the attachment file name a plain token.
fn export_slug(customer: &str) -> String {
    customer
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Epoch seconds → `YYYY-MM-DD HH:MM:SS` (UTC).
fn format_epoch(value: &Value) -> Option<String> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    let dt = DateTime::from_timestamp(whole as i64, nanos)?;
    Some(dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Renders `LAST_MODIFIED_ON` as a UTC timestamp. Unparseable values are kept.
pub fn format_attributes(mut attributes: Vec<NodeAttribute>) -> Vec<NodeAttribute> {
    for attr in attributes.iter_mut().filter(|a| a.name == LAST_MODIFIED_ON) {
        match format_epoch(&attr.value) {
            Some(formatted) => attr.value = Value::String(formatted),
            None => tracing::debug!(value = %attr.value, "cannot parse LAST_MODIFIED_ON"),
        }
    }
    attributes
}

/// Buckets of one related aggregation, or `{}` when the response has none.
async fn related_buckets(
    store: &dyn DocumentStore,
    index: &str,
    node_id: &str,
    field: &str,
) -> Result<Value, ApiError> {
    let resp = store.search(index, &related_terms_body(node_id, field)).await?;
    Ok(match resp.aggregations.as_ref().and_then(|a| a.get(field)) {
        Some(agg) => agg.get("buckets").cloned().unwrap_or_else(|| json!([])),
        None => json!({}),
    })
}

/// A node with its formatted attributes and related record counts.
pub async fn node_detail(
    store: &dyn DocumentStore,
    config: &Config,
    node_id: &str,
) -> Result<NodeDetail, ApiError> {
    let doc = store
        .get_by_id(&config.indices.inventory_nodes, node_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(NODE_NOT_FOUND.to_string()))?;
    let node: Node = serde_json::from_value(doc.source)
        .map_err(|e| ApiError::Internal(format!("malformed node document: {}", e)))?;

    let indices = &config.indices;
    let related = [
        ("alarms", indices.alarms.as_str(), "severity"),
        ("incidents", indices.incidents.as_str(), "priority"),
        ("changes", indices.change_requests.as_str(), "status"),
    ];
    let mut results = Vec::with_capacity(related.len());
    let mut degraded = Vec::new();
    for (name, index, field) in related {
        match related_buckets(store, index, node_id, field).await {
            Ok(v) => results.push(v),
            Err(e) => {
                tracing::warn!(node_id, related = name, error = %e, "related aggregation failed");
                degraded.push(name.to_string());
                results.push(json!({}));
            }
        }
    }
    let mut results = results.into_iter();
    let mut next = || results.next().unwrap_or_else(|| json!({}));

    Ok(NodeDetail {
        name: node.name,
        status: node.status,
        vendor: node.vendor,
        oem: node.oem,
        node_type: node.node_type,
        site: node.site,
        subtype: node.subtype,
        region: node.region,
        cloud_node: node.cloud_node,
        physical: node.physical,
        attributes: format_attributes(node.attributes),
        alarms: next(),
        incidents: next(),
        changes: next(),
        degraded,
    })
}
