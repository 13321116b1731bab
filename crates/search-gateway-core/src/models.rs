//! Core data models shared by the gateway and its store implementations.
//!
//! Response types mirror the JSON shapes Elasticsearch returns, so the
//! HTTP client and the in-memory store produce identical structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// File formats known to the ingestion and preview paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Txt,
    Csv,
    Xlsx,
    Xls,
    Docx,
    Pdf,
}

impl FileType {
    /// Resolves a file name's extension, case-insensitively.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }

    /// Formats accepted for indexing. Spreadsheets are preview-only.
    pub fn is_indexable(&self) -> bool {
        matches!(self, Self::Txt | Self::Csv | Self::Docx | Self::Pdf)
    }

    /// Formats accepted by the table preview.
    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::Csv | Self::Xlsx | Self::Xls)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An ingested file as stored in the document index.
///
/// `file_type` is stored as the dotted extension (`".pdf"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub file_name: String,
    #[serde(with = "dotted_file_type")]
    pub file_type: FileType,
    pub upload_time: DateTime<Utc>,
    pub content: String,
}

mod dotted_file_type {
    use super::FileType;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ft: &FileType, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!(".{}", ft.extension()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<FileType, D::Error> {
        let raw = String::deserialize(d)?;
        FileType::from_extension(&raw)
            .ok_or_else(|| D::Error::custom(format!("unknown file type: {}", raw)))
    }
}

/// A single `{name, value}` pair in a node's attribute list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttribute {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// An inventory node. Written by an external collector; read-only here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub vendor: Option<Value>,
    #[serde(default)]
    pub oem: Option<Value>,
    #[serde(default, rename = "type")]
    pub node_type: Option<Value>,
    #[serde(default)]
    pub subtype: Option<Value>,
    #[serde(default)]
    pub region: Option<Value>,
    #[serde(default)]
    pub site: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub customer: Option<Value>,
    #[serde(default)]
    pub cloud_node: Option<Value>,
    #[serde(default)]
    pub physical: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<NodeAttribute>,
}

/// A raw document fetched by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// The `hits` section of a search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default, deserialize_with = "deserialize_total")]
    pub total: u64,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// Accepts both `{"value": n, "relation": ..}` and a bare integer.
fn deserialize_total<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match raw {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::Object(map) => map.get("value").and_then(Value::as_u64).unwrap_or(0),
        _ => 0,
    })
}

/// A search response: hits plus the raw aggregation tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Hits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
}

impl SearchResponse {
    /// Iterates hit sources in ranking order.
    pub fn sources(&self) -> impl Iterator<Item = &Value> {
        self.hits.hits.iter().map(|h| &h.source)
    }

    /// Buckets of the aggregation at `path` (e.g. `["filter", "vendor"]`).
    ///
    /// Returns `None` when the response has no aggregations or the path
    /// does not resolve to a bucket array.
    pub fn buckets(&self, path: &[&str]) -> Option<Vec<Bucket>> {
        let mut node = self.aggregations.as_ref()?;
        for segment in path {
            node = node.get(segment)?;
        }
        let raw = node.get("buckets")?.as_array()?;
        Some(raw.iter().filter_map(Bucket::from_value).collect())
    }
}

/// A bucket key: plain for `terms`, composite for `multi_terms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum BucketKey {
    Single(String),
    Multi(Vec<String>),
}

impl BucketKey {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Array(parts) => Some(Self::Multi(parts.iter().map(value_to_key).collect())),
            Value::Null => None,
            other => Some(Self::Single(value_to_key(other))),
        }
    }

    /// The key as a list of parts; a single key is a one-element list.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Self::Single(k) => vec![k.as_str()],
            Self::Multi(ks) => ks.iter().map(String::as_str).collect(),
        }
    }
}

/// Renders a scalar as a bucket key string (numbers and bools included).
pub fn value_to_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One aggregation bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub key: BucketKey,
    pub doc_count: u64,
}

impl Bucket {
    pub fn from_value(v: &Value) -> Option<Self> {
        Some(Self {
            key: BucketKey::from_value(v.get("key")?)?,
            doc_count: v.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
        })
    }
}

/// Outcome of a bulk index call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub indexed: usize,
    pub failed: usize,
    /// Ids assigned to successfully indexed documents, in request order.
    pub ids: Vec<String>,
}

/// Picks the listed top-level fields from a JSON object (`_source` filtering).
pub fn project_fields(source: &Value, fields: &[String]) -> Value {
    match source {
        Value::Object(map) => {
            let picked: Map<String, Value> = fields
                .iter()
                .filter_map(|f| map.get(f).map(|v| (f.clone(), v.clone())))
                .collect();
            Value::Object(picked)
        }
        other => other.clone(),
    }
}
