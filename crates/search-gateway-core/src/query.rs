//! Builders for the fixed query bodies the gateway sends to the store.
//!
//! Every endpoint issues exactly one of these shapes; keeping them here
//! lets the HTTP client and the in-memory store be tested against the
//! same bodies.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Node types always reported by the infra `types`/`subtypes` endpoints.
pub const BUILTIN_NODE_TYPES: [&str; 6] = ["router", "vdc", "vm", "csu", "switch", "vnf"];

/// Free-text search modes over the document index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Match,
    MatchAll,
    Wildcard,
}

impl SearchMode {
    /// Whether a blank query short-circuits to an empty result. Only
    /// `match` does; a blank wildcard becomes `**`.
    pub fn needs_query(&self) -> bool {
        matches!(self, SearchMode::Match)
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match" => Ok(SearchMode::Match),
            "match_all" => Ok(SearchMode::MatchAll),
            "wildcard" => Ok(SearchMode::Wildcard),
            other => Err(format!("invalid search type: {}", other)),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Match => "match",
            SearchMode::MatchAll => "match_all",
            SearchMode::Wildcard => "wildcard",
        })
    }
}

/// Settings and mappings of the uploaded-documents index.
pub fn documents_index_schema() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "properties": {
                "file_name": {"type": "text"},
                "file_type": {"type": "keyword"},
                "upload_time": {"type": "date"},
                "content": {"type": "text"}
            }
        }
    })
}

/// Document search body for `mode`. Only `file_name` is fetched.
pub fn document_search_body(mode: SearchMode, text: &str, size: usize) -> Value {
    let query = match mode {
        SearchMode::Match => json!({"match": {"content": text}}),
        SearchMode::MatchAll => json!({"match_all": {}}),
        SearchMode::Wildcard => json!({"wildcard": {"content": format!("*{}*", text)}}),
    };
    json!({
        "query": query,
        "size": size,
        "_source": ["file_name"]
    })
}

/// Turns an optional request filter into a query; absent or empty means all.
pub fn filter_query(filter: Option<&Value>) -> Value {
    match filter {
        Some(Value::Object(m)) if !m.is_empty() => Value::Object(m.clone()),
        _ => json!({"match_all": {}}),
    }
}

/// Normalizes a `sort_by` value into a sort array.
pub fn sort_clause(sort_by: Option<&Value>) -> Value {
    match sort_by {
        Some(Value::Array(items)) => Value::Array(items.clone()),
        Some(Value::Null) | None => json!([]),
        Some(other) => json!([other]),
    }
}

fn customer_query(customer: &str) -> Value {
    json!({"match": {"customer": customer}})
}

/// Sites of a customer with the fields the regions view needs.
pub fn regions_body(customer: &str, size: usize) -> Value {
    json!({
        "query": customer_query(customer),
        "_source": ["region", "name", "site", "subtype", "id"],
        "size": size
    })
}

/// A hits-free terms aggregation named `name` over `field`.
pub fn terms_agg_body(name: &str, field: &str, size: usize) -> Value {
    json!({
        "size": 0,
        "aggs": {
            name: {"terms": {"field": field, "size": size}}
        }
    })
}

/// Nodes of a customer, or a `query_string` search when `filter` is set.
pub fn customer_nodes_body(customer: &str, filter: Option<&str>, size: usize) -> Value {
    let query = match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => json!({"query_string": {"query": f}}),
        None => customer_query(customer),
    };
    json!({"query": query, "size": size})
}

/// Nodes of a customer, reduced to name and vendor.
pub fn vendor_nodes_body(customer: &str, size: usize) -> Value {
    json!({
        "size": size,
        "query": customer_query(customer),
        "_source": ["name", "vendor"]
    })
}

/// Direct lookup of several node ids.
pub fn ids_body(ids: &[String], size: usize) -> Value {
    json!({
        "query": {"ids": {"values": ids}},
        "size": size
    })
}

/// Vendor × subtype counts under a `bool` filter.
pub fn summary_body(bool_filter: Option<&Value>, buckets: usize) -> Value {
    let bool_body = match bool_filter {
        Some(Value::Object(m)) => Value::Object(m.clone()),
        _ => json!({}),
    };
    json!({
        "size": 0,
        "aggs": {
            "filter": {
                "filter": {"bool": bool_body},
                "aggs": {
                    "vendor": {
                        "multi_terms": {
                            "terms": [{"field": "oem"}, {"field": "subtype"}],
                            "size": buckets
                        }
                    }
                }
            }
        }
    })
}

/// One page of an inventory listing.
pub fn list_body(filter: Option<&Value>, sort_by: Option<&Value>, from: usize, size: usize) -> Value {
    json!({
        "from": from,
        "size": size,
        "query": filter_query(filter),
        "sort": sort_clause(sort_by)
    })
}

/// Everything an export returns, up to `size`.
pub fn export_body(filter: Option<&Value>, sort_by: Option<&Value>, size: usize) -> Value {
    json!({
        "size": size,
        "query": filter_query(filter),
        "sort": sort_clause(sort_by)
    })
}

/// Buckets of `field` over the records linked to a node.
pub fn related_terms_body(node_id: &str, field: &str) -> Value {
    json!({
        "query": {"match": {"node_id": node_id}},
        "aggs": {field: {"terms": {"field": field}}},
        "size": 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_mode_parses_known_names_only() {
        assert_eq!("match".parse::<SearchMode>(), Ok(SearchMode::Match));
        assert_eq!("match_all".parse::<SearchMode>(), Ok(SearchMode::MatchAll));
        assert_eq!("wildcard".parse::<SearchMode>(), Ok(SearchMode::Wildcard));
        assert!("fuzzy".parse::<SearchMode>().is_err());
        assert!("".parse::<SearchMode>().is_err());
    }

    #[test]
    fn wildcard_wraps_query_in_stars() {
        let body = document_search_body(SearchMode::Wildcard, "rev", 50);
        assert_eq!(body["query"]["wildcard"]["content"], "*rev*");
        assert_eq!(body["size"], 50);
    }

    #[test]
    fn match_all_ignores_text() {
        let body = document_search_body(SearchMode::MatchAll, "ignored", 10);
        assert_eq!(body["query"], json!({"match_all": {}}));
        assert!(!SearchMode::MatchAll.needs_query());
    }

    #[test]
    fn only_match_needs_query_text() {
        assert!(SearchMode::Match.needs_query());
        assert!(!SearchMode::Wildcard.needs_query());
        let body = document_search_body(SearchMode::Wildcard, "", 10);
        assert_eq!(body["query"], json!({"wildcard": {"content": "**"}}));
    }

    #[test]
    fn empty_filter_means_match_all() {
        assert_eq!(filter_query(None), json!({"match_all": {}}));
        assert_eq!(filter_query(Some(&json!({}))), json!({"match_all": {}}));
        let q = json!({"term": {"vendor": "A"}});
        assert_eq!(filter_query(Some(&q)), q);
    }

    #[test]
    fn list_body_pages_and_sorts() {
        let body = list_body(None, Some(&json!({"name": "asc"})), 20, 10);
        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert_eq!(body["sort"], json!([{"name": "asc"}]));
    }

    #[test]
    fn nodes_filter_switches_to_query_string() {
        let plain = customer_nodes_body("acme", Some("  "), 100);
        assert_eq!(plain["query"], json!({"match": {"customer": "acme"}}));
        let filtered = customer_nodes_body("acme", Some("vendor:A"), 100);
        assert_eq!(filtered["query"]["query_string"]["query"], "vendor:A");
    }
}
