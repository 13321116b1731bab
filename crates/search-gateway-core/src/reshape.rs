//! Reshaping of store responses into the gateway's JSON payloads.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::{value_to_key, Bucket, SearchResponse};
use crate::query::BUILTIN_NODE_TYPES;

/// One entry of a document search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHit {
    pub file_name: String,
}

/// File names of the hits, first occurrence wins. Hits without a
/// `file_name` are skipped.
pub fn dedup_file_names(resp: &SearchResponse) -> Vec<FileHit> {
    let mut seen = HashSet::new();
    resp.sources()
        .filter_map(|s| s.get("file_name"))
        .map(value_to_key)
        .filter(|name| seen.insert(name.clone()))
        .map(|file_name| FileHit { file_name })
        .collect()
}

/// `vendor → subtype → count` from `[vendor, subtype]` buckets.
pub fn vendor_subtype_summary(buckets: &[Bucket]) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut summary: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for bucket in buckets {
        if let [vendor, subtype, ..] = bucket.key.parts()[..] {
            summary
                .entry(vendor.to_string())
                .or_default()
                .insert(subtype.to_string(), bucket.doc_count);
        }
    }
    summary
}

/// A site entry in the regions view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRef {
    pub id: Value,
    pub name: Value,
    pub subtype: Value,
}

/// Sites grouped under one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSites {
    pub region: String,
    pub sites: Vec<SiteRef>,
}

/// Groups site hits by region in first-seen order.
pub fn group_sites_by_region(resp: &SearchResponse) -> Vec<RegionSites> {
    let mut out: Vec<RegionSites> = Vec::new();
    for source in resp.sources() {
        let region = source.get("region").map(value_to_key).unwrap_or_default();
        let site = SiteRef {
            id: source.get("id").cloned().unwrap_or(Value::Null),
            name: source.get("name").cloned().unwrap_or(Value::Null),
            subtype: source.get("subtype").cloned().unwrap_or(Value::Null),
        };
        match out.iter_mut().find(|r| r.region == region) {
            Some(group) => group.sites.push(site),
            None => out.push(RegionSites {
                region,
                sites: vec![site],
            }),
        }
    }
    out
}

/// Bucket keys merged with the built-in node types, sorted and unique.
pub fn merge_with_builtin_types(buckets: &[Bucket]) -> Vec<String> {
    let mut all: BTreeSet<String> = BUILTIN_NODE_TYPES.iter().map(|t| t.to_string()).collect();
    for bucket in buckets {
        all.extend(bucket.key.parts().iter().map(|p| p.to_string()));
    }
    all.into_iter().collect()
}

/// Hit sources grouped by `vendor`, `"Unknown"` when absent.
pub fn group_by_vendor(resp: &SearchResponse) -> BTreeMap<String, Vec<Value>> {
    let mut out: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for source in resp.sources() {
        let vendor = match source.get("vendor") {
            Some(v) if !v.is_null() => value_to_key(v),
            _ => "Unknown".to_string(),
        };
        out.entry(vendor).or_default().push(source.clone());
    }
    out
}

/// Hit sources in ranking order.
pub fn hit_sources(resp: &SearchResponse) -> Vec<Value> {
    resp.sources().cloned().collect()
}
