//! Read-only infrastructure views over the node and site indices.

use serde_json::Value;
use std::collections::BTreeMap;

use search_gateway_core::query::{
    customer_nodes_body, ids_body, regions_body, terms_agg_body, vendor_nodes_body,
};
use search_gateway_core::reshape::{
    group_by_vendor, group_sites_by_region, hit_sources, merge_with_builtin_types, RegionSites,
};
use search_gateway_core::store::DocumentStore;

use crate::config::Config;
use crate::error::ApiError;

/// Sites of `customer` grouped by region.
pub async fn regions(
    store: &dyn DocumentStore,
    config: &Config,
    customer: &str,
) -> Result<Vec<RegionSites>, ApiError> {
    let body = regions_body(customer, config.search.size_cap);
    let resp = store.search(&config.indices.sites, &body).await?;
    Ok(group_sites_by_region(&resp))
}

async fn merged_terms(
    store: &dyn DocumentStore,
    config: &Config,
    name: &str,
    field: &str,
) -> Result<Vec<String>, ApiError> {
    let body = terms_agg_body(name, field, config.search.size_cap);
    let resp = store.search(&config.indices.infra_nodes, &body).await?;
    let buckets = resp.buckets(&[name]).unwrap_or_default();
    Ok(merge_with_builtin_types(&buckets))
}

/// Node types seen in the index plus the built-in set.
pub async fn types(store: &dyn DocumentStore, config: &Config) -> Result<Vec<String>, ApiError> {
    merged_terms(store, config, "types", "type.keyword").await
}

/// Node subtypes seen in the index plus the built-in set.
pub async fn subtypes(store: &dyn DocumentStore, config: &Config) -> Result<Vec<String>, ApiError> {
    merged_terms(store, config, "subtypes", "subtype.keyword").await
}

/// Raw node sources of `customer`, or of a `query_string` filter when given.
pub async fn nodes(
    store: &dyn DocumentStore,
    config: &Config,
    customer: &str,
    filter: Option<&str>,
) -> Result<Vec<Value>, ApiError> {
    let body = customer_nodes_body(customer, filter, config.search.size_cap);
    let resp = store.search(&config.indices.infra_nodes, &body).await?;
    Ok(hit_sources(&resp))
}

/// `{vendor: [{name, vendor}]}` for the nodes of `customer`.
pub async fn aggregate(
    store: &dyn DocumentStore,
    config: &Config,
    customer: &str,
) -> Result<BTreeMap<String, Vec<Value>>, ApiError> {
    let body = vendor_nodes_body(customer, config.search.size_cap);
    let resp = store.search(&config.indices.infra_nodes, &body).await?;
    Ok(group_by_vendor(&resp))
}

/// Nodes by a comma-separated id list. Finding none is a 404.
pub async fn network(
    store: &dyn DocumentStore,
    config: &Config,
    ids: &str,
) -> Result<Vec<Value>, ApiError> {
    let ids: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::NotFound("No nodes found".to_string()));
    }
    let body = ids_body(&ids, config.search.size_cap);
    let resp = store.search(&config.indices.infra_nodes, &body).await?;
    let nodes = hit_sources(&resp);
    if nodes.is_empty() {
        return Err(ApiError::NotFound("No nodes found".to_string()));
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_gateway_core::store::memory::InMemoryStore;
    use serde_json::json;

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert("nodes", "n1", json!({"name": "r1", "vendor": "Cisco", "type": "router", "subtype": "edge", "customer": "acme"}));
        store.insert("nodes", "n2", json!({"name": "s1", "type": "firewall", "subtype": "switch", "customer": "acme"}));
        store.insert("nodes", "n3", json!({"name": "x1", "vendor": "Juniper", "type": "router", "customer": "other"}));
        store.insert("sites", "s1", json!({"id": 1, "name": "AMS-1", "region": "EU", "subtype": "dc", "customer": "acme"}));
        store.insert("sites", "s2", json!({"id": 2, "name": "NYC-1", "region": "US", "subtype": "pop", "customer": "acme"}));
        store.insert("sites", "s3", json!({"id": 3, "name": "FRA-1", "region": "EU", "subtype": "dc", "customer": "acme"}));
        store
    }

    #[tokio::test]
    async fn regions_group_in_first_seen_order() {
        let config = Config::minimal("http://localhost:9200");
        let out = regions(&seeded(), &config, "acme").await.unwrap();
        let regions: Vec<&str> = out.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["EU", "US"]);
        assert_eq!(out[0].sites.len(), 2);
        assert_eq!(out[0].sites[1].name, json!("FRA-1"));
    }

    #[tokio::test]
    async fn types_merge_builtins_sorted() {
        let config = Config::minimal("http://localhost:9200");
        let out = types(&seeded(), &config).await.unwrap();
        assert_eq!(out, vec!["csu", "firewall", "router", "switch", "vdc", "vm", "vnf"]);
    }

    #[tokio::test]
    async fn aggregate_groups_unknown_vendor() {
        let config = Config::minimal("http://localhost:9200");
        let out = aggregate(&seeded(), &config, "acme").await.unwrap();
        assert_eq!(out["Cisco"], vec![json!({"name": "r1", "vendor": "Cisco"})]);
        assert_eq!(out["Unknown"], vec![json!({"name": "s1"})]);
        assert!(!out.contains_key("Juniper"));
    }

    #[tokio::test]
    async fn nodes_filter_uses_query_string() {
        let config = Config::minimal("http://localhost:9200");
        let out = nodes(&seeded(), &config, "acme", Some("vendor:Juniper")).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["name"], json!("x1"));
        assert_eq!(nodes(&seeded(), &config, "acme", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn network_missing_ids_is_not_found() {
        let config = Config::minimal("http://localhost:9200");
        let store = seeded();
        assert_eq!(network(&store, &config, "n1,n3").await.unwrap().len(), 2);
        let err = network(&store, &config, "zz").await.unwrap_err();
        assert_eq!(err.to_string(), "No nodes found");
    }
}
