//! Elasticsearch client tests against a mock cluster served by axum.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use search_gateway::config::StoreConfig;
use search_gateway::es::ElasticsearchStore;
use search_gateway_core::error::StoreError;
use search_gateway_core::store::DocumentStore;

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<String>>>,
    auth: Arc<Mutex<Option<String>>>,
}

impl Seen {
    fn record(&self, line: String) {
        self.requests.lock().unwrap().push(line);
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn root(State(seen): State<Seen>, headers: HeaderMap) -> Json<Value> {
    *seen.auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(json!({"cluster_name": "mock", "tagline": "You Know, for Search"}))
}

async fn index_head(Path(index): Path<String>) -> StatusCode {
    if index == "docs" {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn index_put(
    State(seen): State<Seen>,
    Path(index): Path<String>,
    Json(schema): Json<Value>,
) -> impl IntoResponse {
    seen.record(format!("PUT {} {}", index, schema));
    if index == "docs" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"type": "resource_already_exists_exception", "reason": "index [docs] already exists"}, "status": 400})),
        );
    }
    (StatusCode::OK, Json(json!({"acknowledged": true})))
}

async fn index_delete(Path(index): Path<String>) -> impl IntoResponse {
    if index == "docs" {
        (StatusCode::OK, Json(json!({"acknowledged": true})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"type": "index_not_found_exception", "reason": format!("no such index [{}]", index)}, "status": 404})),
        )
    }
}

async fn doc_get(Path((index, id)): Path<(String, String)>) -> impl IntoResponse {
    if id == "1" {
        (
            StatusCode::OK,
            Json(json!({"_index": index, "_id": "1", "found": true, "_source": {"file_name": "a.txt"}})),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"_index": index, "_id": id, "found": false})),
        )
    }
}

async fn doc_delete(Path((_index, id)): Path<(String, String)>) -> impl IntoResponse {
    if id == "1" {
        (StatusCode::OK, Json(json!({"result": "deleted"})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"result": "not_found"})))
    }
}

async fn doc_post(
    State(seen): State<Seen>,
    Path(index): Path<String>,
    Json(doc): Json<Value>,
) -> impl IntoResponse {
    seen.record(format!("POST {}/_doc {}", index, doc));
    (StatusCode::CREATED, Json(json!({"_id": "gen-1", "result": "created"})))
}

async fn bulk(
    State(seen): State<Seen>,
    Path(index): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    seen.record(format!("BULK {} {}", index, content_type));
    let docs = body.lines().filter(|l| !l.is_empty()).count() / 2;
    let items: Vec<Value> = (0..docs)
        .map(|i| {
            if i == 1 {
                json!({"index": {"status": 400, "error": {"type": "mapper_parsing_exception"}}})
            } else {
                json!({"index": {"_id": format!("b{}", i), "status": 201}})
            }
        })
        .collect();
    Json(json!({"errors": docs > 1, "items": items}))
}

async fn search(
    State(seen): State<Seen>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    seen.record(format!("SEARCH {} {}", index, body));
    match index.as_str() {
        "missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"type": "index_not_found_exception"}, "status": 404})),
        ),
        "bad" => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"root_cause": [], "type": "parsing_exception", "reason": "unknown query [foo]"}, "status": 400})),
        ),
        "broken" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"type": "search_phase_execution_exception"}, "status": 500})),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "took": 1,
                "hits": {
                    "total": {"value": 2, "relation": "eq"},
                    "hits": [
                        {"_id": "1", "_source": {"file_name": "a.txt"}},
                        {"_id": "2", "_source": {"file_name": "b.pdf"}}
                    ]
                },
                "aggregations": {"types": {"buckets": [{"key": "router", "doc_count": 2}]}}
            })),
        ),
    }
}

async fn refresh(Path(index): Path<String>) -> impl IntoResponse {
    if index == "docs" {
        (StatusCode::OK, Json(json!({"_shards": {"total": 1}})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error": "no such index"})))
    }
}

async fn delete_by_query(Path(_index): Path<String>) -> Json<Value> {
    Json(json!({"deleted": 3}))
}

async fn mock_cluster() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/{index}",
            get(index_head).put(index_put).delete(index_delete),
        )
        .route("/{index}/_doc", post(doc_post))
        .route("/{index}/_doc/{id}", get(doc_get).delete(doc_delete))
        .route("/{index}/_bulk", post(bulk))
        .route("/{index}/_search", post(search))
        .route("/{index}/_refresh", post(refresh))
        .route("/{index}/_delete_by_query", post(delete_by_query))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

fn store_config(url: &str) -> StoreConfig {
    StoreConfig {
        url: url.to_string(),
        username: None,
        password: None,
        timeout_secs: 5,
    }
}

async fn client() -> (ElasticsearchStore, Seen) {
    let (url, seen) = mock_cluster().await;
    // Trailing slash is tolerated.
    let store = ElasticsearchStore::new(&store_config(&format!("{}/", url))).unwrap();
    (store, seen)
}

#[tokio::test]
async fn ping_and_basic_auth() {
    let (url, seen) = mock_cluster().await;
    let mut config = store_config(&url);
    config.username = Some("elastic".to_string());
    config.password = Some("changeme".to_string());
    let store = ElasticsearchStore::new(&config).unwrap();

    assert!(store.ping().await.unwrap());
    let auth = seen.auth.lock().unwrap().clone().unwrap();
    // base64("elastic:changeme")
    assert_eq!(auth, "Basic ZWxhc3RpYzpjaGFuZ2VtZQ==");
}

#[tokio::test]
async fn get_by_id_found_and_missing() {
    let (store, _) = client().await;
    let doc = store.get_by_id("docs", "1").await.unwrap().unwrap();
    assert_eq!(doc.id, "1");
    assert_eq!(doc.source["file_name"], "a.txt");
    assert!(store.get_by_id("docs", "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn index_lifecycle() {
    let (store, seen) = client().await;
    assert!(store.index_exists("docs").await.unwrap());
    assert!(!store.index_exists("other").await.unwrap());

    store
        .create_index("other", &json!({"mappings": {"properties": {}}}))
        .await
        .unwrap();
    assert!(seen.requests().iter().any(|r| r.starts_with("PUT other ")));

    match store.create_index("docs", &json!({})).await {
        Err(StoreError::Rejected { status, reason }) => {
            assert_eq!(status, 400);
            assert_eq!(reason, "index [docs] already exists");
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    store.delete_index("docs").await.unwrap();
    assert!(matches!(
        store.delete_index("gone").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn index_document_returns_generated_id() {
    let (store, seen) = client().await;
    let id = store
        .index_document("docs", &json!({"file_name": "a.txt"}))
        .await
        .unwrap();
    assert_eq!(id, "gen-1");
    assert!(seen
        .requests()
        .contains(&"POST docs/_doc {\"file_name\":\"a.txt\"}".to_string()));
}

#[tokio::test]
async fn bulk_reports_per_item_failures() {
    let (store, seen) = client().await;
    let docs = vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})];
    let summary = store.bulk_index("docs", &docs).await.unwrap();
    assert_eq!(summary.indexed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.ids, vec!["b0", "b2"]);
    assert!(seen
        .requests()
        .contains(&"BULK docs application/x-ndjson".to_string()));

    let empty = store.bulk_index("docs", &[]).await.unwrap();
    assert_eq!(empty.indexed, 0);
    assert_eq!(seen.requests().iter().filter(|r| r.starts_with("BULK")).count(), 1);
}

#[tokio::test]
async fn search_parses_hits_and_aggregations() {
    let (store, seen) = client().await;
    let body = json!({"query": {"match_all": {}}, "size": 2});
    let resp = store.search("docs", &body).await.unwrap();
    assert_eq!(resp.hits.total, 2);
    assert_eq!(resp.hits.hits.len(), 2);
    assert!(resp.aggregations.is_some());
    assert!(seen
        .requests()
        .contains(&format!("SEARCH docs {}", body)));
}

#[tokio::test]
async fn search_on_missing_index_is_empty() {
    let (store, _) = client().await;
    let resp = store
        .search("missing", &json!({"query": {"match_all": {}}}))
        .await
        .unwrap();
    assert_eq!(resp.hits.total, 0);
    assert!(resp.hits.hits.is_empty());
}

#[tokio::test]
async fn search_errors_carry_status_and_reason() {
    let (store, _) = client().await;
    match store.search("bad", &json!({"query": {"foo": {}}})).await {
        Err(StoreError::Rejected { status, reason }) => {
            assert_eq!(status, 400);
            assert_eq!(reason, "unknown query [foo]");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    match store.search("broken", &json!({})).await {
        Err(StoreError::Rejected { status, reason }) => {
            assert_eq!(status, 500);
            assert_eq!(reason, "search_phase_execution_exception");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn refresh_clean_and_delete_document() {
    let (store, _) = client().await;
    store.refresh("docs").await.unwrap();
    assert!(matches!(store.refresh("gone").await, Err(StoreError::NotFound(_))));
    assert_eq!(store.clean_index("docs").await.unwrap(), 3);
    store.delete_by_id("docs", "1").await.unwrap();
    assert!(matches!(
        store.delete_by_id("docs", "2").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn unreachable_cluster_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = ElasticsearchStore::new(&store_config(&format!("http://{}", addr))).unwrap();
    assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
    assert!(matches!(
        store.search("docs", &json!({})).await,
        Err(StoreError::Unavailable(_))
    ));
}
