//! HTTP-level tests: the full router over an in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use search_gateway::auth::{hash_password_with, ConfigUserStore};
use search_gateway::config::{Config, UserEntry};
use search_gateway::server::{build_router, AppState};
use search_gateway_core::error::{StoreError, StoreResult};
use search_gateway_core::models::{BulkSummary, SearchResponse, StoredDoc};
use search_gateway_core::store::memory::InMemoryStore;
use search_gateway_core::store::DocumentStore;

const BOUNDARY: &str = "sgw-test-boundary";

struct Harness {
    app: Router,
    store: Arc<InMemoryStore>,
    cookie: String,
    _uploads: TempDir,
}

fn test_config(uploads: &TempDir) -> Config {
    let mut config = Config::minimal("http://localhost:9200");
    config.server.session_secret = Some("test-secret-0123456789".to_string());
    config.uploads.dir = uploads.path().to_path_buf();
    config.auth.users.push(UserEntry {
        username: "alice".to_string(),
        password_hash: hash_password_with("pw", 1),
    });
    config
}

fn router(config: Config, store: Arc<dyn DocumentStore>) -> Router {
    let users = Arc::new(ConfigUserStore::from_config(&config.auth));
    build_router(AppState::new(config, store, users))
}

async fn login(app: &Router, username: &str, password: &str) -> axum::response::Response {
    let form = format!("username={}&password={}&next=%2Fsearch%3Fq%3Dx", username, password);
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn session_cookie(app: &Router) -> String {
    let resp = login(app, "alice", "pw").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn harness() -> Harness {
    let uploads = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let app = router(test_config(&uploads), store.clone());
    let cookie = session_cookie(&app).await;
    Harness {
        app,
        store,
        cookie,
        _uploads: uploads,
    }
}

/// A harness whose store fails every call addressed to `failing`.
async fn harness_failing(failing: &'static str) -> Harness {
    let uploads = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let wrapped = Arc::new(FailingIndex { inner: store.clone(), failing });
    let app = router(test_config(&uploads), wrapped);
    let cookie = session_cookie(&app).await;
    Harness {
        app,
        store,
        cookie,
        _uploads: uploads,
    }
}

struct FailingIndex {
    inner: Arc<InMemoryStore>,
    failing: &'static str,
}

impl FailingIndex {
    fn check(&self, index: &str) -> StoreResult<()> {
        if index == self.failing {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for FailingIndex {
    async fn get_by_id(&self, index: &str, id: &str) -> StoreResult<Option<StoredDoc>> {
        self.check(index)?;
        self.inner.get_by_id(index, id).await
    }
    async fn index_exists(&self, index: &str) -> StoreResult<bool> {
        self.check(index)?;
        self.inner.index_exists(index).await
    }
    async fn create_index(&self, index: &str, schema: &Value) -> StoreResult<()> {
        self.check(index)?;
        self.inner.create_index(index, schema).await
    }
    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        self.check(index)?;
        self.inner.delete_index(index).await
    }
    async fn bulk_index(&self, index: &str, docs: &[Value]) -> StoreResult<BulkSummary> {
        self.check(index)?;
        self.inner.bulk_index(index, docs).await
    }
    async fn index_document(&self, index: &str, doc: &Value) -> StoreResult<String> {
        self.check(index)?;
        self.inner.index_document(index, doc).await
    }
    async fn delete_by_id(&self, index: &str, id: &str) -> StoreResult<()> {
        self.check(index)?;
        self.inner.delete_by_id(index, id).await
    }
    async fn clean_index(&self, index: &str) -> StoreResult<u64> {
        self.check(index)?;
        self.inner.clean_index(index).await
    }
    async fn refresh(&self, index: &str) -> StoreResult<()> {
        self.check(index)?;
        self.inner.refresh(index).await
    }
    async fn search(&self, index: &str, body: &Value) -> StoreResult<SearchResponse> {
        self.check(index)?;
        self.inner.search(index, body).await
    }
    async fn ping(&self) -> StoreResult<bool> {
        self.inner.ping().await
    }
}

impl Harness {
    async fn send(&self, req: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, uri: &str) -> axum::response::Response {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, &self.cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> axum::response::Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::COOKIE, &self.cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn upload(&self, uri: &str, file_name: &str, content: &[u8]) -> axum::response::Response {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::COOKIE, &self.cookie)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============ Session gate ============

#[tokio::test]
async fn health_is_public() {
    let uploads = TempDir::new().unwrap();
    let app = router(test_config(&uploads), Arc::new(InMemoryStore::new()));
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ok");
}

#[tokio::test]
async fn unauthenticated_requests_redirect_to_login() {
    let uploads = TempDir::new().unwrap();
    let app = router(test_config(&uploads), Arc::new(InMemoryStore::new()));
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/search?q=router")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert_eq!(location, "/login?next=%2Fsearch%3Fq%3Drouter");
}

#[tokio::test]
async fn login_redirects_to_next_and_sets_cookie() {
    let uploads = TempDir::new().unwrap();
    let app = router(test_config(&uploads), Arc::new(InMemoryStore::new()));
    let resp = login(&app, "alice", "pw").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/search?q=x");
    let cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("sgw_session="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn bad_password_shows_the_form_again() {
    let uploads = TempDir::new().unwrap();
    let app = router(test_config(&uploads), Arc::new(InMemoryStore::new()));
    for (user, password) in [("alice", "wrong"), ("mallory", "pw")] {
        let resp = login(&app, user, password).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
        assert!(text_body(resp).await.contains("Invalid username or password"));
    }
}

#[tokio::test]
async fn tampered_cookie_is_rejected() {
    let h = harness().await;
    let mut forged = h.cookie.clone();
    forged.push('0');
    let resp = h
        .send(
            Request::builder()
                .uri("/dashboard")
                .header(header::COOKIE, forged)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn dashboard_and_logout() {
    let h = harness().await;
    let resp = h.get("/dashboard").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(text_body(resp).await.contains("Signed in as alice"));

    let resp = h.get("/logout").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
    let cleared = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

// ============ Search ============

#[tokio::test]
async fn search_returns_unique_file_names() {
    let h = harness().await;
    h.store.insert("datasets", "1", json!({"file_name": "a.txt", "content": "router reboot"}));
    h.store.insert("datasets", "2", json!({"file_name": "a.txt", "content": "router config"}));
    h.store.insert("datasets", "3", json!({"file_name": "b.pdf", "content": "router audit"}));
    h.store.insert("datasets", "4", json!({"file_name": "c.docx", "content": "switch"}));

    let resp = h.get("/search?q=router").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let hits = json_body(resp).await;
    let mut names: Vec<&str> = hits
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["file_name"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.pdf"]);

    let all = json_body(h.get("/search?type=match_all").await).await;
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn search_rejects_unknown_mode() {
    let h = harness().await;
    let resp = h.get("/search?q=router&type=fuzzy").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await, json!({"error": "Invalid search type"}));
}

// ============ Uploads ============

#[tokio::test]
async fn text_upload_is_indexed_and_listed() {
    let h = harness().await;
    let resp = h.upload("/upload-to-es", "notes.txt", b"router maintenance window").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["message"], "File indexed successfully");
    assert!(body["id"].as_str().is_some());
    assert_eq!(h.store.len("datasets"), 1);

    let listed = json_body(h.get("/uploaded-docs").await).await;
    assert_eq!(listed, json!(["notes.txt"]));

    let hits = json_body(h.get("/search?q=maintenance").await).await;
    assert_eq!(hits, json!([{"file_name": "notes.txt"}]));
}

#[tokio::test]
async fn upload_rejects_unsupported_and_empty_files() {
    let h = harness().await;
    let resp = h.upload("/upload-to-es", "image.png", b"\x89PNG").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "Unsupported file format");

    let resp = h.upload("/upload-to-es", "blank.txt", b"   \n").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h.upload("/upload-to-es", "", b"data").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.store.len("datasets"), 0);
}

#[tokio::test]
async fn upload_without_multipart_body_is_rejected() {
    let h = harness().await;
    let resp = h.post_json("/upload-to-es", json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn csv_preview_returns_encoded_table() {
    let h = harness().await;
    let resp = h.upload("/upload", "hosts.csv", b"host,site\nedge-1,AMS\n").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["filename"], "hosts.csv");
    let html = urlencoding::decode(body["table"].as_str().unwrap())
        .unwrap()
        .into_owned();
    assert!(html.starts_with("<table"));
    assert!(html.contains("<td>edge-1</td>"));
}

#[tokio::test]
async fn preview_rejects_text_files() {
    let h = harness().await;
    let resp = h.upload("/upload", "notes.txt", b"hello").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ============ Inventory ============

fn seed_inventory(store: &InMemoryStore) {
    store.insert("nodes_index", "n1", json!({"name": "r1", "oem": "A", "subtype": "router", "status": "up"}));
    store.insert("nodes_index", "n2", json!({"name": "s1", "oem": "A", "subtype": "switch", "status": "down"}));
}

#[tokio::test]
async fn inventory_summary_groups_by_vendor() {
    let h = harness().await;
    seed_inventory(&h.store);
    let resp = h.post_json("/api/inventory/acme/summary", json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"A": {"router": 1, "switch": 1}}));
}

#[tokio::test]
async fn inventory_list_validates_page_args() {
    let h = harness().await;
    seed_inventory(&h.store);
    let resp = h
        .post_json("/api/inventory/acme/list", json!({"page": 0, "size": 10}))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await,
        json!({"error": "Page and size should be greater than 0"})
    );

    let resp = h
        .post_json(
            "/api/inventory/acme/list",
            json!({"page": 1, "size": 1, "sort_by": [{"name": "asc"}]}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = json_body(resp).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["name"], "r1");
}

#[tokio::test]
async fn inventory_malformed_body_is_a_bad_request() {
    let h = harness().await;
    let resp = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/inventory/acme/summary")
                .header(header::COOKIE, &h.cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inventory_export_is_an_attachment() {
    let h = harness().await;
    seed_inventory(&h.store);
    let resp = h.post_json("/api/inventory/acme/export", json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        resp.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=inventory_export_acme.json"
    );
    let body = json_body(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_inventory_node_is_not_found() {
    let h = harness().await;
    seed_inventory(&h.store);
    let resp = h.get("/api/inventory/acme/missing-node").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(resp).await,
        json!({"error": "Node with provided id doesn't exist"})
    );
}

#[tokio::test]
async fn inventory_detail_survives_failed_alarm_lookup() {
    let h = harness_failing("alarms_index").await;
    seed_inventory(&h.store);
    h.store.insert("incidents_index", "i1", json!({"node_id": "n1", "priority": "P2"}));
    let resp = h.get("/api/inventory/acme/n1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["alarms"], json!({}));
    assert_eq!(body["degraded"], json!(["alarms"]));
    assert_eq!(body["incidents"], json!([{"key": "P2", "doc_count": 1}]));
}

#[tokio::test]
async fn inventory_detail_with_unreachable_node_index_is_unavailable() {
    let h = harness_failing("nodes_index").await;
    seed_inventory(&h.store);
    let resp = h.get("/api/inventory/acme/n1").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(json_body(resp).await["error"].is_string());
}

// ============ Infra ============

#[tokio::test]
async fn infra_network_without_matches_is_not_found() {
    let h = harness().await;
    h.store.insert("nodes", "x1", json!({"name": "core-1", "type": "router"}));
    let resp = h.get("/api/infra/acme/network/nope,also-nope").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await, json!({"error": "No nodes found"}));

    let resp = h.get("/api/infra/acme/network/x1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!([{"name": "core-1", "type": "router"}]));
}

#[tokio::test]
async fn infra_types_merge_seen_and_builtin() {
    let h = harness().await;
    let empty = json_body(h.get("/api/infra/acme/types").await).await;
    let builtin: Vec<Value> = search_gateway_core::query::BUILTIN_NODE_TYPES
        .iter()
        .map(|t| json!(t))
        .collect();
    assert_eq!(empty.as_array().unwrap().len(), builtin.len());

    h.store.insert("nodes", "x1", json!({"name": "core-1", "type": "zz-custom"}));
    let resp = h.get("/api/infra/acme/types").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let types = json_body(resp).await;
    assert!(types.as_array().unwrap().contains(&json!("zz-custom")));
}
