//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`/`POST` | `/login` | Login form / credential check |
//! | `GET`  | `/logout` | Clear the session |
//! | `GET`  | `/`, `/dashboard` | Landing page |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/upload` | csv/xlsx preview as an HTML table |
//! | `POST` | `/upload-to-es` | Ingest a txt/csv/docx/pdf file |
//! | `GET`  | `/uploaded-docs` | Saved upload names |
//! | `GET`  | `/search?q=&type=` | Document search |
//! | `GET`  | `/api/infra/{customer}/{regions,types,subtypes,nodes,aggregate}` | Infra views |
//! | `GET`  | `/api/infra/{customer}/network/{ids}` | Nodes by id list |
//! | `POST` | `/api/inventory/{customer}/{summary,list,export}` | Inventory views |
//! | `GET`  | `/api/inventory/{customer}/{node_id}` | Node detail |
//!
//! Everything except `/login` and `/health` sits behind the session guard.
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Invalid search type" }
//! ```

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, Query, State,
    },
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use search_gateway_core::store::DocumentStore;

use crate::auth::{ConfigUserStore, UserStore};
use crate::config::Config;
use crate::error::ApiError;
use crate::es::ElasticsearchStore;
use crate::session::{self, CurrentUser};
use crate::tabular::escape_html;
use crate::{infra, ingest, inventory, search};

/// Multipart framing allowance on top of `uploads.max_bytes`.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, users: Arc<dyn UserStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            users,
        }
    }
}

/// Builds the full router: public routes, guarded routes, tracing and CORS.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.uploads.max_bytes.saturating_add(MULTIPART_OVERHEAD);

    let guarded = Router::new()
        .route("/", get(handle_dashboard))
        .route("/dashboard", get(handle_dashboard))
        .route("/logout", get(handle_logout))
        .route("/upload", post(handle_upload_preview))
        .route("/upload-to-es", post(handle_upload_to_es))
        .route("/uploaded-docs", get(handle_uploaded_docs))
        .route("/search", get(handle_search))
        .route("/api/infra/{customer}/regions", get(handle_regions))
        .route("/api/infra/{customer}/types", get(handle_types))
        .route("/api/infra/{customer}/subtypes", get(handle_subtypes))
        .route("/api/infra/{customer}/nodes", get(handle_nodes))
        .route("/api/infra/{customer}/aggregate", get(handle_aggregate))
        .route("/api/infra/{customer}/network/{ids}", get(handle_network))
        .route("/api/inventory/{customer}/summary", post(handle_summary))
        .route("/api/inventory/{customer}/list", post(handle_list))
        .route("/api/inventory/{customer}/export", post(handle_export))
        .route("/api/inventory/{customer}/{node_id}", get(handle_node_detail))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_login,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/login", get(handle_login_page).post(handle_login))
        .route("/health", get(handle_health))
        .merge(guarded)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the server on `[server].bind` against the configured cluster.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = ElasticsearchStore::new(&config.store)?;
    let users = ConfigUserStore::from_config(&config.auth);
    if users.is_empty() {
        tracing::warn!("no users configured in [[auth.users]]; every guarded route will redirect to /login");
    }

    match store.ping().await {
        Ok(true) => tracing::info!(url = %config.store.url, "search backend reachable"),
        Ok(false) => tracing::warn!(url = %config.store.url, "search backend answered with an error"),
        Err(e) => tracing::warn!(url = %config.store.url, error = %e, "search backend unreachable at startup"),
    }

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), Arc::new(store), Arc::new(users));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    println!("Search gateway listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Login / logout ============

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
    #[serde(default)]
    next: Option<String>,
}

fn login_page(next: &str, error: Option<&str>) -> Html<String> {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{}</p>\n", escape_html(e)))
        .unwrap_or_default();
    Html(format!(
        "<!doctype html>\n<html>\n<head><title>Sign in</title></head>\n<body>\n<h1>Sign in</h1>\n{error}<form method=\"post\" action=\"/login\">\n  <input type=\"hidden\" name=\"next\" value=\"{next}\">\n  <label>Username <input name=\"username\" autocomplete=\"username\"></label>\n  <label>Password <input name=\"password\" type=\"password\" autocomplete=\"current-password\"></label>\n  <button type=\"submit\">Sign in</button>\n</form>\n</body>\n</html>\n",
        error = error_html,
        next = escape_html(next),
    ))
}

async fn handle_login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    login_page(query.next.as_deref().unwrap_or(""), None)
}

async fn handle_login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let next = form.next.as_deref().unwrap_or("");
    if !state.users.verify(&form.username, &form.password) {
        tracing::warn!(username = %form.username, "failed login");
        let page = login_page(next, Some(&ApiError::AuthError.to_string()));
        return (StatusCode::UNAUTHORIZED, page).into_response();
    }

    let server = &state.config.server;
    let ttl = i64::try_from(server.session_ttl_secs).unwrap_or(i64::MAX);
    let expires = chrono::Utc::now().timestamp().saturating_add(ttl);
    let value = session::sign(&form.username, expires, server.secret());
    let cookie = session::session_cookie(&value, server.session_ttl_secs, server.secure_cookies);
    let target = if session::is_local_path(next) { next } else { "/dashboard" };

    tracing::info!(username = %form.username, "login");
    ([(header::SET_COOKIE, cookie)], Redirect::to(target)).into_response()
}

async fn handle_logout(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    tracing::info!(username = %user, "logout");
    let cookie = session::clear_cookie(state.config.server.secure_cookies);
    ([(header::SET_COOKIE, cookie)], Redirect::to("/login")).into_response()
}

// ============ Pages ============

async fn handle_dashboard(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html>\n<head><title>Search Gateway</title></head>\n<body>\n<h1>Search Gateway</h1>\n<p>Signed in as {user}. <a href=\"/logout\">Sign out</a></p>\n<ul>\n  <li><a href=\"/uploaded-docs\">Uploaded documents</a></li>\n  <li><a href=\"/search?type=match_all\">All indexed files</a></li>\n  <li><a href=\"/health\">Health</a></li>\n</ul>\n</body>\n</html>\n",
        user = escape_html(&user)
    ))
}

// ============ Uploads ============

/// Reads the `file` part of a multipart upload.
async fn read_file_field(
    multipart: Result<Multipart, MultipartRejection>,
    max_bytes: usize,
) -> Result<(String, Vec<u8>), ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::NoFileUploaded)?;
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?;
        let Some(field) = field else {
            return Err(ApiError::NoFileUploaded);
        };
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::NoFileSelected);
        }
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;
        if bytes.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(max_bytes));
        }
        return Ok((file_name, bytes.to_vec()));
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(max_bytes)
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

async fn handle_upload_preview(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ingest::UploadPreview>, ApiError> {
    let (file_name, bytes) = read_file_field(multipart, state.config.uploads.max_bytes).await?;
    let preview = ingest::preview_upload(&state.config, &file_name, bytes).await?;
    Ok(Json(preview))
}

async fn handle_upload_to_es(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let (file_name, bytes) = read_file_field(multipart, state.config.uploads.max_bytes).await?;
    let receipt =
        ingest::ingest_upload(state.store.as_ref(), &state.config, &file_name, bytes).await?;
    Ok(Json(json!({
        "message": "File indexed successfully",
        "id": receipt.id,
    })))
}

async fn handle_uploaded_docs(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let dir = state.config.uploads.dir.clone();
    let names = tokio::task::spawn_blocking(move || ingest::list_uploads(&dir))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(names))
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(rename = "type")]
    mode: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let mode = params.mode.as_deref().unwrap_or(search::DEFAULT_MODE);
    let hits = search::search_documents(state.store.as_ref(), &state.config, &params.q, mode).await?;
    Ok(Json(json!(hits)))
}

// ============ /api/infra ============

async fn handle_regions(
    State(state): State<AppState>,
    Path(customer): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let regions = infra::regions(state.store.as_ref(), &state.config, &customer).await?;
    Ok(Json(json!(regions)))
}

async fn handle_types(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(infra::types(state.store.as_ref(), &state.config).await?))
}

async fn handle_subtypes(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(infra::subtypes(state.store.as_ref(), &state.config).await?))
}

#[derive(Deserialize)]
struct NodesParams {
    filter: Option<String>,
}

async fn handle_nodes(
    State(state): State<AppState>,
    Path(customer): Path<String>,
    Query(params): Query<NodesParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let nodes = infra::nodes(
        state.store.as_ref(),
        &state.config,
        &customer,
        params.filter.as_deref(),
    )
    .await?;
    Ok(Json(nodes))
}

async fn handle_aggregate(
    State(state): State<AppState>,
    Path(customer): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let grouped = infra::aggregate(state.store.as_ref(), &state.config, &customer).await?;
    Ok(Json(json!(grouped)))
}

async fn handle_network(
    State(state): State<AppState>,
    Path((_customer, ids)): Path<(String, String)>,
) -> Result<Json<Vec<Value>>, ApiError> {
    Ok(Json(infra::network(state.store.as_ref(), &state.config, &ids).await?))
}

// ============ /api/inventory ============

async fn handle_summary(
    State(state): State<AppState>,
    Path(_customer): Path<String>,
    body: Result<Json<inventory::SummaryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = json_body(body)?;
    let summary = inventory::summary(state.store.as_ref(), &state.config, &req).await?;
    Ok(Json(json!(summary)))
}

async fn handle_list(
    State(state): State<AppState>,
    Path(_customer): Path<String>,
    body: Result<Json<inventory::ListRequest>, JsonRejection>,
) -> Result<Json<inventory::ListPage>, ApiError> {
    let req = json_body(body)?;
    Ok(Json(inventory::list(state.store.as_ref(), &state.config, &req).await?))
}

async fn handle_export(
    State(state): State<AppState>,
    Path(customer): Path<String>,
    body: Result<Json<inventory::ExportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(body)?;
    let export = inventory::export(state.store.as_ref(), &state.config, &customer, &req).await?;
    let disposition = format!("attachment; filename={}", export.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.body,
    )
        .into_response())
}

async fn handle_node_detail(
    State(state): State<AppState>,
    Path((_customer, node_id)): Path<(String, String)>,
) -> Result<Json<inventory::NodeDetail>, ApiError> {
    Ok(Json(
        inventory::node_detail(state.store.as_ref(), &state.config, &node_id).await?,
    ))
}
