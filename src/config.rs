use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `server.session_secret`.
pub const SESSION_SECRET_ENV: &str = "SGW_SESSION_SECRET";
/// Environment variable that overrides `store.password`.
pub const STORE_PASSWORD_ENV: &str = "SGW_STORE_PASSWORD";

const MIN_SECRET_LEN: usize = 16;
/// One year.
const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub indices: IndicesConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Index names. Defaults match the indices the collectors write.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndicesConfig {
    pub documents: String,
    pub inventory_nodes: String,
    pub infra_nodes: String,
    pub sites: String,
    pub alarms: String,
    pub incidents: String,
    pub change_requests: String,
}

impl Default for IndicesConfig {
    fn default() -> Self {
        Self {
            documents: "datasets".to_string(),
            inventory_nodes: "nodes_index".to_string(),
            infra_nodes: "nodes".to_string(),
            sites: "sites".to_string(),
            alarms: "alarms_index".to_string(),
            incidents: "incidents_index".to_string(),
            change_requests: "change_requests_index".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_max_bytes() -> usize {
    25 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub session_secret: Option<String>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_secret: None,
            session_ttl_secs: default_session_ttl(),
            secure_cookies: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_session_ttl() -> u64 {
    86_400
}

impl ServerConfig {
    /// The configured session secret. Validated non-empty by [`load_config`].
    pub fn secret(&self) -> &[u8] {
        self.session_secret.as_deref().unwrap_or_default().as_bytes()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Hits requested per document search, before de-duplication.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Fixed cap for non-paginated endpoints.
    #[serde(default = "default_size_cap")]
    pub size_cap: usize,
    /// Bucket count of the vendor × subtype summary.
    #[serde(default = "default_summary_buckets")]
    pub summary_buckets: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            size_cap: default_size_cap(),
            summary_buckets: default_summary_buckets(),
        }
    }
}

fn default_max_results() -> usize {
    100
}
fn default_size_cap() -> usize {
    10_000
}
fn default_summary_buckets() -> usize {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserEntry {
    pub username: String,
    pub password_hash: String,
}

impl Config {
    /// A configuration with defaults everywhere, pointing at `store_url`.
    pub fn minimal(store_url: &str) -> Self {
        Self {
            store: StoreConfig {
                url: store_url.to_string(),
                username: None,
                password: None,
                timeout_secs: default_timeout_secs(),
            },
            indices: IndicesConfig::default(),
            uploads: UploadsConfig::default(),
            server: ServerConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parses, applies environment overrides, and validates.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Ok(secret) = std::env::var(SESSION_SECRET_ENV) {
        if !secret.is_empty() {
            config.server.session_secret = Some(secret);
        }
    }
    if let Ok(password) = std::env::var(STORE_PASSWORD_ENV) {
        if !password.is_empty() {
            config.store.password = Some(password);
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(config.store.url.starts_with("http://") || config.store.url.starts_with("https://")) {
        anyhow::bail!("store.url must be an http(s) URL, got '{}'", config.store.url);
    }
    if config.store.timeout_secs == 0 {
        anyhow::bail!("store.timeout_secs must be > 0");
    }
    if config.store.password.is_some() && config.store.username.is_none() {
        anyhow::bail!("store.password is set but store.username is missing");
    }

    let secret_len = config.server.session_secret.as_deref().map(str::len).unwrap_or(0);
    if secret_len < MIN_SECRET_LEN {
        anyhow::bail!(
            "server.session_secret must be at least {} bytes (set it in the config or via {})",
            MIN_SECRET_LEN,
            SESSION_SECRET_ENV
        );
    }
    if config.server.session_ttl_secs == 0 || config.server.session_ttl_secs > MAX_SESSION_TTL_SECS {
        anyhow::bail!(
            "server.session_ttl_secs must be between 1 and {}, got {}",
            MAX_SESSION_TTL_SECS,
            config.server.session_ttl_secs
        );
    }

    if config.search.max_results == 0 || config.search.size_cap == 0 {
        anyhow::bail!("search.max_results and search.size_cap must be > 0");
    }
    if config.uploads.max_bytes == 0 {
        anyhow::bail!("uploads.max_bytes must be > 0");
    }

    crate::logging::configured_filter(&config.logging)?;

    let indices = &config.indices;
    for (field, name) in [
        ("documents", &indices.documents),
        ("inventory_nodes", &indices.inventory_nodes),
        ("infra_nodes", &indices.infra_nodes),
        ("sites", &indices.sites),
        ("alarms", &indices.alarms),
        ("incidents", &indices.incidents),
        ("change_requests", &indices.change_requests),
    ] {
        if name.is_empty() || name.chars().any(|c| c.is_ascii_uppercase() || c == '/' || c == ' ') {
            anyhow::bail!(
                "indices.{} must be a non-empty lowercase index name, got '{}'",
                field,
                name
            );
        }
    }

    let mut seen = std::collections::HashSet::new();
    for user in &config.auth.users {
        if user.username.is_empty() {
            anyhow::bail!("auth.users entries need a username");
        }
        if !seen.insert(user.username.as_str()) {
            anyhow::bail!("duplicate user in auth.users: '{}'", user.username);
        }
        if !user.password_hash.starts_with(crate::auth::HASH_SCHEME) {
            anyhow::bail!(
                "password_hash for '{}' is not a {} hash (generate one with `sgw hash-password`)",
                user.username,
                crate::auth::HASH_SCHEME
            );
        }
    }

    Ok(())
}
