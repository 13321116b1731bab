//! # Search Gateway
//!
//! A REST gateway in front of an Elasticsearch cluster: file ingestion into
//! a document index, free-text search over it, and read-only inventory and
//! infrastructure aggregation endpoints, behind a session login.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────┐   ┌───────────────┐
//! │  HTTP /  │──▶│ Session gate │──▶│ Ingest / Search │──▶│ DocumentStore │──▶ Elasticsearch
//! │   CLI    │   │  (cookies)   │   │ Infra/Inventory │   │   (reqwest)   │
//! └──────────┘   └──────────────┘   └─────────────────┘   └───────────────┘
//! ```
//!
//! Runtime-free pieces (models, the store trait, the in-memory store,
//! query builders, bucket reshaping) live in `search-gateway-core`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | tracing subscriber setup |
//! | [`error`] | HTTP error taxonomy |
//! | [`es`] | Elasticsearch store client |
//! | [`extract`] | Text extraction (txt, csv, docx, pdf) |
//! | [`tabular`] | csv/xlsx tables and HTML preview |
//! | [`ingest`] | Upload ingestion and preview |
//! | [`search`] | Document search façade |
//! | [`infra`] | Infrastructure views |
//! | [`inventory`] | Inventory summary, listing, export, detail |
//! | [`indices`] | Index administration commands |
//! | [`auth`] | Password hashing and user store |
//! | [`session`] | Signed session cookies and the login guard |
//! | [`server`] | HTTP routes |

pub mod auth;
pub mod config;
pub mod error;
pub mod es;
pub mod extract;
pub mod indices;
pub mod infra;
pub mod ingest;
pub mod inventory;
pub mod logging;
pub mod search;
pub mod server;
pub mod session;
pub mod tabular;
