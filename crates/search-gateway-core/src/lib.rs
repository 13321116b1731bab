//! # Search Gateway Core
//!
//! Runtime-free logic for Search Gateway: data models, the store
//! abstraction with an in-memory implementation, the query bodies the
//! gateway issues, and reshaping of store responses.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O.

pub mod error;
pub mod models;
pub mod query;
pub mod reshape;
pub mod store;
