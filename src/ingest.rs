//! Ingestion pipeline: uploaded file → saved copy → extracted text → indexed document.
//!
//! Also hosts the tabular upload preview and the bulk `sgw ingest` command,
//! which share file-name sanitising and saving with the upload path.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use search_gateway_core::models::{Document, FileType};
use search_gateway_core::query::documents_index_schema;
use search_gateway_core::store::{ensure_index, DocumentStore};

use crate::config::Config;
use crate::error::ApiError;
use crate::extract::{self, ExtractError};
use crate::tabular;

pub const UNSUPPORTED_INGEST: &str = "Unsupported file format";
pub const UNSUPPORTED_PREVIEW: &str =
    "Unsupported file format. Please upload .csv, .xls, or .xlsx files.";
pub const LEGACY_XLS: &str =
    "Legacy .xls workbooks are not supported. Please save the file as .xlsx.";

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub id: String,
    pub document: Document,
}

/// Result of a tabular preview. `table` is percent-encoded HTML.
#[derive(Debug, Clone, Serialize)]
pub struct UploadPreview {
    pub table: String,
    pub filename: String,
}

/// Reduces a client-supplied file name to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, characters outside
/// `[A-Za-z0-9._-]` are removed and leading dots are stripped. May return
/// an empty string.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                Some(c)
            } else {
                None
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Writes `bytes` to `dir/name` through a temporary sibling and a rename.
pub async fn save_upload(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let target = dir.join(name);
    let tmp = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, &target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(target)
}

/// Saved uploads, sorted by name. A missing directory lists as empty.
pub fn list_uploads(dir: &Path) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Runs extraction on the blocking pool.
async fn extract_blocking(bytes: Vec<u8>, file_type: FileType) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || extract::extract_text(&bytes, file_type))
        .await
        .map_err(|e| ApiError::Internal(format!("extraction task failed: {}", e)))?
        .map_err(|e: ExtractError| ApiError::Extraction(e.to_string()))
}

/// Accepts an upload and indexes it into the documents index.
pub async fn ingest_upload(
    store: &dyn DocumentStore,
    config: &Config,
    raw_name: &str,
    bytes: Vec<u8>,
) -> Result<IngestReceipt, ApiError> {
    let file_name = sanitize_file_name(raw_name);
    if file_name.is_empty() {
        return Err(ApiError::NoFileSelected);
    }
    let file_type = FileType::from_file_name(&file_name)
        .filter(FileType::is_indexable)
        .ok_or_else(|| ApiError::UnsupportedFormat(UNSUPPORTED_INGEST.to_string()))?;

    let saved = save_upload(&config.uploads.dir, &file_name, &bytes).await?;
    tracing::debug!(path = %saved.display(), "upload saved");

    let content = extract_blocking(bytes, file_type).await?;
    if content.trim().is_empty() {
        tracing::warn!(file = %file_name, "no extractable content");
        return Err(ApiError::EmptyContent);
    }

    let document = Document {
        file_name,
        file_type,
        upload_time: chrono::Utc::now(),
        content,
    };

    let index = &config.indices.documents;
    if ensure_index(store, index, &documents_index_schema()).await? {
        tracing::info!(index = %index, "documents index created");
    }
    let body = serde_json::to_value(&document).map_err(|e| ApiError::Internal(e.to_string()))?;
    let id = store.index_document(index, &body).await?;

    tracing::info!(
        id = %id,
        file = %document.file_name,
        file_type = %document.file_type,
        chars = document.content.len(),
        "document indexed"
    );
    Ok(IngestReceipt { id, document })
}

/// Saves a csv/xlsx upload and renders it as an HTML table.
pub async fn preview_upload(
    config: &Config,
    raw_name: &str,
    bytes: Vec<u8>,
) -> Result<UploadPreview, ApiError> {
    let file_name = sanitize_file_name(raw_name);
    if file_name.is_empty() {
        return Err(ApiError::NoFileSelected);
    }
    let file_type = match FileType::from_file_name(&file_name) {
        Some(ft @ (FileType::Csv | FileType::Xlsx)) => ft,
        Some(FileType::Xls) => return Err(ApiError::UnsupportedFormat(LEGACY_XLS.to_string())),
        _ => return Err(ApiError::UnsupportedFormat(UNSUPPORTED_PREVIEW.to_string())),
    };

    save_upload(&config.uploads.dir, &file_name, &bytes).await?;

    let table = tokio::task::spawn_blocking(move || match file_type {
        FileType::Csv => tabular::read_csv(&bytes),
        _ => tabular::read_xlsx(&bytes),
    })
    .await
    .map_err(|e| ApiError::Internal(format!("preview task failed: {}", e)))?
    .map_err(|e| {
        tracing::warn!(file = %file_name, error = %e, "preview parse failed");
        ApiError::Internal(e.to_string())
    })?;

    Ok(UploadPreview {
        table: urlencoding::encode(&table.to_html()).into_owned(),
        filename: file_name,
    })
}

/// `sgw ingest`: extracts each file and submits them in one bulk request.
///
/// Unsupported or empty files are reported and skipped. Fails only when
/// the store call fails.
pub async fn run_ingest(store: &dyn DocumentStore, config: &Config, paths: &[PathBuf]) -> Result<()> {
    let mut docs = Vec::new();
    let mut skipped = 0usize;

    for path in paths {
        let raw_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = sanitize_file_name(&raw_name);
        let Some(file_type) = FileType::from_file_name(&file_name).filter(FileType::is_indexable) else {
            eprintln!("  skip {}: {}", path.display(), UNSUPPORTED_INGEST);
            skipped += 1;
            continue;
        };
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let content = match extract::extract_text(&bytes, file_type) {
            Ok(c) if !c.trim().is_empty() => c,
            Ok(_) => {
                eprintln!("  skip {}: no extractable content", path.display());
                skipped += 1;
                continue;
            }
            Err(e) => {
                eprintln!("  skip {}: {}", path.display(), e);
                skipped += 1;
                continue;
            }
        };
        let document = Document {
            file_name,
            file_type,
            upload_time: chrono::Utc::now(),
            content,
        };
        docs.push(serde_json::to_value(&document)?);
    }

    let index = &config.indices.documents;
    if !docs.is_empty() {
        ensure_index(store, index, &documents_index_schema())
            .await
            .with_context(|| format!("Failed to ensure index '{}'", index))?;
    }
    let summary = store
        .bulk_index(index, &docs)
        .await
        .with_context(|| format!("Bulk indexing into '{}' failed", index))?;
    if summary.indexed > 0 {
        store.refresh(index).await?;
    }

    println!("ingest {}", index);
    println!("  files: {}", paths.len());
    println!("  indexed: {}", summary.indexed);
    println!("  failed: {}", summary.failed);
    println!("  skipped: {}", skipped);
    println!("ok");
    Ok(())
}
