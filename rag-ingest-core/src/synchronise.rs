//! High-level pipeline: push exported markdown into the document store.
//!
//! For every file in the manifest the store's upload ladder is walked; the collected ids are
//! attached to the workspace in batches of [`ATTACH_BATCH_SIZE`], an embedding run is requested
//! and the workspace listing is read back as an advisory check.
//!
//! # Error Handling
//! Nothing here aborts the run. A failed file, batch, embed request or listing is logged and
//! recorded in the [`PushReport`]; callers decide what to surface.
//!
//! # Navigation
//! - Main entrypoints: [`synchronise`] (from a manifest) and [`push_files`] (from a file list).
//! - Batch step: [`attach_in_batches`].

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::contract::{DocumentId, DocumentStore, ExportManifest};
use crate::error::StoreError;
use crate::store::client::count_or_unknown;
use crate::store::UNKNOWN_DOCUMENT_COUNT;

/// Upper bound on ids per attach request.
pub const ATTACH_BATCH_SIZE: usize = 200;

/// One file that made it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub ids: Vec<DocumentId>,
}

/// What a push run achieved.
#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub files_total: usize,
    pub uploaded: Vec<UploadedFile>,
    pub failed: Vec<PathBuf>,
    /// Failed files for which some attempt was answered 2xx without a usable id.
    /// The store may hold an unattached copy of these.
    pub ambiguous: usize,
    pub documents_uploaded: usize,
    pub documents_attached: usize,
    pub embed_requested: bool,
    /// Count the workspace reports after the run, or [`UNKNOWN_DOCUMENT_COUNT`].
    pub documents_visible: i64,
}

impl PushReport {
    fn empty() -> Self {
        Self {
            files_total: 0,
            uploaded: Vec::new(),
            failed: Vec::new(),
            ambiguous: 0,
            documents_uploaded: 0,
            documents_attached: 0,
            embed_requested: false,
            documents_visible: UNKNOWN_DOCUMENT_COUNT,
        }
    }

    /// All ids in upload order.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.uploaded
            .iter()
            .flat_map(|file| file.ids.iter().cloned())
            .collect()
    }
}

/// Report of a full synchronise run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub files_exported: usize,
    /// `None` when there was nothing to push.
    pub push: Option<PushReport>,
}

/// Push every file of `manifest`. An empty manifest skips the store entirely.
pub async fn synchronise<S>(store: &S, manifest: &ExportManifest) -> SyncReport
where
    S: DocumentStore + ?Sized,
{
    let files = manifest.files();
    info!(
        sources = manifest.sources.len(),
        files = files.len(),
        "[SYNC] Starting synchronisation"
    );
    if files.is_empty() {
        warn!("[SYNC] No exported files, nothing to push");
        return SyncReport {
            files_exported: 0,
            push: None,
        };
    }
    let push = push_files(store, &files).await;
    SyncReport {
        files_exported: files.len(),
        push: Some(push),
    }
}

/// Upload, attach, embed and verify. Per-item failures are logged and counted, never returned.
pub async fn push_files<S>(store: &S, files: &[PathBuf]) -> PushReport
where
    S: DocumentStore + ?Sized,
{
    let mut report = PushReport::empty();
    report.files_total = files.len();

    for file in files {
        match store.upload_file(file).await {
            Ok(ids) => {
                info!(file = %file.display(), ids = ids.len(), "[SYNC][UPLOAD] Uploaded");
                report.documents_uploaded += ids.len();
                report.uploaded.push(UploadedFile {
                    path: file.clone(),
                    ids,
                });
            }
            Err(e) => {
                if is_ambiguous(&e) {
                    report.ambiguous += 1;
                }
                error!(file = %file.display(), error = %e, "[SYNC][UPLOAD] Upload failed");
                report.failed.push(file.clone());
            }
        }
    }

    let ids = report.document_ids();
    report.documents_attached = attach_in_batches(store, &ids).await;

    // Requested even with nothing attached: the workspace may hold earlier documents.
    report.embed_requested = match store.embed().await {
        Ok(()) => {
            info!("[EMBED] Embedding requested");
            true
        }
        Err(e) => {
            warn!(error = %e, "[EMBED] Embedding request failed");
            false
        }
    };

    report.documents_visible = count_or_unknown(store.list_documents().await);
    verify(&report);
    log_summary(&report);
    report
}

/// Attach `ids` in chunks of [`ATTACH_BATCH_SIZE`]. Returns how many ids landed in a batch
/// that was accepted.
pub async fn attach_in_batches<S>(store: &S, ids: &[DocumentId]) -> usize
where
    S: DocumentStore + ?Sized,
{
    let mut attached = 0;
    for (index, batch) in ids.chunks(ATTACH_BATCH_SIZE).enumerate() {
        let start = index * ATTACH_BATCH_SIZE;
        let end = start + batch.len();
        match store.attach(batch).await {
            Ok(()) => {
                info!(start, end, count = batch.len(), "[ATTACH] Batch attached");
                attached += batch.len();
            }
            Err(e) => {
                error!(start, end, error = %e, "[ATTACH] Batch failed");
            }
        }
    }
    attached
}

fn is_ambiguous(error: &StoreError) -> bool {
    matches!(
        error,
        StoreError::UploadExhausted {
            accepted_without_ids,
            ..
        } if *accepted_without_ids > 0
    )
}

fn verify(report: &PushReport) {
    if report.documents_visible == UNKNOWN_DOCUMENT_COUNT {
        return;
    }
    let attached = report.documents_attached as i64;
    if report.documents_visible != attached {
        warn!(
            visible = report.documents_visible,
            attached,
            ambiguous = report.ambiguous,
            "[VERIFY] Workspace count differs from attached total"
        );
    }
}

fn log_summary(report: &PushReport) {
    info!(
        files = report.files_total,
        documents_uploaded = report.documents_uploaded,
        files_failed = report.failed.len(),
        ambiguous = report.ambiguous,
        documents_attached = report.documents_attached,
        embed_requested = report.embed_requested,
        documents_visible = report.documents_visible,
        "[SYNC] Push finished"
    );
}

/// Display helper for failed-file lists in summaries.
pub fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect()
}
