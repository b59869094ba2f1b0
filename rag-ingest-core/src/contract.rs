//! # contract: seams between the pipeline and its collaborators
//!
//! The pipeline in [`crate::synchronise`] only talks to two traits:
//! - [`Exporter`] writes markdown files for every configured source and reports where they went.
//! - [`DocumentStore`] uploads a file, attaches identifiers to the workspace, requests embedding
//!   and lists what the workspace sees.
//!
//! Both traits are annotated for `mockall` so pipeline tests can run without a network.
//! The concrete implementations are [`crate::export::DefaultExporter`] and
//! [`crate::store::AnythingLlmClient`].

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;

use crate::error::{ExportError, StoreError};
use crate::export::SourceAction;

/// Opaque document token handed out by the store. Uniqueness is the store's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Manifest returned from an export run, describing exactly what was written and where.
#[derive(Debug, Clone, Default)]
pub struct ExportManifest {
    pub sources: Vec<ExportedSource>,
}

impl ExportManifest {
    /// All exported files in upload order: sources in configuration order, files sorted per directory.
    pub fn files(&self) -> Vec<PathBuf> {
        self.sources
            .iter()
            .flat_map(|source| source.files.iter().cloned())
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.sources.iter().map(|source| source.files.len()).sum()
    }
}

/// One exported source in the manifest.
#[derive(Debug, Clone)]
pub struct ExportedSource {
    /// Human-readable logical name (e.g. `redmine:https://redmine.example.org`)
    pub logical_name: String,
    /// Directory holding this source's markdown files
    pub local_path: PathBuf,
    /// Markdown files written for this source, in upload order
    pub files: Vec<PathBuf>,
    /// Original declared source action (for audit)
    pub original_source: SourceAction,
}

/// Trait for exporting all configured sources to markdown on local storage.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Export every source into the configured output directory and return the manifest.
    ///
    /// A single source failing is logged and leaves that source out of the manifest; an error is
    /// only returned when the output directory itself cannot be prepared.
    async fn export_all(&self) -> Result<ExportManifest, ExportError>;
}

/// Trait for the document store the exported files are pushed into.
///
/// Every method is a best-effort remote call. Implementors must not panic on unexpected
/// responses; anything that is not a clear success comes back as a [`StoreError`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upload one file, walking every known upload route until one yields document ids.
    ///
    /// Returns a non-empty list on success. When every route is exhausted the error is
    /// [`StoreError::UploadExhausted`].
    async fn upload_file(&self, file: &Path) -> Result<Vec<DocumentId>, StoreError>;

    /// Attach a batch of documents to the workspace. Only a 2xx status counts as success.
    async fn attach(&self, ids: &[DocumentId]) -> Result<(), StoreError>;

    /// Ask the store to (re-)embed the workspace.
    async fn embed(&self) -> Result<(), StoreError>;

    /// Number of documents the workspace currently lists.
    async fn list_documents(&self) -> Result<usize, StoreError>;
}
