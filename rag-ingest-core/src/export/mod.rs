//! Export configured sources (Redmine, Wiki.js) to markdown files on local storage.
//!
//! Every source owns a deterministic directory under `output_dir`, cleared before each export.
//! The resulting [`ExportManifest`] lists the files in the order they will be uploaded.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::contract::{ExportManifest, ExportedSource, Exporter};
use crate::error::ExportError;
use crate::http::TlsSettings;

pub mod redmine;
pub mod wikijs;

/// Export configuration: what to fetch and where to write it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub sources: Vec<SourceAction>,
    /// Shared with the store client; filled in by the config layer.
    #[serde(skip)]
    pub tls: TlsSettings,
}

/// Selects the type of source to export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceAction {
    Redmine(RedmineSource),
    WikiJs(WikiJsSource),
}

/// Describes a Redmine instance to export issues and wiki pages from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedmineSource {
    pub base_url: String,
    /// Projects to export. Empty means all issues and no wiki pages.
    #[serde(default)]
    pub projects: Vec<String>,
    /// Only issues updated within this many days; 0 disables the filter.
    #[serde(default = "default_since_days")]
    pub since_days: u32,
    /// API key, injected from the environment.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

/// Describes a Wiki.js instance to export pages from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiJsSource {
    pub base_url: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// API token, injected from the environment.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

fn default_since_days() -> u32 {
    3650
}

fn default_page_limit() -> u32 {
    100
}

impl SourceAction {
    pub fn base_url(&self) -> &str {
        match self {
            SourceAction::Redmine(s) => &s.base_url,
            SourceAction::WikiJs(s) => &s.base_url,
        }
    }

    pub fn logical_name(&self) -> String {
        match self {
            SourceAction::Redmine(s) => format!("redmine:{}", s.base_url),
            SourceAction::WikiJs(s) => format!("wikijs:{}", s.base_url),
        }
    }

    /// Deterministic export directory for this source under `output_dir`.
    pub fn local_path(&self, output_dir: &Path) -> PathBuf {
        let kind = match self {
            SourceAction::Redmine(_) => "redmine",
            SourceAction::WikiJs(_) => "wikijs",
        };
        let dir_name = format!("{}_{}", kind, self.base_url().trim_end_matches('/'))
            .replace('/', "_")
            .replace(':', "_");
        output_dir.join(dir_name)
    }

    /// Markdown files currently in this source's directory, in upload order.
    pub fn exported_files(&self, local_path: &Path) -> Result<Vec<PathBuf>, ExportError> {
        match self {
            SourceAction::Redmine(_) => {
                let mut files = markdown_files(&local_path.join(redmine::ISSUES_DIR))?;
                files.extend(markdown_files(&local_path.join(redmine::WIKI_DIR))?);
                Ok(files)
            }
            SourceAction::WikiJs(_) => markdown_files(local_path),
        }
    }
}

/// Sorted `*.md` files directly inside `dir`. A missing directory has no files.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let io_err = |source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Remove and recreate a directory so a rerun never mixes old and new exports.
fn reset_dir(dir: &Path) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(io_err)?;
    }
    fs::create_dir_all(dir).map_err(io_err)
}

impl ExportManifest {
    /// Build a manifest from what a previous export left on disk.
    pub fn scan(config: &ExportConfig) -> Result<ExportManifest, ExportError> {
        let mut sources = Vec::new();
        for source in &config.sources {
            let local_path = source.local_path(&config.output_dir);
            if !local_path.exists() {
                warn!(path = %local_path.display(), "[EXPORT] No previous export for source");
                continue;
            }
            let files = source.exported_files(&local_path)?;
            sources.push(ExportedSource {
                logical_name: source.logical_name(),
                local_path,
                files,
                original_source: source.clone(),
            });
        }
        Ok(ExportManifest { sources })
    }
}

/// DefaultExporter holds an ExportConfig and runs the matching exporter for every source.
pub struct DefaultExporter {
    config: ExportConfig,
}

impl DefaultExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    async fn export_source(
        &self,
        source: &SourceAction,
        local_path: &Path,
    ) -> Result<usize, ExportError> {
        reset_dir(local_path)?;
        match source {
            SourceAction::Redmine(redmine) => {
                redmine::export(redmine, &self.config.tls, local_path).await
            }
            SourceAction::WikiJs(wiki) => wikijs::export(wiki, &self.config.tls, local_path).await,
        }
    }
}

#[async_trait]
impl Exporter for DefaultExporter {
    async fn export_all(&self) -> Result<ExportManifest, ExportError> {
        let out_dir = &self.config.output_dir;
        fs::create_dir_all(out_dir).map_err(|source| ExportError::Io {
            path: out_dir.clone(),
            source,
        })?;

        let mut sources = Vec::new();
        for source in &self.config.sources {
            let logical_name = source.logical_name();
            let local_path = source.local_path(out_dir);
            info!(source = %logical_name, path = %local_path.display(), "[EXPORT] Starting export");

            let written = match self.export_source(source, &local_path).await {
                Ok(written) => written,
                Err(e) => {
                    error!(source = %logical_name, error = %e, "[EXPORT] Source export failed");
                    continue;
                }
            };
            let files = match source.exported_files(&local_path) {
                Ok(files) => files,
                Err(e) => {
                    error!(source = %logical_name, error = %e, "[EXPORT] Failed to list exported files");
                    continue;
                }
            };
            info!(source = %logical_name, written, files = files.len(), "[EXPORT] Source exported");
            sources.push(ExportedSource {
                logical_name,
                local_path,
                files,
                original_source: source.clone(),
            });
        }

        let manifest = ExportManifest { sources };
        info!(
            files = manifest.file_count(),
            output_dir = %out_dir.display(),
            "[EXPORT] Export finished"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn redmine(base_url: &str) -> SourceAction {
        SourceAction::Redmine(RedmineSource {
            base_url: base_url.to_string(),
            projects: vec![],
            since_days: 0,
            token: None,
        })
    }

    #[test]
    fn local_path_is_deterministic_and_flat() {
        let path = redmine("https://redmine.example.org/").local_path(Path::new("/out"));
        assert_eq!(path, PathBuf::from("/out/redmine_https___redmine.example.org"));
    }

    #[test]
    fn source_actions_deserialize_by_type_tag() {
        let sources: Vec<SourceAction> = serde_json::from_value(serde_json::json!([
            {"type": "redmine", "base_url": "https://r"},
            {"type": "wikijs", "base_url": "https://w", "token": "t"}
        ]))
        .unwrap();
        match &sources[0] {
            SourceAction::Redmine(r) => {
                assert_eq!(r.since_days, 3650);
                assert!(r.projects.is_empty());
                assert!(r.token.is_none());
            }
            other => panic!("unexpected source {other:?}"),
        }
        match &sources[1] {
            SourceAction::WikiJs(w) => {
                assert_eq!(w.page_limit, 100);
                assert_eq!(w.token.as_deref(), Some("t"));
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn redmine_files_list_issues_before_wiki() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("issues")).unwrap();
        fs::create_dir_all(root.join("wiki")).unwrap();
        fs::write(root.join("wiki/a-home.md"), "w").unwrap();
        fs::write(root.join("issues/2-b.md"), "i").unwrap();
        fs::write(root.join("issues/1-a.md"), "i").unwrap();
        fs::write(root.join("issues/notes.txt"), "x").unwrap();

        let files = redmine("https://r").exported_files(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["issues/1-a.md", "issues/2-b.md", "wiki/a-home.md"]);
    }

    #[test]
    fn scan_skips_sources_without_previous_export() {
        let dir = tempdir().unwrap();
        let config = ExportConfig {
            output_dir: dir.path().to_path_buf(),
            sources: vec![redmine("https://r")],
            tls: TlsSettings::default(),
        };
        let manifest = ExportManifest::scan(&config).unwrap();
        assert!(manifest.sources.is_empty());
    }
}
