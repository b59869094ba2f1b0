//! Redmine exporter: closed issues (with journals) and project wiki pages as markdown.
//!
//! Issues in an open status are not exported.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::RedmineSource;
use crate::error::{ExportError, HttpSetupError};
use crate::http::{build_client, insert_header, truncate_body, TlsSettings};
use crate::render::{display_value, issue_markdown, redmine_wiki_markdown, slug, truncate_chars};

pub const ISSUES_DIR: &str = "issues";
pub const WIKI_DIR: &str = "wiki";

const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const OPEN_STATUSES: [&str; 5] = ["new", "open", "in progress", "feedback", "assigned"];

/// Minimal Redmine REST client.
pub struct RedmineClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RedmineClient {
    pub fn new(source: &RedmineSource, tls: &TlsSettings) -> Result<Self, ExportError> {
        let token = source
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(HttpSetupError::MissingSetting("REDMINE_TOKEN"))?;
        let base_url = Url::parse(source.base_url.trim()).map_err(|_| {
            ExportError::InvalidBaseUrl {
                url: source.base_url.clone(),
            }
        })?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "x-redmine-api-key", token)?;
        let http = build_client(tls, headers)?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ExportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ExportError::InvalidBaseUrl {
                url: self.base_url.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> Result<Value, ExportError> {
        let url_str = url.to_string();
        let resp = self
            .http
            .get(url)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| ExportError::Transport {
                url: url_str.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExportError::Status {
                url: url_str,
                status: status.as_u16(),
                body: truncate_body(&body, 800),
            });
        }
        resp.json::<Value>().await.map_err(|e| ExportError::Schema {
            url: url_str,
            reason: e.to_string(),
        })
    }

    /// All issues of `project` (or of every project) that pass [`keep_issue`], following pagination.
    pub async fn issues(
        &self,
        project: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, ExportError> {
        let url = self.endpoint(&["issues.json"])?;
        let mut kept = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut query = vec![
                ("limit", PAGE_SIZE.to_string()),
                ("include", "journals".to_string()),
                ("offset", offset.to_string()),
            ];
            if let Some(project) = project {
                query.push(("project_id", project.to_string()));
            }
            let payload = self.get_json(url.clone(), &query).await?;
            let total = payload
                .get("total_count")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            let page = payload
                .get("issues")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if page.is_empty() {
                break;
            }
            offset += page.len();
            kept.extend(page.into_iter().filter(|issue| keep_issue(issue, since)));
            debug!(offset, total, "[EXPORT][REDMINE] Fetched issue page");
            if offset >= total {
                break;
            }
        }
        Ok(kept)
    }

    pub async fn wiki_index(&self, project: &str) -> Result<Vec<Value>, ExportError> {
        let url = self.endpoint(&["projects", project, "wiki", "index.json"])?;
        let payload = self.get_json(url, &[]).await?;
        Ok(payload
            .get("wiki_pages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn wiki_page(&self, project: &str, title: &str) -> Result<Value, ExportError> {
        let file = format!("{title}.json");
        let url = self.endpoint(&["projects", project, "wiki", &file])?;
        let payload = self.get_json(url, &[]).await?;
        Ok(payload.get("wiki_page").cloned().unwrap_or(Value::Null))
    }
}

/// Closed issues only, and when `since` is set, only those updated (or created) at or after it.
pub fn keep_issue(issue: &Value, since: Option<DateTime<Utc>>) -> bool {
    let status = issue
        .get("status")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    if OPEN_STATUSES.contains(&status.as_str()) {
        return false;
    }
    let Some(since) = since else {
        return true;
    };
    let touched = issue
        .get("updated_on")
        .and_then(Value::as_str)
        .or_else(|| issue.get("created_on").and_then(Value::as_str))
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
    matches!(touched, Some(t) if t.with_timezone(&Utc) >= since)
}

/// Cut-off for `since_days`; `None` when the filter is disabled.
pub fn since_cutoff(since_days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (since_days > 0).then(|| now - chrono::Duration::days(i64::from(since_days)))
}

fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    fs::write(path, contents).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Export issues and wiki pages into `dir/issues` and `dir/wiki`. Returns the number of files written.
pub async fn export(
    source: &RedmineSource,
    tls: &TlsSettings,
    dir: &Path,
) -> Result<usize, ExportError> {
    let client = RedmineClient::new(source, tls)?;
    let issues_dir = dir.join(ISSUES_DIR);
    let wiki_dir = dir.join(WIKI_DIR);
    for d in [&issues_dir, &wiki_dir] {
        fs::create_dir_all(d).map_err(|source| ExportError::Io {
            path: d.clone(),
            source,
        })?;
    }

    let since = since_cutoff(source.since_days, Utc::now());
    let mut written = 0usize;

    let scopes: Vec<Option<&str>> = if source.projects.is_empty() {
        vec![None]
    } else {
        source.projects.iter().map(|p| Some(p.as_str())).collect()
    };
    for project in scopes {
        info!(
            project = project.unwrap_or("ALL"),
            since_days = source.since_days,
            "[EXPORT][REDMINE] Fetching closed issues"
        );
        for issue in client.issues(project, since).await? {
            let Some(id) = issue.get("id").map(display_value) else {
                warn!("[EXPORT][REDMINE] Issue without id skipped");
                continue;
            };
            let subject = issue.get("subject").and_then(Value::as_str).unwrap_or("").trim();
            let name = format!("{id}-{}.md", truncate_chars(&slug(subject), 80));
            write_file(&issues_dir.join(name), &issue_markdown(&issue))?;
            written += 1;
        }
    }

    for project in &source.projects {
        let pages = match client.wiki_index(project).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(project = %project, error = %e, "[EXPORT][REDMINE] Wiki index failed");
                continue;
            }
        };
        for entry in pages {
            let Some(title) = entry.get("title").and_then(Value::as_str) else {
                continue;
            };
            let page = match client.wiki_page(project, title).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(project = %project, title, error = %e, "[EXPORT][REDMINE] Wiki page failed");
                    continue;
                }
            };
            let name = format!("{}-{}.md", slug(project), truncate_chars(&slug(title), 100));
            write_file(&wiki_dir.join(name), &redmine_wiki_markdown(project, &page))?;
            written += 1;
        }
    }

    info!(files = written, path = %dir.display(), "[EXPORT][REDMINE] Export complete");
    Ok(written)
}
