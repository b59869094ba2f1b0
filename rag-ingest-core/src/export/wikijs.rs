//! Wiki.js exporter over GraphQL.
//!
//! Two schema layouts are in the wild: pages nested under `pages { list }` / `pages { single }`,
//! and root-level `pages(...)` / `page(...)`. The layout is detected from the listing query and
//! reused for every page fetch.

use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::WikiJsSource;
use crate::error::{ExportError, HttpSetupError};
use crate::http::{build_client, insert_header, truncate_body, TlsSettings};
use crate::render::{display_value, slug, truncate_chars, wikijs_markdown};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

const NESTED_LIST: &str =
    "query Pages($limit:Int!){ pages { list(limit:$limit){ id title path updatedAt } } }";
const NESTED_SINGLE: &str =
    "query Page($id:Int!){ pages { single(id:$id){ id title path content updatedAt } } }";
const FLAT_LIST: &str = "query Pages($limit:Int!){ pages(limit:$limit){ id title path updatedAt } }";
const FLAT_SINGLE: &str = "query Page($id:Int!){ page(id:$id){ id title path content updatedAt } }";

/// Which GraphQL layout the server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    Nested,
    Flat,
}

impl SchemaVariant {
    fn single_query(self) -> &'static str {
        match self {
            SchemaVariant::Nested => NESTED_SINGLE,
            SchemaVariant::Flat => FLAT_SINGLE,
        }
    }

    /// Page list inside a listing response, if the response has this layout.
    pub fn page_list(self, response: &Value) -> Option<Vec<Value>> {
        let pages = response.get("data")?.get("pages")?;
        let list = match self {
            SchemaVariant::Nested => pages.get("list")?,
            SchemaVariant::Flat => pages,
        };
        list.as_array().cloned()
    }

    /// Page inside a single-page response.
    pub fn single_page(self, response: &Value) -> Option<Value> {
        let data = response.get("data")?;
        let page = match self {
            SchemaVariant::Nested => data.get("pages")?.get("single")?,
            SchemaVariant::Flat => data.get("page")?,
        };
        (!page.is_null()).then(|| page.clone())
    }
}

pub struct WikiJsClient {
    http: reqwest::Client,
    graphql_url: String,
}

impl WikiJsClient {
    pub fn new(source: &WikiJsSource, tls: &TlsSettings) -> Result<Self, ExportError> {
        let token = source
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(HttpSetupError::MissingSetting("WIKIJS_TOKEN"))?;
        let base = source.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ExportError::InvalidBaseUrl {
                url: source.base_url.clone(),
            });
        }
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "authorization", &format!("Bearer {token}"))?;
        Ok(Self {
            http: build_client(tls, headers)?,
            graphql_url: format!("{base}/graphql"),
        })
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value, ExportError> {
        let url = &self.graphql_url;
        let resp = self
            .http
            .post(url)
            .json(&json!({ "query": query, "variables": variables }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| ExportError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExportError::Status {
                url: url.clone(),
                status: status.as_u16(),
                body: truncate_body(&body, 200),
            });
        }
        resp.json::<Value>().await.map_err(|e| ExportError::Schema {
            url: url.clone(),
            reason: e.to_string(),
        })
    }

    /// List pages, detecting the schema layout on the way.
    pub async fn list_pages(&self, limit: u32) -> Result<(SchemaVariant, Vec<Value>), ExportError> {
        let variables = json!({ "limit": limit });
        for (variant, query) in [
            (SchemaVariant::Nested, NESTED_LIST),
            (SchemaVariant::Flat, FLAT_LIST),
        ] {
            let response = self.query(query, variables.clone()).await?;
            if let Some(pages) = variant.page_list(&response) {
                info!(?variant, pages = pages.len(), "[EXPORT][WIKIJS] Schema variant detected");
                return Ok((variant, pages));
            }
        }
        Err(ExportError::Schema {
            url: self.graphql_url.clone(),
            reason: "could not detect Wiki.js schema variant".to_string(),
        })
    }

    pub async fn page(&self, variant: SchemaVariant, id: &Value) -> Result<Value, ExportError> {
        let response = self
            .query(variant.single_query(), json!({ "id": id }))
            .await?;
        variant
            .single_page(&response)
            .ok_or_else(|| ExportError::Schema {
                url: self.graphql_url.clone(),
                reason: format!("page {} missing from response", display_value(id)),
            })
    }
}

/// Export every listed page into `dir`. Returns the number of files written.
pub async fn export(
    source: &WikiJsSource,
    tls: &TlsSettings,
    dir: &Path,
) -> Result<usize, ExportError> {
    let client = WikiJsClient::new(source, tls)?;
    info!(base_url = %source.base_url, "[EXPORT][WIKIJS] Fetching pages");
    let (variant, pages) = client.list_pages(source.page_limit).await?;

    let mut written = 0usize;
    for summary in pages {
        let Some(id) = summary.get("id") else {
            warn!("[EXPORT][WIKIJS] Page without id skipped");
            continue;
        };
        let page = match client.page(variant, id).await {
            Ok(page) => page,
            Err(e) => {
                warn!(page = %display_value(id), error = %e, "[EXPORT][WIKIJS] Page fetch failed");
                continue;
            }
        };
        let title = page.get("title").and_then(Value::as_str).unwrap_or("Untitled");
        let name = format!(
            "{}-{}.md",
            display_value(id),
            truncate_chars(&slug(title), 80)
        );
        let path = dir.join(name);
        if let Err(e) = fs::write(&path, wikijs_markdown(&source.base_url, &page)) {
            warn!(path = %path.display(), error = %e, "[EXPORT][WIKIJS] Page write failed");
            continue;
        }
        written += 1;
    }

    info!(files = written, path = %dir.display(), "[EXPORT][WIKIJS] Export complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_layout_is_read_from_pages_list() {
        let response = json!({"data": {"pages": {"list": [{"id": 1}]}}});
        assert_eq!(SchemaVariant::Nested.page_list(&response).map(|p| p.len()), Some(1));
        assert!(SchemaVariant::Flat.page_list(&response).is_none());
    }

    #[test]
    fn flat_layout_is_read_from_root_pages() {
        let response = json!({"data": {"pages": [{"id": 1}, {"id": 2}]}});
        assert!(SchemaVariant::Nested.page_list(&response).is_none());
        assert_eq!(SchemaVariant::Flat.page_list(&response).map(|p| p.len()), Some(2));
    }

    #[test]
    fn null_single_page_is_missing() {
        let response = json!({"data": {"page": null}});
        assert!(SchemaVariant::Flat.single_page(&response).is_none());
        let response = json!({"data": {"pages": {"single": {"id": 4}}}});
        assert_eq!(SchemaVariant::Nested.single_page(&response), Some(json!({"id": 4})));
    }
}
