use std::path::Path;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Response;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::routes::{classify_description, expand_route, Operation, RouteTable, DESCRIPTION_PATHS};
use super::{
    StoreSettings, ATTACH_TIMEOUT, DESCRIPTION_TIMEOUT, EMBED_TIMEOUT, LIST_TIMEOUT,
    UNKNOWN_DOCUMENT_COUNT,
};
use crate::contract::{DocumentId, DocumentStore};
use crate::error::{HttpSetupError, StoreError};
use crate::http::{build_client, insert_header, mentions_json, truncate_body};

const ERROR_BODY_LIMIT: usize = 300;

/// AnythingLLM client. Routes are resolved once, in [`AnythingLlmClient::connect`], and never change.
pub struct AnythingLlmClient {
    pub(super) http: reqwest::Client,
    pub(super) base_url: String,
    pub(super) workspace: String,
    pub(super) routes: RouteTable,
}

impl AnythingLlmClient {
    /// Build the client and discover routes from the server's API description.
    ///
    /// Only invalid settings fail; an unreachable or undocumented server leaves the defaults in place.
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let mut client = Self::with_routes(settings, RouteTable::defaults())?;
        client.routes = client.discover().await;
        Ok(client)
    }

    /// Build the client with a fixed route table, skipping discovery.
    pub fn with_routes(settings: &StoreSettings, routes: RouteTable) -> Result<Self, StoreError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(HttpSetupError::MissingSetting("store base_url").into());
        }
        if settings.api_key.trim().is_empty() {
            return Err(HttpSetupError::MissingSetting("store api_key").into());
        }

        // Some builds read the bearer token, others a custom header.
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "authorization", &format!("Bearer {}", settings.api_key))?;
        insert_header(&mut headers, "x-anythingllm-access-token", &settings.api_key)?;
        let http = build_client(&settings.tls, headers)?;

        info!(
            base_url = %base_url,
            workspace = %settings.workspace,
            api_key_set = true,
            "Initialised AnythingLLM client"
        );
        Ok(Self {
            http,
            base_url,
            workspace: settings.workspace.clone(),
            routes,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Absolute URL for a route template.
    pub fn url_for(&self, route: &str) -> String {
        format!("{}{}", self.base_url, expand_route(route, &self.workspace))
    }

    /// Resolve the route table: description rules first, defaults for the rest.
    pub async fn discover(&self) -> RouteTable {
        let table = match self.fetch_description().await {
            Some(description) => RouteTable::with_defaults(classify_description(&description)),
            None => {
                info!("[PROBE] No API description available, using default routes");
                RouteTable::defaults()
            }
        };
        for (op, route) in table.iter() {
            info!(operation = %op, route, "[PROBE] Route resolved");
        }
        table
    }

    /// First candidate description that answers 200 with a JSON body. Errors are swallowed.
    async fn fetch_description(&self) -> Option<Value> {
        for path in DESCRIPTION_PATHS {
            let url = format!("{}{}", self.base_url, path);
            let resp = match self.http.get(&url).timeout(DESCRIPTION_TIMEOUT).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    debug!(url = %url, error = %e, "[PROBE] Description fetch failed");
                    continue;
                }
            };
            if resp.status().as_u16() != 200 || !mentions_json(resp.headers()) {
                debug!(url = %url, status = %resp.status(), "[PROBE] Not an API description");
                continue;
            }
            match resp.json::<Value>().await {
                Ok(description) => {
                    info!(url = %url, "[PROBE] Using API description");
                    return Some(description);
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "[PROBE] Description body is not JSON");
                }
            }
        }
        None
    }

    /// Document count the workspace reports, or [`UNKNOWN_DOCUMENT_COUNT`] on any failure.
    pub async fn count_documents(&self) -> i64 {
        count_or_unknown(self.list_documents().await)
    }
}

/// Collapse a listing result into the advisory count, logging why it is unknown.
pub fn count_or_unknown(result: Result<usize, StoreError>) -> i64 {
    match result {
        Ok(count) => count as i64,
        Err(e) => {
            warn!(error = %e, "[VERIFY] Could not read workspace document list");
            UNKNOWN_DOCUMENT_COUNT
        }
    }
}

/// Recognised listing shapes: `{"documents": [..]}` or a bare array.
pub fn document_count(body: &Value) -> Option<usize> {
    match body {
        Value::Object(map) => map.get("documents").and_then(Value::as_array).map(Vec::len),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Turn a non-2xx response into [`StoreError::Status`] with a truncated body.
async fn ensure_success(url: &str, resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate_body(&body, ERROR_BODY_LIMIT),
    })
}

fn transport(url: &str) -> impl FnOnce(reqwest::Error) -> StoreError + '_ {
    move |source| StoreError::Transport {
        url: url.to_string(),
        source,
    }
}

#[async_trait]
impl DocumentStore for AnythingLlmClient {
    async fn upload_file(&self, file: &Path) -> Result<Vec<DocumentId>, StoreError> {
        self.upload_to_workspace_or_user(file).await
    }

    async fn attach(&self, ids: &[DocumentId]) -> Result<(), StoreError> {
        let url = self.url_for(self.routes.get(Operation::Attach));
        debug!(url = %url, count = ids.len(), "[ATTACH] Attaching documents");
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "document_ids": ids }))
            .timeout(ATTACH_TIMEOUT)
            .send()
            .await
            .map_err(transport(&url))?;
        ensure_success(&url, resp).await.map(|_| ())
    }

    async fn embed(&self) -> Result<(), StoreError> {
        let url = self.url_for(self.routes.get(Operation::Embed));
        debug!(url = %url, "[EMBED] Requesting workspace embedding");
        let resp = self
            .http
            .post(&url)
            .timeout(EMBED_TIMEOUT)
            .send()
            .await
            .map_err(transport(&url))?;
        ensure_success(&url, resp).await.map(|_| ())
    }

    async fn list_documents(&self) -> Result<usize, StoreError> {
        let url = self.url_for(self.routes.get(Operation::ListDocuments));
        let resp = self
            .http
            .get(&url)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(transport(&url))?;
        let resp = ensure_success(&url, resp).await?;
        let text = resp.text().await.map_err(transport(&url))?;
        serde_json::from_str::<Value>(&text)
            .ok()
            .as_ref()
            .and_then(document_count)
            .ok_or(StoreError::UnrecognisedBody { url })
    }
}
