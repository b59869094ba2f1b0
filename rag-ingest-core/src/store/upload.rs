//! Multipart upload with field-name and route fallbacks.
//!
//! Builds disagree on the multipart field name and on the upload route, so one file may be
//! posted up to `routes × field names` times. The first attempt that returns a 2xx *and* a
//! recognisable id wins.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::client::AnythingLlmClient;
use super::extract::extract_ids;
use super::routes::{Operation, LEGACY_UPLOAD_ROUTES};
use super::UPLOAD_TIMEOUT;
use crate::contract::DocumentId;
use crate::error::StoreError;
use crate::http::{declares_json, truncate_body};

/// Multipart field names, tried in order.
pub const UPLOAD_FIELD_NAMES: [&str; 4] = ["file", "files", "document", "documents"];

const MARKDOWN_MIME: &str = "text/markdown";
const LOG_BODY_LIMIT: usize = 200;

/// Result of posting one file to one route under every field name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteAttempt {
    /// Ids from the first successful attempt; empty when none succeeded.
    pub ids: Vec<DocumentId>,
    /// Attempts that got a 2xx without a recognisable id.
    pub accepted_without_ids: usize,
}

enum FieldOutcome {
    Ids(Vec<DocumentId>),
    AcceptedWithoutIds,
    Failed,
}

impl AnythingLlmClient {
    /// Post `file` to `url` under each field name until one attempt yields ids.
    pub async fn upload(&self, url: &str, file: &Path) -> RouteAttempt {
        let mut attempt = RouteAttempt::default();
        for field in UPLOAD_FIELD_NAMES {
            match self.post_file(url, field, file).await {
                FieldOutcome::Ids(ids) => {
                    debug!(file = %file.display(), url, field, count = ids.len(), "[UPLOAD] Accepted");
                    attempt.ids = ids;
                    return attempt;
                }
                FieldOutcome::AcceptedWithoutIds => attempt.accepted_without_ids += 1,
                FieldOutcome::Failed => {}
            }
        }
        attempt
    }

    /// Workspace route, then user library, then the legacy routes. The first non-empty result wins.
    pub async fn upload_to_workspace_or_user(
        &self,
        file: &Path,
    ) -> Result<Vec<DocumentId>, StoreError> {
        let mut tried: Vec<String> = Vec::new();
        let mut accepted_without_ids = 0;

        let routes = [
            self.routes.get(Operation::UploadWorkspace),
            self.routes.get(Operation::UploadUserLibrary),
        ]
        .into_iter()
        .chain(LEGACY_UPLOAD_ROUTES);

        for route in routes {
            let url = self.url_for(route);
            // The default table points both upload operations at the same route.
            if tried.contains(&url) {
                continue;
            }
            let attempt = self.upload(&url, file).await;
            tried.push(url);
            accepted_without_ids += attempt.accepted_without_ids;
            if !attempt.ids.is_empty() {
                info!(
                    file = %file.display(),
                    route,
                    ids = attempt.ids.len(),
                    "[UPLOAD] File uploaded"
                );
                return Ok(attempt.ids);
            }
        }

        Err(StoreError::UploadExhausted {
            file: file.to_path_buf(),
            accepted_without_ids,
        })
    }

    async fn post_file(&self, url: &str, field: &str, file: &Path) -> FieldOutcome {
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.md".to_string());

        // A fresh body per attempt: the previous one may have been consumed.
        let bytes = match tokio::fs::read(file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "[UPLOAD] Failed to read file");
                return FieldOutcome::Failed;
            }
        };
        let part = match Part::bytes(bytes).file_name(file_name).mime_str(MARKDOWN_MIME) {
            Ok(part) => part,
            Err(e) => {
                warn!(error = %e, "[UPLOAD] Failed to build multipart body");
                return FieldOutcome::Failed;
            }
        };
        let form = Form::new().part(field.to_string(), part);

        let resp = match self
            .http
            .post(url)
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(file = %file.display(), url, field, error = %e, "[UPLOAD] Transport error");
                return FieldOutcome::Failed;
            }
        };

        let status = resp.status();
        let is_json = declares_json(resp.headers());
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(
                file = %file.display(),
                url,
                field,
                status = status.as_u16(),
                body = %truncate_body(&text, LOG_BODY_LIMIT),
                "[UPLOAD] Rejected"
            );
            return FieldOutcome::Failed;
        }

        let body = if is_json {
            serde_json::from_str::<Value>(&text).ok()
        } else {
            None
        };
        let ids = extract_ids(body.as_ref());
        if ids.is_empty() {
            // Server accepted the file but answered in a shape we do not know.
            warn!(
                file = %file.display(),
                url,
                field,
                status = status.as_u16(),
                body = %truncate_body(&text, LOG_BODY_LIMIT),
                "[UPLOAD] 2xx without document id"
            );
            return FieldOutcome::AcceptedWithoutIds;
        }
        FieldOutcome::Ids(ids)
    }
}
