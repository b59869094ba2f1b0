//! Shared HTTP plumbing: TLS settings, client construction and response helpers.
//!
//! The same TLS policy applies to every remote system (document store, Redmine, Wiki.js).

use std::path::PathBuf;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HttpSetupError;

/// User agent sent on every request.
pub const CLIENT_USER_AGENT: &str = concat!("rag-ingest/", env!("CARGO_PKG_VERSION"));

/// Certificate verification policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Skip certificate verification. Ignored when `ca_bundle` is set.
    #[serde(default)]
    pub insecure: bool,
    /// PEM bundle whose certificates are trusted in addition to the built-in roots.
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
}

/// Build a `reqwest::Client` with the given default headers and TLS policy.
///
/// Per-request timeouts are set by the callers; the client itself has none.
pub fn build_client(
    tls: &TlsSettings,
    mut headers: HeaderMap,
) -> Result<reqwest::Client, HttpSetupError> {
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    let mut builder = reqwest::Client::builder().default_headers(headers);

    if let Some(path) = &tls.ca_bundle {
        let pem = std::fs::read(path).map_err(|source| HttpSetupError::CaBundleRead {
            path: path.clone(),
            source,
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|source| {
            HttpSetupError::CaBundleParse {
                path: path.clone(),
                source,
            }
        })?;
        debug!(ca_bundle = %path.display(), certificates = certs.len(), "Using custom CA bundle");
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    } else if tls.insecure {
        warn!("TLS certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(HttpSetupError::Build)
}

/// Insert a header whose value comes from configuration.
pub fn insert_header(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
) -> Result<(), HttpSetupError> {
    let mut value =
        HeaderValue::from_str(value).map_err(|_| HttpSetupError::InvalidHeader { name })?;
    value.set_sensitive(true);
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Whether the response declares a JSON body.
pub fn declares_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with("application/json"))
        .unwrap_or(false)
}

/// Looser check used for API descriptions: the content type only has to mention JSON.
pub fn mentions_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"))
}

/// Cut a response body down to `max` characters for log lines and error values.
pub fn truncate_body(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_respects_char_boundaries() {
        assert_eq!(truncate_body("héllo", 2), "hé");
        assert_eq!(truncate_body("short", 200), "short");
        assert_eq!(truncate_body("", 5), "");
    }

    #[test]
    fn declares_json_accepts_charset_suffix() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(declares_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!declares_json(&headers));
        assert!(!declares_json(&HeaderMap::new()));
    }

    #[test]
    fn mentions_json_accepts_json_anywhere_in_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.oai.openapi, Application/JSON"),
        );
        assert!(mentions_json(&headers));
        assert!(!declares_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        assert!(!mentions_json(&headers));
        assert!(!mentions_json(&HeaderMap::new()));
    }

    #[test]
    fn missing_ca_bundle_is_a_setup_error() {
        let tls = TlsSettings {
            insecure: false,
            ca_bundle: Some(PathBuf::from("/definitely/not/here.pem")),
        };
        let err = build_client(&tls, HeaderMap::new()).unwrap_err();
        assert!(matches!(err, HttpSetupError::CaBundleRead { .. }));
    }
}
