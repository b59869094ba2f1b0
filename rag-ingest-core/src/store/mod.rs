//! # store: resilient client for the AnythingLLM document store
//!
//! The client has to work against server versions whose routes and response envelopes differ:
//! - [`routes`] holds the route table and the keyword rules that fill it from an OpenAPI description.
//! - [`extract`] turns any known upload response shape into a list of document ids.
//! - [`client`] builds the HTTP client, probes routes at construction and implements
//!   attach/embed/list.
//! - [`upload`] walks field names and upload routes until the store hands back an id.
//!
//! [`AnythingLlmClient`] implements [`crate::contract::DocumentStore`].

use std::fmt;
use std::time::Duration;

use crate::http::TlsSettings;

pub mod client;
pub mod extract;
pub mod routes;
pub mod upload;

pub use client::AnythingLlmClient;
pub use extract::extract_ids;
pub use routes::{Operation, RouteTable};
pub use upload::{RouteAttempt, UPLOAD_FIELD_NAMES};

pub const DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(5);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(180);
pub const ATTACH_TIMEOUT: Duration = Duration::from_secs(60);
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(60);
pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reported document count when the workspace listing could not be read.
pub const UNKNOWN_DOCUMENT_COUNT: i64 = -1;

/// Connection settings for the document store, already validated by the caller's config layer.
#[derive(Clone)]
pub struct StoreSettings {
    pub base_url: String,
    pub api_key: String,
    /// Workspace (collection) slug the documents are attached to.
    pub workspace: String,
    pub tls: TlsSettings,
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("base_url", &self.base_url)
            .field("api_key_set", &!self.api_key.is_empty())
            .field("workspace", &self.workspace)
            .field("tls", &self.tls)
            .finish()
    }
}
