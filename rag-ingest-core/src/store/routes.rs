//! Route table for the document store and the heuristics that fill it from an API description.
//!
//! Deployed AnythingLLM versions disagree on route names, so routes are classified by keyword
//! rather than matched against a fixed schema. Classification is a pure function from the
//! description to a partial table; [`RouteTable::with_defaults`] fills the rest.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Candidate locations of the machine-readable API description, probed in order.
pub const DESCRIPTION_PATHS: [&str; 3] = ["/api/docs-json", "/api/openapi.json", "/api/docs.json"];

/// Upload routes tried after both discovered upload routes came back empty.
pub const LEGACY_UPLOAD_ROUTES: [&str; 2] = [
    "/api/workspaces/{workspace}/documents/upload",
    "/api/workspace/{workspace}/upload",
];

/// Placeholders substituted with the workspace name.
const WORKSPACE_PLACEHOLDERS: [&str; 4] = ["{workspace}", ":workspace", "{slug}", ":slug"];

/// Logical operations the client needs a route for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    UploadWorkspace,
    UploadUserLibrary,
    Attach,
    Embed,
    ListDocuments,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::UploadWorkspace,
        Operation::UploadUserLibrary,
        Operation::Attach,
        Operation::Embed,
        Operation::ListDocuments,
    ];

    /// Known-good route for the 1.6–1.8 server family.
    pub fn default_route(self) -> &'static str {
        match self {
            Operation::UploadWorkspace => "/api/v1/document/upload",
            Operation::UploadUserLibrary => "/api/v1/document/upload",
            Operation::Attach => "/api/v1/workspaces/{workspace}/documents/attach",
            Operation::Embed => "/api/v1/workspaces/{workspace}/documents/embed",
            Operation::ListDocuments => "/api/v1/workspaces/{workspace}/documents",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::UploadWorkspace => "upload_workspace",
            Operation::UploadUserLibrary => "upload_user_library",
            Operation::Attach => "attach",
            Operation::Embed => "embed",
            Operation::ListDocuments => "list_documents",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared path of the description: lower-cased path text plus its method keys.
pub struct DeclaredPath<'a> {
    pub path: String,
    pub methods: Vec<&'a str>,
}

impl DeclaredPath<'_> {
    fn contains(&self, needle: &str) -> bool {
        self.path.contains(needle)
    }

    fn supports(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Keyword rule deciding whether a declared path serves an operation.
pub struct RouteRule {
    pub operation: Operation,
    pub matches: fn(&DeclaredPath<'_>) -> bool,
}

/// Classification rules. New server quirks go here, not into the scanning loop.
pub const ROUTE_RULES: &[RouteRule] = &[
    RouteRule {
        operation: Operation::UploadWorkspace,
        matches: is_workspace_upload,
    },
    RouteRule {
        operation: Operation::UploadUserLibrary,
        matches: is_user_library_upload,
    },
    RouteRule {
        operation: Operation::Attach,
        matches: is_attach,
    },
    RouteRule {
        operation: Operation::Embed,
        matches: is_embed,
    },
    RouteRule {
        operation: Operation::ListDocuments,
        matches: is_document_listing,
    },
];

fn is_workspace_upload(p: &DeclaredPath<'_>) -> bool {
    p.contains("workspaces") && p.contains("upload") && p.supports("post")
}

fn is_user_library_upload(p: &DeclaredPath<'_>) -> bool {
    p.contains("documents") && p.contains("upload") && !p.contains("workspaces") && p.supports("post")
}

fn is_attach(p: &DeclaredPath<'_>) -> bool {
    p.contains("workspaces")
        && p.contains("documents")
        && (p.contains("attach") || p.contains("add"))
        && p.supports("post")
}

fn is_embed(p: &DeclaredPath<'_>) -> bool {
    p.contains("workspaces")
        && p.contains("documents")
        && (p.contains("embed") || p.contains("re-embed"))
        && p.supports("post")
}

// The `sources` listing is a different resource that happens to share the prefix.
fn is_document_listing(p: &DeclaredPath<'_>) -> bool {
    p.contains("workspaces") && p.contains("documents") && p.supports("get") && !p.contains("sources")
}

/// Routes resolved from a description; operations without a match are absent.
pub type PartialRoutes = BTreeMap<Operation, String>;

/// Scan the `paths` object of an API description.
///
/// Paths are visited in declaration order and a later match overrides an earlier one.
/// Anything that is not an object of objects is ignored.
pub fn classify_description(description: &Value) -> PartialRoutes {
    let mut found = PartialRoutes::new();
    let Some(paths) = description.get("paths").and_then(Value::as_object) else {
        return found;
    };

    for (raw_path, meta) in paths {
        let methods = meta
            .as_object()
            .map(|ops| ops.keys().map(String::as_str).collect())
            .unwrap_or_default();
        let declared = DeclaredPath {
            path: raw_path.to_lowercase(),
            methods,
        };
        for rule in ROUTE_RULES {
            if (rule.matches)(&declared) {
                found.insert(rule.operation, raw_path.clone());
            }
        }
    }
    found
}

/// Immutable mapping from operation to route template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTable {
    routes: BTreeMap<Operation, String>,
}

impl RouteTable {
    /// Merge discovered routes with the defaults; every operation ends up with a route.
    pub fn with_defaults(discovered: PartialRoutes) -> Self {
        let routes = Operation::ALL
            .into_iter()
            .map(|op| {
                let route = discovered
                    .get(&op)
                    .cloned()
                    .unwrap_or_else(|| op.default_route().to_string());
                (op, route)
            })
            .collect();
        Self { routes }
    }

    pub fn defaults() -> Self {
        Self::with_defaults(PartialRoutes::new())
    }

    /// Route template for an operation, placeholders not yet substituted.
    pub fn get(&self, op: Operation) -> &str {
        self.routes
            .get(&op)
            .map(String::as_str)
            .unwrap_or_else(|| op.default_route())
    }

    /// Builder-style override, mostly for deployments with a known layout and for tests.
    pub fn with_route(mut self, op: Operation, route: impl Into<String>) -> Self {
        self.routes.insert(op, route.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, &str)> {
        self.routes.iter().map(|(op, route)| (*op, route.as_str()))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Substitute the workspace name into a route template.
pub fn expand_route(route: &str, workspace: &str) -> String {
    WORKSPACE_PLACEHOLDERS
        .iter()
        .fold(route.to_string(), |acc, placeholder| {
            acc.replace(placeholder, workspace)
        })
}
