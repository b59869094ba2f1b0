use std::fs;
use std::path::PathBuf;

use rag_ingest_core::contract::{DocumentId, DocumentStore};
use rag_ingest_core::error::StoreError;
use rag_ingest_core::http::TlsSettings;
use rag_ingest_core::store::{AnythingLlmClient, Operation, RouteTable, StoreSettings};
use rag_ingest_core::synchronise::push_files;
use serde_json::json;
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UPLOAD: &str = "/api/v1/document/upload";
const ATTACH: &str = "/api/v1/workspaces/default/documents/attach";
const EMBED: &str = "/api/v1/workspaces/default/documents/embed";
const LIST: &str = "/api/v1/workspaces/default/documents";

fn settings(base_url: &str) -> StoreSettings {
    StoreSettings {
        base_url: base_url.to_string(),
        api_key: "secret-key".to_string(),
        workspace: "default".to_string(),
        tls: TlsSettings::default(),
    }
}

fn markdown_files(names: &[&str]) -> (TempDir, Vec<PathBuf>) {
    let dir = tempdir().unwrap();
    let files = names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            fs::write(&path, format!("# {name}\n")).unwrap();
            path
        })
        .collect();
    (dir, files)
}

fn field(name: &str) -> String {
    format!("name=\"{name}\";")
}

#[tokio::test]
async fn test_discovery_falls_back_to_defaults_without_description() {
    let server = MockServer::start().await;

    let client = AnythingLlmClient::connect(&settings(&server.uri()))
        .await
        .expect("client builds");

    assert_eq!(client.routes(), &RouteTable::defaults());
}

#[tokio::test]
async fn test_discovery_falls_back_to_defaults_when_unreachable() {
    let client = AnythingLlmClient::connect(&settings("http://127.0.0.1:1"))
        .await
        .expect("client builds");

    assert_eq!(client.routes(), &RouteTable::defaults());
}

#[tokio::test]
async fn test_discovery_skips_non_json_description_and_stops_at_first_good_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs-json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>swagger ui</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paths": {"/x/workspaces/{slug}/documents": {"get": {}}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/docs.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paths": {"/y/workspaces/{slug}/documents/attach": {"post": {}}}
        })))
        .expect(0)
        .mount(&server)
        .await;

    let client = AnythingLlmClient::connect(&settings(&server.uri()))
        .await
        .expect("client builds");
    let routes = client.routes();

    assert_eq!(routes.get(Operation::ListDocuments), "/x/workspaces/{slug}/documents");
    assert_eq!(routes.get(Operation::Attach), Operation::Attach.default_route());
}

#[tokio::test]
async fn test_discovery_skips_unparseable_json_description() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs-json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{not json"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paths": {"/x/workspaces/{slug}/documents": {"get": {}}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnythingLlmClient::connect(&settings(&server.uri()))
        .await
        .expect("client builds");

    assert_eq!(
        client.routes().get(Operation::ListDocuments),
        "/x/workspaces/{slug}/documents"
    );
}

#[tokio::test]
async fn test_discovery_reads_routes_from_description() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs-json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paths": {
                "/api/v2/workspaces/{slug}/upload": {"post": {}},
                "/api/v2/workspaces/{slug}/documents/add": {"post": {}},
                "/api/v2/workspaces/{slug}/documents/sources": {"get": {}},
                "/api/v2/workspaces/{slug}/documents": {"get": {}}
            }
        })))
        .mount(&server)
        .await;

    let client = AnythingLlmClient::connect(&settings(&server.uri()))
        .await
        .expect("client builds");
    let routes = client.routes();

    assert_eq!(routes.get(Operation::UploadWorkspace), "/api/v2/workspaces/{slug}/upload");
    assert_eq!(routes.get(Operation::Attach), "/api/v2/workspaces/{slug}/documents/add");
    assert_eq!(routes.get(Operation::ListDocuments), "/api/v2/workspaces/{slug}/documents");
    assert_eq!(
        routes.get(Operation::Embed),
        Operation::Embed.default_route(),
        "undeclared operations keep their default"
    );
    assert_eq!(
        client.url_for(routes.get(Operation::Attach)),
        format!("{}/api/v2/workspaces/default/documents/add", server.uri())
    );
}

#[tokio::test]
async fn test_upload_tries_field_names_in_order() {
    let server = MockServer::start().await;
    for name in ["file", "files"] {
        Mock::given(method("POST"))
            .and(path(UPLOAD))
            .and(body_string_contains(field(name)))
            .respond_with(ResponseTemplate::new(422).set_body_string("wrong field"))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .and(body_string_contains(field("document")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"documents": [{"id": "doc-1"}]})),
        )
        .mount(&server)
        .await;

    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), RouteTable::defaults())
        .expect("client builds");
    let (_dir, files) = markdown_files(&["a.md"]);

    let ids = client.upload_file(&files[0]).await.expect("upload succeeds");
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].as_str(), "doc-1");

    let requests = server.received_requests().await.unwrap();
    let fields: Vec<&str> = requests
        .iter()
        .map(|req| {
            let body = String::from_utf8_lossy(&req.body).into_owned();
            ["file", "files", "document", "documents"]
                .into_iter()
                .find(|name| body.contains(&field(name)))
                .unwrap_or("?")
        })
        .collect();
    assert_eq!(fields, vec!["file", "files", "document"]);
}

#[tokio::test]
async fn test_workspace_upload_success_skips_user_library() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ws/default/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "w1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
        .expect(0)
        .mount(&server)
        .await;

    let routes = RouteTable::defaults()
        .with_route(Operation::UploadWorkspace, "/ws/{workspace}/upload")
        .with_route(Operation::UploadUserLibrary, "/user/upload");
    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), routes).unwrap();
    let (_dir, files) = markdown_files(&["a.md"]);

    let ids = client.upload_file(&files[0]).await.unwrap();
    assert_eq!(ids[0].as_str(), "w1");
}

#[tokio::test]
async fn test_upload_falls_through_to_user_library() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ws/default/upload"))
        .respond_with(ResponseTemplate::new(404))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/upload"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"result": {"document_id": 9}}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let routes = RouteTable::defaults()
        .with_route(Operation::UploadWorkspace, "/ws/{workspace}/upload")
        .with_route(Operation::UploadUserLibrary, "/user/upload");
    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), routes).unwrap();
    let (_dir, files) = markdown_files(&["a.md"]);

    let ids = client.upload_file(&files[0]).await.unwrap();
    assert_eq!(ids[0].as_str(), "9");
}

#[tokio::test]
async fn test_accepted_without_id_is_reported_as_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), RouteTable::defaults())
        .unwrap();
    let (_dir, files) = markdown_files(&["a.md"]);

    match client.upload_file(&files[0]).await {
        Err(StoreError::UploadExhausted {
            accepted_without_ids,
            ..
        }) => {
            // default upload route plus two legacy routes, four field names each
            assert_eq!(accepted_without_ids, 12);
        }
        other => panic!("expected UploadExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unrecognised_listing_gives_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"not_documents": []})))
        .mount(&server)
        .await;

    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), RouteTable::defaults())
        .unwrap();

    assert!(matches!(
        client.list_documents().await,
        Err(StoreError::UnrecognisedBody { .. })
    ));
    assert_eq!(client.count_documents().await, -1);
}

#[tokio::test]
async fn test_unreachable_listing_gives_sentinel() {
    let client =
        AnythingLlmClient::with_routes(&settings("http://127.0.0.1:1"), RouteTable::defaults())
            .unwrap();
    assert_eq!(client.count_documents().await, -1);
}

#[tokio::test]
async fn test_requests_carry_both_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBED))
        .and(header("authorization", "Bearer secret-key"))
        .and(header("x-anythingllm-access-token", "secret-key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), RouteTable::defaults())
        .unwrap();
    client.embed().await.expect("embed accepted");
}

#[tokio::test]
async fn test_attach_rejects_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ATTACH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), RouteTable::defaults())
        .unwrap();
    match client.attach(&[DocumentId::from("a")]).await {
        Err(StoreError::Status { status, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Status error, got {other:?}"),
    }
}

#[test]
fn test_missing_api_key_is_rejected_before_any_request() {
    let mut settings = settings("http://127.0.0.1:1");
    settings.api_key = "  ".to_string();
    assert!(matches!(
        AnythingLlmClient::with_routes(&settings, RouteTable::defaults()),
        Err(StoreError::Setup(_))
    ));
}

#[tokio::test]
async fn test_push_end_to_end() {
    let server = MockServer::start().await;
    for (file, id) in [("a.md", "doc-a"), ("b.md", "doc-b")] {
        Mock::given(method("POST"))
            .and(path(UPLOAD))
            .and(body_string_contains(field("file")))
            .and(body_string_contains(format!("filename=\"{file}\"")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": [{"id": id}]})))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(ATTACH))
        .and(body_string_contains("doc-a"))
        .and(body_string_contains("doc-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(EMBED))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": [{}, {}]})))
        .mount(&server)
        .await;

    let client = AnythingLlmClient::with_routes(&settings(&server.uri()), RouteTable::defaults())
        .unwrap();
    let (_dir, files) = markdown_files(&["a.md", "b.md"]);

    let report = push_files(&client, &files).await;

    assert_eq!(report.documents_uploaded, 2);
    assert_eq!(report.documents_attached, 2);
    assert!(report.embed_requested);
    assert_eq!(report.documents_visible, 2);
    assert!(report.failed.is_empty());
}
