//! HTTP API tests
//!
//! The full router is driven in-process with `tower::ServiceExt::oneshot`,
//! so every request passes through CORS, request tracking and security.
//! Each test gets a fresh in-memory database and logs in as the default admin.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Html;
use axum::routing::get as get_route;
use axum::Router;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use plin_web::auth::{AuthConfig, JwtService, TokenKind, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD};
use plin_web::cors::CorsConfig;
use plin_web::fetch::{FetchOptions, PageFetcher, WebScraper};
use plin_web::handlers::{router, AppState};
use plin_web::security::{SecurityConfig, SecurityLayer};
use plin_web::store::Store;
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "plin-test-boundary";

// ============================================================================
// Helpers
// ============================================================================

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    token: String,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_upload_limit(None).await
    }

    async fn with_upload_limit(limit: Option<usize>) -> Self {
        let store = Store::in_memory().await.unwrap();
        let scraper = WebScraper::new(PageFetcher::new(FetchOptions::default()).unwrap());
        let mut state = AppState::new(store, scraper, &auth_config());
        if let Some(limit) = limit {
            state = state.with_max_upload_bytes(limit);
        }
        let state = Arc::new(state);
        let security = SecurityLayer::new(SecurityConfig::default(), state.authenticator());
        let router = router(Arc::clone(&state), security, CorsConfig::default());

        let mut app = Self {
            router,
            state,
            token: String::new(),
        };
        let (status, _) = app
            .send(anonymous_json(
                Method::POST,
                "/api/users/create-default-admin",
                json!({}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        app.token = app.login(DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).await;
        app
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(anonymous_json(
                Method::POST,
                "/api/users/login",
                json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }

    fn authed(&self, method: Method, uri: &str) -> axum::http::request::Builder {
        with_token(method, uri, &self.token)
    }

    fn get(&self, uri: &str) -> Request<Body> {
        self.authed(Method::GET, uri).body(Body::empty()).unwrap()
    }

    fn delete(&self, uri: &str) -> Request<Body> {
        self.authed(Method::DELETE, uri).body(Body::empty()).unwrap()
    }

    fn json(&self, method: Method, uri: &str, body: Value) -> Request<Body> {
        json_body(self.authed(method, uri), body)
    }

    async fn create_client(&self, name: &str, email: &str) -> i64 {
        let (status, body) = self
            .send(self.json(
                Method::POST,
                "/api/clients",
                json!({ "name": name, "email": email }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_i64().unwrap()
    }

    async fn create_document(&self, client_id: i64, title: &str) -> i64 {
        let (status, body) = self
            .send(self.json(
                Method::POST,
                "/api/documents",
                json!({ "title": title, "content": "Some content", "client_id": client_id }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_i64().unwrap()
    }

    /// Create a plain user through the API and return its id and access token
    async fn create_user(&self, email: &str, password: &str) -> (i64, String) {
        let (status, body) = self
            .send(self.json(
                Method::POST,
                "/api/users",
                json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let id = body["data"]["id"].as_i64().unwrap();
        (id, self.login(email, password).await)
    }
}

fn auth_config() -> AuthConfig {
    AuthConfig::default()
        .with_secret("api-test-secret")
        .with_password_cost(4)
}

fn with_token(method: Method, uri: &str, token: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
}

fn json_body(builder: axum::http::request::Builder, body: Value) -> Request<Body> {
    builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn anonymous_json(method: Method, uri: &str, body: Value) -> Request<Body> {
    json_body(Request::builder().method(method).uri(uri), body)
}

fn sample_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("Invoice total")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn multipart_upload(
    app: &TestApp,
    file: Option<(&str, &str, &[u8])>,
    client_id: Option<&str>,
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(client_id) = client_id {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"client_id\"\r\n\r\n{}\r\n",
                BOUNDARY, client_id
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"pdf\"; filename=\"{}\"\r\n\
                 Content-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    app.authed(Method::POST, "/api/upload/pdf")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

// ============================================================================
// Security and status
// ============================================================================

#[tokio::test]
async fn test_api_requires_valid_access_token() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .uri("/api/clients")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Authorization token not provided");

    let request = Request::builder()
        .uri("/api/clients")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token format. Expected: Bearer <token>");

    let request = with_token(Method::GET, "/api/clients", "wrong-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    // Signed with another secret
    let admin = app.state.store.get_user(1).await.unwrap();
    let foreign = JwtService::new(&AuthConfig::default().with_secret("someone-else"))
        .issue_pair(&admin)
        .unwrap();
    let request = with_token(Method::GET, "/api/clients", &foreign.access_token)
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_and_refresh_tokens_are_rejected() {
    let app = TestApp::new().await;
    let admin = app.state.store.get_user(1).await.unwrap();
    let jwt = JwtService::new(&auth_config());

    let expired = jwt
        .sign(&jwt.claims(&admin, TokenKind::Access, chrono::Duration::hours(-2)))
        .unwrap();
    let request = with_token(Method::GET, "/api/clients", &expired)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token expired");

    let refresh = jwt.issue_pair(&admin).unwrap().refresh_token;
    let request = with_token(Method::GET, "/api/clients", &refresh)
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_of_deleted_user_is_rejected() {
    let app = TestApp::new().await;
    let (id, token) = app.create_user("temp@plin.dev", "secret1").await;

    let (status, _) = app.send(app.delete(&format!("/api/users/{}", id))).await;
    assert_eq!(status, StatusCode::OK);

    let request = with_token(Method::GET, "/api/clients", &token)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_health_and_index_bypass_auth() {
    let app = TestApp::new().await;

    for uri in ["/", "/health", "/ready", "/status"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert!(body.is_object(), "{}", uri);
    }
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = TestApp::new().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn test_status_reports_counts() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    app.create_document(client_id, "Contract").await;

    let (status, body) = app.send(app.get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "plin-web");
    assert_eq!(body["clients"], 1);
    assert_eq!(body["documents"], 1);
    assert_eq!(body["pages_scraped"], 0);

    let other = app.create_client("Globex", "it@globex.test").await;
    app.create_document(other, "Hidden with its client").await;
    app.send(app.delete(&format!("/api/clients/{}", other))).await;

    let (_, body) = app.send(app.get("/status")).await;
    assert_eq!(body["clients"], 1);
    assert_eq!(body["documents"], 1);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = TestApp::new().await;
    let (status, body) = app.send(app.get("/api/nothing-here")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Route /api/nothing-here not found");
}

#[tokio::test]
async fn test_cors_preflight_from_localhost() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/clients")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
}

// ============================================================================
// Users and login
// ============================================================================

#[tokio::test]
async fn test_login_and_refresh() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(anonymous_json(
            Method::POST,
            "/api/users/login",
            json!({ "email": "ADMIN@plim.com", "password": DEFAULT_ADMIN_PASSWORD }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["data"]["user"]["email"], DEFAULT_ADMIN_EMAIL);
    assert_eq!(body["data"]["user"]["role"], "ADMIN");
    assert!(body["data"]["user"].get("password_hash").is_none());
    assert_eq!(body["data"]["expiresIn"], 24 * 60 * 60);
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(anonymous_json(
            Method::POST,
            "/api/users/refresh-token",
            json!({ "refreshToken": refresh }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let access = body["data"]["accessToken"].as_str().unwrap();

    let request = with_token(Method::GET, "/api/users", access)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    // An access token is not a refresh token
    let (status, _) = app
        .send(anonymous_json(
            Method::POST,
            "/api/users/refresh-token",
            json!({ "refreshToken": app.token }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(anonymous_json(Method::POST, "/api/users/refresh-token", json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "refreshToken is required");
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(anonymous_json(
            Method::POST,
            "/api/users/login",
            json!({ "email": DEFAULT_ADMIN_EMAIL }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "email and password are required");

    for (email, password) in [
        (DEFAULT_ADMIN_EMAIL, "wrong-password"),
        ("nobody@plin.dev", DEFAULT_ADMIN_PASSWORD),
    ] {
        let (status, body) = app
            .send(anonymous_json(
                Method::POST,
                "/api/users/login",
                json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");
    }
}

#[tokio::test]
async fn test_default_admin_is_created_once() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(anonymous_json(
            Method::POST,
            "/api/users/create-default-admin",
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], 1);

    let (_, body) = app.send(app.get("/api/users")).await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_user_management() {
    let app = TestApp::new().await;
    let (id, _) = app.create_user("ana@plin.dev", "secret1").await;

    let (status, body) = app.send(app.get(&format!("/api/users/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ana@plin.dev");
    assert_eq!(body["data"]["role"], "USER");

    let (status, body) = app
        .send(app.json(
            Method::POST,
            "/api/users",
            json!({ "email": "Ana@Plin.dev", "password": "secret1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, body) = app
        .send(app.json(
            Method::POST,
            "/api/users",
            json!({ "email": "short@plin.dev", "password": "abc" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("6 characters"));

    let (status, body) = app
        .send(app.json(
            Method::PUT,
            &format!("/api/users/{}", id),
            json!({ "password": "changed-pw", "role": "ADMIN" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["role"], "ADMIN");
    app.login("ana@plin.dev", "changed-pw").await;

    let (status, _) = app.send(app.delete(&format!("/api/users/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.send(app.get(&format!("/api/users/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_user_changes_require_admin() {
    let app = TestApp::new().await;
    let (id, token) = app.create_user("bo@plin.dev", "secret1").await;

    let request = json_body(
        with_token(Method::POST, "/api/users", &token),
        json!({ "email": "eve@plin.dev", "password": "secret1" }),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access denied: administrator role required");

    let request = with_token(Method::DELETE, &format!("/api/users/{}", id), &token)
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Reading is open to any user
    let request = with_token(Method::GET, "/api/users", &token)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
}

// ============================================================================
// Clients
// ============================================================================

#[tokio::test]
async fn test_client_crud() {
    let app = TestApp::new().await;
    let id = app.create_client("Acme Corp", "ops@acme.test").await;

    let (status, body) = app.send(app.get(&format!("/api/clients/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Acme Corp");
    assert_eq!(body["data"]["documents_count"], 0);
    assert_eq!(body["data"]["created_by"], 1);

    let (status, body) = app.send(
        app.json(
            Method::PUT,
            &format!("/api/clients/{}", id),
            json!({ "name": "Acme Inc" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Acme Inc");
    assert_eq!(body["data"]["email"], "ops@acme.test");

    let (status, body) = app.send(app.delete(&format!("/api/clients/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = app.send(app.get(&format!("/api/clients/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Client not found");
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let app = TestApp::new().await;
    app.create_client("First", "same@example.com").await;

    let (status, body) = app.send(
        app.json(
            Method::POST,
            "/api/clients",
            json!({ "name": "Second", "email": "SAME@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_client_validation_errors() {
    let app = TestApp::new().await;

    let (status, _) = app.send(
        app.json(
            Method::POST,
            "/api/clients",
            json!({ "name": "A", "email": "a@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(
        app.json(
            Method::POST,
            "/api/clients",
            json!({ "name": "Valid Name", "email": "not-an-email" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = app.authed(Method::POST, "/api/clients")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let app = TestApp::new().await;
    let (status, body) = app.send(app.get("/api/clients/abc")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid ID format");
}

#[tokio::test]
async fn test_client_list_pagination_and_search() {
    let app = TestApp::new().await;
    for i in 0..12 {
        app.create_client(&format!("Client {}", i), &format!("c{}@example.com", i)).await;
    }
    app.create_client("Zebra Studio", "hello@zebra.test").await;

    let (status, body) = app.send(app.get("/api/clients?page=2&limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 13);
    assert_eq!(body["count"], 5);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["currentPage"], 2);

    let (_, body) = app.send(app.get("/api/clients?search=ZEBRA")).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["name"], "Zebra Studio");

    let (status, _) = app.send(app.get("/api/clients?page=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn test_document_crud() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let doc_id = app.create_document(client_id, "Contract").await;

    let (status, body) = app.send(app.get(&format!("/api/documents/{}", doc_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Contract");
    assert_eq!(body["data"]["type"], "pdf");
    assert_eq!(body["data"]["client"]["id"], client_id);

    let (status, body) = app.send(
        app.json(
            Method::PUT,
            &format!("/api/documents/{}", doc_id),
            json!({ "title": "Signed contract" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Signed contract");

    let (status, _) = app.send(app.delete(&format!("/api/documents/{}", doc_id))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(app.get(&format!("/api/documents/{}", doc_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Document not found");
}

#[tokio::test]
async fn test_document_requires_existing_client() {
    let app = TestApp::new().await;
    let (status, body) = app.send(
        app.json(
            Method::POST,
            "/api/documents",
            json!({ "title": "Orphan", "content": "text", "client_id": 999 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Client not found");
}

#[tokio::test]
async fn test_documents_by_client() {
    let app = TestApp::new().await;
    let acme = app.create_client("Acme Corp", "ops@acme.test").await;
    let globex = app.create_client("Globex", "it@globex.test").await;
    app.create_document(acme, "Acme one").await;
    app.create_document(acme, "Acme two").await;
    app.create_document(globex, "Globex one").await;

    let (status, body) = app.send(app.get(&format!("/api/documents/client/{}", acme))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (_, body) = app.send(app.get("/api/documents?search=globex")).await;
    assert_eq!(body["total"], 1);

    let (status, _) = app.send(app.get("/api/documents/client/4242")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_documents_by_uploader() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let admin_doc = app.create_document(client_id, "From admin").await;

    let (ana, token) = app.create_user("ana@plin.dev", "secret1").await;
    let request = json_body(
        with_token(Method::POST, "/api/documents", &token),
        json!({ "title": "From Ana", "content": "Notes", "client_id": client_id }),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["uploaded_by"], ana);

    let (_, body) = app.send(app.get(&format!("/api/documents/{}", admin_doc))).await;
    assert_eq!(body["data"]["uploaded_by"], 1);

    let (status, body) = app.send(app.get(&format!("/api/documents/user/{}", ana))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["title"], "From Ana");

    let (status, _) = app.send(app.get("/api/documents/user/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleting_client_hides_documents() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let doc_id = app.create_document(client_id, "Contract").await;

    app.send(app.delete(&format!("/api/clients/{}", client_id))).await;

    let (status, _) = app.send(app.get(&format!("/api/documents/{}", doc_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.send(app.get("/api/documents")).await;
    assert_eq!(body["total"], 0);
}

// ============================================================================
// Web scraping
// ============================================================================

#[tokio::test]
async fn test_scrape_validates_input_before_fetching() {
    let app = TestApp::new().await;

    let (status, body) = app.send(
        app.json(Method::POST, "/api/web/scrape", json!({ "client_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "url is required");

    let (status, _) = app.send(
        app.json(
            Method::POST,
            "/api/web/scrape",
            json!({ "url": "https://example.com/", "client_id": 77 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let (status, _) = app.send(
        app.json(
            Method::POST,
            "/api/web/scrape",
            json!({ "url": "not-a-url", "client_id": client_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Title longer than the stored maximum
fn long_title() -> String {
    "Quarterly report ".repeat(20)
}

async fn spawn_site() -> SocketAddr {
    let page = format!(
        "<html><head><title>{}</title>\
         <meta name=\"description\" content=\"Numbers for the quarter\"></head>\
         <body><main><p>{}</p><a href=\"/next\">Next</a></main></body></html>",
        long_title(),
        "Revenue grew steadily across every region this quarter. ".repeat(5)
    );
    let site = Router::new().route(
        "/report",
        get_route(move || {
            let page = page.clone();
            async move { Html(page) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, site).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_scrape_stores_page_as_url_document() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let addr = spawn_site().await;
    let url = format!("http://{}/report", addr);

    let (status, body) = app
        .send(app.json(
            Method::POST,
            "/api/web/scrape",
            json!({ "url": url, "client_id": client_id }),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Web page processed and document created");
    assert_eq!(body["data"]["type"], "url");
    assert_eq!(body["data"]["client_id"], client_id);
    assert_eq!(body["data"]["uploaded_by"], 1);

    let title = body["data"]["title"].as_str().unwrap();
    assert_eq!(title.chars().count(), 255);
    assert!(long_title().starts_with(title));
    assert!(body["data"]["content"]
        .as_str()
        .unwrap()
        .starts_with("Revenue grew steadily"));

    assert_eq!(body["metadata"]["sourceUrl"], url);
    assert!(body["metadata"]["contentLength"].as_u64().unwrap() > 0);
    assert_eq!(body["metadata"]["description"], "Numbers for the quarter");
    assert!(body["metadata"].get("source_url").is_none());
    assert_eq!(body["data"]["metadata"]["sourceUrl"], url);

    let (_, body) = app.send(app.get("/status")).await;
    assert_eq!(body["pages_scraped"], 1);
    assert_eq!(body["documents"], 1);
}

#[tokio::test]
async fn test_scrape_unreachable_site_is_bad_gateway() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let addr = spawn_site().await;

    let (status, body) = app
        .send(app.json(
            Method::POST,
            "/api/web/scrape",
            json!({ "url": format!("http://{}/missing", addr), "client_id": client_id }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{}", body);

    let (_, body) = app.send(app.get("/status")).await;
    assert_eq!(body["pages_scraped"], 0);
    assert_eq!(body["documents"], 0);
}

// ============================================================================
// PDF upload
// ============================================================================

#[tokio::test]
async fn test_pdf_upload_creates_document() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let pdf = sample_pdf();

    let (status, body) = app.send(
        multipart_upload(
            &app,
            Some(("invoice-42.pdf", "application/pdf", &pdf)),
            Some(&client_id.to_string()),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["message"], "PDF processed and document created");
    assert_eq!(body["data"]["title"], "invoice-42");
    assert_eq!(body["data"]["type"], "pdf");
    assert_eq!(body["data"]["uploaded_by"], 1);
    assert!(body["data"]["content"].as_str().unwrap().contains("Invoice"));
    assert_eq!(body["metadata"]["pages"], 1);
    assert_eq!(body["metadata"]["fileName"], "invoice-42.pdf");

    let (_, body) = app.send(app.get("/status")).await;
    assert_eq!(body["pdfs_processed"], 1);
}

#[tokio::test]
async fn test_pdf_upload_rejections() {
    let app = TestApp::new().await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let client_id = client_id.to_string();

    let (status, body) = app.send(multipart_upload(&app, None, Some(&client_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No PDF file was uploaded");

    let (status, body) = app.send(
        multipart_upload(&app, Some(("notes.txt", "text/plain", b"hello")), Some(&client_id)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only PDF files are allowed");

    let pdf = sample_pdf();
    let (status, _) = app.send(
        multipart_upload(&app, Some(("a.pdf", "application/pdf", &pdf)), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(
        multipart_upload(&app, Some(("a.pdf", "application/pdf", &pdf)), Some("999")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(
        multipart_upload(
            &app,
            Some(("broken.pdf", "application/pdf", b"not really a pdf")),
            Some(&client_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_pdf_upload_size_limit() {
    let app = TestApp::with_upload_limit(Some(1024)).await;
    let client_id = app.create_client("Acme Corp", "ops@acme.test").await;
    let big = vec![b'x'; 4096];

    let (status, body) = app.send(
        multipart_upload(
            &app,
            Some(("big.pdf", "application/pdf", &big)),
            Some(&client_id.to_string()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
}
