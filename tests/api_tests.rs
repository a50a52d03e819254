//! End-to-end tests for the admin API.
//!
//! Each test builds the real router over a temp directory and drives it with
//! `tower::ServiceExt::oneshot`, so no listener or network is involved.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use menu_admin::{router, AppConfig, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_USER: &str = "admin";
const ADMIN_PASS: &str = "s3cret";
const BOUNDARY: &str = "menu-admin-test-boundary";

struct TestApp {
    app: Router,
    dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::default()
            .with_admin(ADMIN_USER, ADMIN_PASS)
            .with_storage(dir.path().join("data/menu.json"), dir.path().join("img"));
        let app = router(Arc::new(AppState::new(config).unwrap()));
        Self { app, dir }
    }

    fn menu_path(&self) -> PathBuf {
        self.dir.path().join("data/menu.json")
    }

    fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("img")
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    async fn send_json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(req).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    /// Log in as admin and return the `name=value` cookie pair.
    async fn admin_cookie(&self) -> String {
        let (status, headers, _) = self
            .send(login("/api/login", ADMIN_USER, ADMIN_PASS, None))
            .await;
        assert_eq!(status, StatusCode::OK);
        cookie_pair(&headers).expect("login sets a session cookie")
    }
}

fn cookie_pair(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(SET_COOKIE)?.to_str().ok()?;
    value.split(';').next().map(str::to_string)
}

fn login(uri: &str, username: &str, password: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder
        .body(Body::from(
            json!({ "username": username, "password": password }).to_string(),
        ))
        .unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_menu(menu: &Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/menu").header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(menu.to_string())).unwrap()
}

fn file_part(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(data);
    part.extend_from_slice(b"\r\n");
    part
}

fn text_part(field: &str, value: &str) -> Vec<u8> {
    format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n").into_bytes()
}

fn multipart_request(body: Vec<u8>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/upload")
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// A complete multipart body made of `parts`.
fn multipart(parts: &[Vec<u8>], cookie: Option<&str>) -> Request<Body> {
    let mut body = parts.concat();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    multipart_request(body, cookie)
}

fn upload(field: &str, filename: &str, content_type: &str, data: &[u8], cookie: Option<&str>) -> Request<Body> {
    multipart(&[file_part(field, filename, content_type, data)], cookie)
}

fn menu_with_items(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({ "name": format!("Burger {i}"), "price": 1000 + i, "img": "img/fastfood/burger.jpg" }))
        .collect();
    json!({
        "items": items,
        "featured": { "name": "Doble Cheddar", "price": 2500 },
        "beverages": [{ "name": "Cola", "price": 800 }]
    })
}

fn files_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_admin_login_and_session() {
    let app = TestApp::new();

    let (_, body) = app.send_json(get("/api/session", None)).await;
    assert_eq!(body, json!({ "authenticated": false }));

    let (status, headers, body) = app
        .send(login("/api/login", ADMIN_USER, ADMIN_PASS, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "ok": true }));

    let set_cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age=28800"));

    let cookie = cookie_pair(&headers).unwrap();
    let (status, body) = app.send_json(get("/api/session", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "authenticated": true }));
}

#[tokio::test]
async fn test_admin_login_wrong_password() {
    let app = TestApp::new();

    let (status, headers, body) = app
        .send(login("/api/login", ADMIN_USER, "nope", None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.get(SET_COOKIE).is_none());
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "error": "Invalid username or password." })
    );
}

#[tokio::test]
async fn test_admin_login_accepts_form_body() {
    let app = TestApp::new();

    let req = Request::post("/api/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={ADMIN_USER}&password={ADMIN_PASS}")))
        .unwrap();
    let (status, headers, _) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie_pair(&headers).is_some());
}

#[tokio::test]
async fn test_admin_login_disabled_without_credentials() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::default().with_storage(dir.path().join("menu.json"), dir.path().join("img"));
    let app = router(Arc::new(AppState::new(config).unwrap()));

    let response = app
        .oneshot(login("/api/login", "", "", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_demo_login_is_independent_of_admin() {
    let app = TestApp::new();

    let (status, headers, _) = app.send(login("/api/demo-login", "demo", "demo", None)).await;
    assert_eq!(status, StatusCode::OK);
    let cookie = cookie_pair(&headers).unwrap();

    let (_, body) = app.send_json(get("/api/demo-session", Some(&cookie))).await;
    assert_eq!(body, json!({ "authenticated": true }));
    let (_, body) = app.send_json(get("/api/session", Some(&cookie))).await;
    assert_eq!(body, json!({ "authenticated": false }));

    // The demo flag never opens protected operations.
    let (status, _) = app.send_json(post_menu(&menu_with_items(8), Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_demo_login_wrong_password() {
    let app = TestApp::new();

    let (status, body) = app.send_json(login("/api/demo-login", "demo", "wrong", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Invalid credentials." }));
}

#[tokio::test]
async fn test_admin_and_demo_flags_share_one_session() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    // Logging in again on a live session reuses it: no new cookie.
    let (status, headers, _) = app
        .send(login("/api/demo-login", "demo", "demo", Some(&cookie)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(SET_COOKIE).is_none());

    let (_, body) = app.send_json(get("/api/session", Some(&cookie))).await;
    assert_eq!(body, json!({ "authenticated": true }));
    let (_, body) = app.send_json(get("/api/demo-session", Some(&cookie))).await;
    assert_eq!(body, json!({ "authenticated": true }));
}

#[tokio::test]
async fn test_logout_destroys_session() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let req = Request::post("/api/logout")
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "ok": true }));
    assert!(headers
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));

    // The old cookie no longer authenticates.
    let (_, body) = app.send_json(get("/api/session", Some(&cookie))).await;
    assert_eq!(body, json!({ "authenticated": false }));
    let (status, _) = app.send_json(post_menu(&menu_with_items(8), Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_session_succeeds() {
    let app = TestApp::new();

    let req = Request::post("/api/logout").body(Body::empty()).unwrap();
    let (status, body) = app.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn test_tampered_cookie_is_anonymous() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let (name, value) = cookie.split_once('=').unwrap();
    let (token, signature) = value.rsplit_once('.').unwrap();
    let flipped = if signature.starts_with('0') { "1" } else { "0" };
    let tampered = format!("{name}={token}.{flipped}{}", &signature[1..]);

    let (_, body) = app.send_json(get("/api/session", Some(&tampered))).await;
    assert_eq!(body, json!({ "authenticated": false }));

    let unsigned = format!("{name}={token}");
    let (_, body) = app.send_json(get("/api/session", Some(&unsigned))).await;
    assert_eq!(body, json!({ "authenticated": false }));
}

// =============================================================================
// Menu
// =============================================================================

#[tokio::test]
async fn test_menu_write_requires_admin() {
    let app = TestApp::new();

    let (status, body) = app.send_json(post_menu(&menu_with_items(8), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Not authorized. Please sign in first." }));
    assert!(!app.menu_path().exists());
}

#[tokio::test]
async fn test_menu_round_trip() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;
    let menu = menu_with_items(8);

    let (status, body) = app.send_json(post_menu(&menu, Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    // Reading is public.
    let (status, headers, body) = app.send(get("/api/menu", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), menu);

    // Stored pretty-printed with a 2-space indent.
    let on_disk = std::fs::read_to_string(app.menu_path()).unwrap();
    assert!(on_disk.starts_with("{\n  \"items\": ["));
}

#[tokio::test]
async fn test_menu_wrong_item_count_leaves_file_unchanged() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let (status, _) = app.send_json(post_menu(&menu_with_items(8), Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let before = std::fs::read(app.menu_path()).unwrap();

    for count in [7, 9] {
        let (status, body) = app
            .send_json(post_menu(&menu_with_items(count), Some(&cookie)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "menu must have exactly 8 items" }));
    }

    assert_eq!(std::fs::read(app.menu_path()).unwrap(), before);
}

#[tokio::test]
async fn test_menu_structure_errors() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let mut missing_featured = menu_with_items(8);
    missing_featured["featured"] = Value::Null;
    let mut bad_beverages = menu_with_items(8);
    bad_beverages["beverages"] = json!({ "name": "Cola" });

    for menu in [missing_featured, bad_beverages] {
        let (status, body) = app.send_json(post_menu(&menu, Some(&cookie))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "invalid menu structure" }));
    }
    assert!(!app.menu_path().exists());
}

#[tokio::test]
async fn test_menu_write_requires_json_content_type() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let req = Request::post("/api/menu")
        .header(CONTENT_TYPE, "text/plain")
        .header(COOKIE, &cookie)
        .body(Body::from(menu_with_items(8).to_string()))
        .unwrap();
    let (status, body) = app.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "menu must have exactly 8 items" }));
    assert!(!app.menu_path().exists());

    let req = Request::post("/api/menu")
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .header(COOKIE, &cookie)
        .body(Body::from(menu_with_items(8).to_string()))
        .unwrap();
    let (status, _) = app.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.menu_path().exists());
}

#[tokio::test]
async fn test_menu_read_without_lock_file() {
    let app = TestApp::new();
    let menu = menu_with_items(8);
    std::fs::create_dir_all(app.menu_path().parent().unwrap()).unwrap();
    std::fs::write(app.menu_path(), serde_json::to_vec_pretty(&menu).unwrap()).unwrap();

    let (status, _, body) = app.send(get("/api/menu", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), menu);
    assert!(!app.menu_path().with_extension("lock").exists());
}

#[tokio::test]
async fn test_menu_read_missing_file_is_server_error() {
    let app = TestApp::new();

    let (status, body) = app.send_json(get("/api/menu", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Could not read the menu.");
    assert!(body["reference"].as_str().is_some_and(|r| r.starts_with("ERR-")));
}

// =============================================================================
// Uploads
// =============================================================================

#[tokio::test]
async fn test_upload_requires_admin() {
    let app = TestApp::new();

    let (status, _) = app
        .send_json(upload("image", "burger.jpg", "image/jpeg", b"jpeg", None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(files_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_upload_stores_image() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let (status, body) = app
        .send_json(upload("image", "Doble Cheddar.JPG", "image/jpeg", b"\xff\xd8\xff\xe0jpeg", Some(&cookie)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let path = body["path"].as_str().unwrap();
    assert!(path.starts_with("img/fastfood/doble-cheddar-"));
    assert!(path.ends_with(".jpg"));

    let stored = files_in(&app.upload_dir());
    assert_eq!(stored.len(), 1);
    assert_eq!(format!("img/fastfood/{}", stored[0]), path);
    assert_eq!(
        std::fs::read(app.upload_dir().join(&stored[0])).unwrap(),
        b"\xff\xd8\xff\xe0jpeg"
    );
}

#[tokio::test]
async fn test_upload_rejects_text_plain() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let (status, body) = app
        .send_json(upload("image", "notes.txt", "text/plain", b"hello", Some(&cookie)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "Only JPEG, PNG or WEBP images are allowed (image/jpeg, image/png, image/webp)." })
    );
    assert!(files_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;
    let data = vec![0u8; 6 * 1024 * 1024];

    let (status, body) = app
        .send_json(upload("image", "huge.jpg", "image/jpeg", &data, Some(&cookie)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "File exceeds the 5 MiB limit." }));
    assert!(files_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_upload_same_name_twice_gives_distinct_files() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let (_, first) = app
        .send_json(upload("image", "burger.png", "image/png", b"one", Some(&cookie)))
        .await;
    let (_, second) = app
        .send_json(upload("image", "burger.png", "image/png", b"two", Some(&cookie)))
        .await;

    assert_ne!(first["path"], second["path"]);
    let stored = files_in(&app.upload_dir());
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|name| name.starts_with("burger-") && name.ends_with(".png")));
}

#[tokio::test]
async fn test_upload_unexpected_field() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let (status, body) = app
        .send_json(upload("photo", "burger.jpg", "image/jpeg", b"jpeg", Some(&cookie)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Unexpected file field: photo" }));
    assert!(files_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_upload_second_image_discards_the_first() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let req = multipart(
        &[
            file_part("image", "first.jpg", "image/jpeg", b"first"),
            file_part("image", "second.jpg", "image/jpeg", b"second"),
        ],
        Some(&cookie),
    );
    let (status, body) = app.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Unexpected file field: image" }));
    assert!(files_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_upload_stray_field_after_image_discards_it() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let req = multipart(
        &[
            file_part("image", "burger.png", "image/png", b"png"),
            file_part("thumbnail", "thumb.png", "image/png", b"thumb"),
        ],
        Some(&cookie),
    );
    let (status, body) = app.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Unexpected file field: thumbnail" }));
    assert!(files_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_upload_ignores_text_fields() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let req = multipart(
        &[
            text_part("caption", "Doble Cheddar"),
            file_part("image", "a.png", "image/png", b"png"),
            text_part("note", "after the file"),
        ],
        Some(&cookie),
    );
    let (status, body) = app.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let stored = files_in(&app.upload_dir());
    assert_eq!(stored.len(), 1);
    assert!(stored[0].starts_with("a-") && stored[0].ends_with(".png"));
    assert_eq!(body["path"], format!("img/fastfood/{}", stored[0]));
}

#[tokio::test]
async fn test_upload_truncated_stream_is_rejected() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    // No closing boundary: the stream ends inside the file part.
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"cut.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(b"partial jpeg data");

    let (status, body) = app.send_json(multipart_request(body, Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Malformed upload"));
    assert!(files_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_upload_without_file() {
    let app = TestApp::new();
    let cookie = app.admin_cookie().await;

    let req = Request::post("/api/upload")
        .header(COOKIE, &cookie)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = app.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file received." }));
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();
    app.admin_cookie().await;

    let (status, body) = app.send_json(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body.get("version").is_some());
    assert_eq!(body["active_sessions"], 1);
}
