use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use scene_image_service::cache::{FileGenerationStore, LocalFileStorage};
use scene_image_service::catalog::{Book, InMemoryCatalog, ReadingClub};
use scene_image_service::config::{OpenAiConfig, SceneImageConfig};
use scene_image_service::openai::OpenAiClient;
use scene_image_service::rate_limit::RateLimiter;
use scene_image_service::routes::{AppState, router};
use scene_image_service::scene::{PromptCrafter, SceneImageOrchestrator};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FRAGMENT: &str = "Bilbo camina por el bosque oscuro bajo la lluvia de la noche";
const BOOK_SCENE: &str = "/api/books/book-1/scene-image";
const BOOK_COUNT: &str = "/api/books/book-1/scene-generations/count";
const IMAGES_PATH: &str = "/v1/images/generations";

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new(
        vec![Book {
            id: "book-1".to_string(),
            title: "El Hobbit".to_string(),
            author: "J.R.R. Tolkien".to_string(),
            synopsis: Some("Un hobbit emprende una aventura".to_string()),
            categories: vec!["Fantasy".to_string()],
        }],
        vec![ReadingClub {
            id: "club-1".to_string(),
            name: "Lectores de la Comarca".to_string(),
            book_id: "book-1".to_string(),
        }],
    )
}

fn build_app(server: &MockServer, cache_dir: &TempDir, requests_per_minute: u32) -> Router {
    let openai = Arc::new(
        OpenAiClient::new(OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            base_url: format!("{}/v1", server.uri()),
            timeout_secs: 5,
            image_timeout_secs: 5,
            max_retries: 2,
            chat_retry_base_delay_ms: 1,
            image_retry_base_delay_ms: 1,
            max_retry_delay_ms: 5,
            ..OpenAiConfig::default()
        })
        .unwrap(),
    );
    let store = Arc::new(FileGenerationStore::new(LocalFileStorage::new(
        cache_dir.path().to_path_buf(),
    )));
    let orchestrator = Arc::new(SceneImageOrchestrator::new(
        Arc::new(catalog()),
        Arc::new(PromptCrafter::new(openai.clone())),
        openai,
        store,
        SceneImageConfig::default(),
    ));
    router(AppState::new(
        orchestrator,
        Arc::new(RateLimiter::per_minute(requests_per_minute)),
    ))
}

async fn mount_chat_outage(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

async fn mount_image_success(server: &MockServer, url: &str) {
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"url": url, "revised_prompt": "a dark forest in the rain"}]
        })))
        .mount(server)
        .await;
}

async fn mount_image_unavailable(server: &MockServer, times: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"));
    match times {
        Some(times) => mock.up_to_n_times(times).mount(server).await,
        None => mock.mount(server).await,
    }
}

fn post_raw(uri: &str, client: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body))
        .unwrap()
}

fn post_json(uri: &str, client: &str, body: Value) -> Request<Body> {
    post_raw(uri, client, body.to_string())
}

fn book_scene(client: &str, text: &str) -> Request<Body> {
    post_json(BOOK_SCENE, client, json!({ "text": text }))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn image_calls(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == IMAGES_PATH)
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_generates_with_fallback_prompt_and_reuses_result() {
    let server = MockServer::start().await;
    mount_chat_outage(&server).await;
    mount_image_success(&server, "https://images.example.com/forest.png").await;
    let cache_dir = TempDir::new().unwrap();
    let app = build_app(&server, &cache_dir, 10);

    let (status, first) = send(&app, book_scene("10.0.0.1", FRAGMENT)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["book_id"], "book-1");
    assert_eq!(first["image_url"], "https://images.example.com/forest.png");
    assert_eq!(first["size"], "2048x1024");
    assert_eq!(first["style"], "photorealistic");
    let prompt = first["crafted_prompt"].as_str().unwrap();
    assert!(prompt.starts_with("360° equirectangular panorama (2:1 aspect ratio)"));
    assert!(prompt.contains("El Hobbit"));

    let calls = image_calls(&server).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["prompt"], first["crafted_prompt"]);

    // same fragment modulo case and whitespace
    let repeat = format!("  {}  ", FRAGMENT.to_uppercase());
    let (status, second) = send(&app, book_scene("10.0.0.1", &repeat)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["crafted_prompt"], first["crafted_prompt"]);
    assert_eq!(second["created_at"], first["created_at"]);
    assert_eq!(image_calls(&server).await.len(), 1);

    let (_, listed) = send(&app, get("/api/books/book-1/scene-generations")).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, count) = send(&app, get(BOOK_COUNT)).await;
    assert_eq!(count, json!(1));
}

#[tokio::test]
async fn test_transient_image_failures_are_retried_before_persisting() {
    let server = MockServer::start().await;
    mount_chat_outage(&server).await;
    mount_image_unavailable(&server, Some(2)).await;
    mount_image_success(&server, "https://images.example.com/third-try.png").await;
    let cache_dir = TempDir::new().unwrap();
    let app = build_app(&server, &cache_dir, 10);

    let (status, body) = send(&app, book_scene("10.0.0.4", FRAGMENT)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image_url"], "https://images.example.com/third-try.png");
    assert_eq!(image_calls(&server).await.len(), 3);

    let (_, listed) = send(&app, get("/api/books/book-1/scene-generations")).await;
    let records = listed.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["image_url"], "https://images.example.com/third-try.png");
    assert_eq!(records[0]["revised_prompt"], "a dark forest in the rain");
    assert_eq!(records[0]["subject_id"], "book:book-1");
}

#[tokio::test]
async fn test_exhausted_image_retries_persist_nothing() {
    let server = MockServer::start().await;
    mount_chat_outage(&server).await;
    mount_image_unavailable(&server, None).await;
    let cache_dir = TempDir::new().unwrap();
    let app = build_app(&server, &cache_dir, 10);

    let (status, body) = send(&app, book_scene("10.0.0.5", FRAGMENT)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("503"));
    // one attempt plus two retries
    assert_eq!(image_calls(&server).await.len(), 3);

    let (_, count) = send(&app, get(BOOK_COUNT)).await;
    assert_eq!(count, json!(0));
}

#[tokio::test]
async fn test_reading_club_generations_are_scoped_to_the_club() {
    let server = MockServer::start().await;
    mount_chat_outage(&server).await;
    mount_image_success(&server, "https://images.example.com/forest.png").await;
    let cache_dir = TempDir::new().unwrap();
    let app = build_app(&server, &cache_dir, 10);

    let request = post_json(
        "/api/reading-clubs/club-1/scene-image",
        "10.0.0.2",
        json!({"text": FRAGMENT, "size": "1024x512", "style": "watercolor"}),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book_id"], "book-1");
    assert_eq!(body["reading_club_id"], "club-1");
    assert_eq!(body["style"], "watercolor");

    let (_, count) = send(&app, get("/api/reading-clubs/club-1/scene-generations/count")).await;
    assert_eq!(count, json!(1));
}

#[tokio::test]
async fn test_error_statuses() {
    let server = MockServer::start().await;
    mount_chat_outage(&server).await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("content policy"))
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().unwrap();
    let app = build_app(&server, &cache_dir, 100);

    let long_enough = "a fragment long enough here";
    let cases = [
        (BOOK_SCENE, json!({"text": "   "}).to_string(), StatusCode::BAD_REQUEST),
        (BOOK_SCENE, json!({}).to_string(), StatusCode::BAD_REQUEST),
        (BOOK_SCENE, json!({"text": "too short"}).to_string(), StatusCode::BAD_REQUEST),
        (
            BOOK_SCENE,
            json!({"text": long_enough, "seed": "abc"}).to_string(),
            StatusCode::BAD_REQUEST,
        ),
        (
            BOOK_SCENE,
            json!({"text": long_enough, "return_base64": "yes"}).to_string(),
            StatusCode::BAD_REQUEST,
        ),
        (BOOK_SCENE, "{not json".to_string(), StatusCode::BAD_REQUEST),
        (
            "/api/books/missing/scene-image",
            json!({"text": FRAGMENT}).to_string(),
            StatusCode::NOT_FOUND,
        ),
        (
            "/api/reading-clubs/missing/scene-image",
            json!({"text": FRAGMENT}).to_string(),
            StatusCode::NOT_FOUND,
        ),
        (
            BOOK_SCENE,
            json!({"text": FRAGMENT, "size": "1024x1024"}).to_string(),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (
            BOOK_SCENE,
            json!({"text": FRAGMENT}).to_string(),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    ];
    for (uri, body, expected) in cases {
        let (status, payload) = send(&app, post_raw(uri, "10.0.0.3", body.clone())).await;
        assert_eq!(status, expected, "{uri} {body}");
        assert!(payload["error"].is_string(), "{uri} {body}");
    }

    // a non-retryable provider failure is attempted once and nothing is persisted
    assert_eq!(image_calls(&server).await.len(), 1);
    let (_, count) = send(&app, get(BOOK_COUNT)).await;
    assert_eq!(count, json!(0));
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let server = MockServer::start().await;
    mount_chat_outage(&server).await;
    mount_image_success(&server, "https://images.example.com/forest.png").await;
    let cache_dir = TempDir::new().unwrap();
    let app = build_app(&server, &cache_dir, 2);
    let body = json!({"text": FRAGMENT});

    for _ in 0..2 {
        let request = post_json(BOOK_SCENE, "203.0.113.9, 10.0.0.1", body.clone());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = post_json(BOOK_SCENE, "203.0.113.9", body.clone());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let request = post_json(BOOK_SCENE, "198.51.100.4", body);
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // listings are not rate limited
    let response = app.oneshot(get("/api/books/book-1/scene-generations")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
