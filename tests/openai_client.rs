use scene_image_service::config::OpenAiConfig;
use scene_image_service::error::GatewayError;
use scene_image_service::gateway::{ChatCompletion, ImageGenerationGateway, ImageGenerationRequest};
use scene_image_service::openai::OpenAiClient;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGES_PATH: &str = "/v1/images/generations";
const CHAT_PATH: &str = "/v1/chat/completions";

fn test_config(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig {
        api_key: Some("sk-test".to_string()),
        base_url: format!("{}/v1", server.uri()),
        timeout_secs: 5,
        image_timeout_secs: 5,
        max_retries: 3,
        chat_retry_base_delay_ms: 5,
        image_retry_base_delay_ms: 5,
        max_retry_delay_ms: 20,
        ..OpenAiConfig::default()
    }
}

fn image_request(size: &str, want_inline: bool) -> ImageGenerationRequest<'_> {
    ImageGenerationRequest {
        prompt: "360° equirectangular panorama of a misty forest",
        size,
        seed: Some(7),
        want_inline,
    }
}

fn url_payload() -> Value {
    json!({
        "created": 1,
        "data": [{
            "url": "https://images.example.com/scene.png",
            "revised_prompt": "a misty forest at dawn"
        }]
    })
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_image_generation_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(url_payload()))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    let result = client.generate(image_request("2048x1024", false)).await.unwrap();

    assert_eq!(result.url.as_deref(), Some("https://images.example.com/scene.png"));
    assert_eq!(result.revised_prompt.as_deref(), Some("a misty forest at dawn"));
    assert_eq!(result.cost_usd, Some(0.08));
    assert_eq!(request_bodies(&server).await.len(), 3);
}

#[tokio::test]
async fn test_image_generation_gives_up_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    let err = client.generate(image_request("2048x1024", false)).await.unwrap_err();

    assert!(matches!(err, GatewayError::Status { status: 429, .. }));
    // one attempt plus three retries
    assert_eq!(request_bodies(&server).await.len(), 4);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "prompt rejected"}
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    let err = client.generate(image_request("2048x1024", false)).await.unwrap_err();

    assert!(matches!(err, GatewayError::Status { status: 400, .. }));
    assert_eq!(request_bodies(&server).await.len(), 1);
}

#[tokio::test]
async fn test_large_size_requests_url_even_when_inline_wanted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .and(body_partial_json(json!({"response_format": "url", "size": "4096x2048"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(url_payload()))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    let result = client.generate(image_request("4096x2048", true)).await.unwrap();

    assert!(result.base64.is_none());
    assert!(result.url.is_some());
}

#[tokio::test]
async fn test_inline_mode_returns_base64_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-image-1",
            "n": 1,
            "response_format": "b64_json",
            "quality": "standard",
            "style": "vivid"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"b64_json": "aGVsbG8gd29ybGQ="}],
            "usage": {"input_tokens": 42}
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    let result = client.generate(image_request("1024x512", true)).await.unwrap();

    assert_eq!(result.base64.as_deref(), Some("aGVsbG8gd29ybGQ="));
    assert_eq!(result.url, None);
    assert_eq!(result.prompt_tokens, Some(42));

    let bodies = request_bodies(&server).await;
    assert!(bodies[0].get("seed").is_none());
}

#[tokio::test]
async fn test_empty_image_payload_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    let err = client.generate(image_request("2048x1024", false)).await.unwrap_err();
    assert!(matches!(err, GatewayError::EmptyResponse));
}

#[tokio::test]
async fn test_chat_completion_returns_trimmed_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 500})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "  360 panorama of a library  \n"}
            }]
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    let content = client.complete("system", "user").await.unwrap();
    assert_eq!(content, "360 panorama of a library");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies[0]["messages"][0]["role"], "system");
    assert_eq!(bodies[0]["messages"][1]["content"], "user");
}

#[tokio::test]
async fn test_chat_completion_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "crafted"}}]
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(test_config(&server)).unwrap();
    assert_eq!(client.complete("system", "user").await.unwrap(), "crafted");
    assert_eq!(request_bodies(&server).await.len(), 2);
}
