mod harness;

use harness::config::ConfigBuilder;
use harness::mock_llm::MockLlm;
use harness::server::TestServer;
use prism_config::{AnyOrArray, CorsConfig};

#[tokio::test]
async fn cors_allows_configured_origin() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_gemini_provider("gemini", &mock.gemini_url())
        .with_cors(CorsConfig {
            origins: AnyOrArray::List(vec!["http://example.com".to_owned()]),
            methods: AnyOrArray::Any,
            headers: AnyOrArray::Any,
            credentials: false,
            max_age: None,
        })
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .get(server.url("/health"))
        .header("Origin", "http://example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://example.com")
    );
}

#[tokio::test]
async fn cors_wildcard_allows_any_origin() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_gemini_provider("gemini", &mock.gemini_url())
        .with_cors(CorsConfig {
            origins: AnyOrArray::Any,
            methods: AnyOrArray::Any,
            headers: AnyOrArray::Any,
            credentials: true,
            max_age: Some(600),
        })
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .get(server.url("/health"))
        .header("Origin", "http://anywhere.example")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("access-control-allow-origin").is_some());
    assert!(resp.headers().get("access-control-allow-credentials").is_none());
}

#[tokio::test]
async fn request_id_is_generated_or_echoed() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_gemini_provider("gemini", &mock.gemini_url())
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();
    let generated = resp.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(generated.len(), 32);

    let resp = server
        .client()
        .get(server.url("/health"))
        .header("x-request-id", "client-trace-1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "client-trace-1");
}
