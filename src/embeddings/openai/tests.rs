use super::*;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.openai.base_url = base_url.to_string();
    config.openai.api_key = Some("sk-test".to_string());
    config.openai.embedding_dimension = 3;
    config.openai.batch_size = 2;
    config
}

fn test_client(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new(&test_config(&server.uri()))
        .expect("client should build")
        .with_retry_policy(RetryPolicy::new(2).with_initial_backoff(Duration::from_millis(5)))
}

#[test]
fn client_configuration() {
    let config = test_config("http://localhost:9999");
    let client = OpenAiClient::new(&config).expect("client should build");

    assert_eq!(client.embedding_model(), "text-embedding-ada-002");
    assert_eq!(client.chat_model(), "gpt-4");
    assert_eq!(client.dimension(), 3);
    assert_eq!(client.batch_size, 2);
    assert_eq!(client.base_url.port(), Some(9999));
    assert_eq!(client.retry.attempts, 3);
}

#[test]
fn invalid_base_url_is_rejected() {
    let config = test_config("not a url");
    assert!(OpenAiClient::new(&config).is_err());
}

#[tokio::test]
async fn embeddings_are_batched_and_ordered() {
    let server = MockServer::start().await;

    // Responses arrive out of order; the client sorts them by index
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"input": ["one", "two"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                {"index": 0, "embedding": [1.0, 0.0, 0.0]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["three"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.0, 0.0, 1.0]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];

    let vectors = client
        .embed_texts(&texts)
        .await
        .expect("embedding should succeed");

    assert_eq!(
        vectors,
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0]
        ]
    );
}

#[tokio::test]
async fn wrong_dimension_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.5, 0.5]}]
        })))
        .mount(&server)
        .await;

    let err = test_client(&server)
        .embed_query("hello")
        .await
        .expect_err("two-dimensional vectors should be rejected");

    assert!(format!("{:#}", err).contains("dimension mismatch"));
}

#[tokio::test]
async fn completion_uses_chat_model_at_zero_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "temperature": 0.0,
            "messages": [{"role": "user", "content": "Say hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi there"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = test_client(&server)
        .generate("Say hi")
        .await
        .expect("completion should succeed");

    assert_eq!(answer, "Hi there");
}

#[tokio::test]
async fn missing_content_is_an_empty_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null}}]
        })))
        .mount(&server)
        .await;

    let answer = test_client(&server)
        .generate("anything")
        .await
        .expect("completion should succeed");

    assert!(answer.is_empty());
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_client(&server)
        .generate("anything")
        .await
        .expect_err("401 should fail");

    assert!(format!("{:#}", err).contains("401"));
}
