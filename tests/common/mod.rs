// Shared fixtures for the integration tests: a fake OpenAI-compatible service
// whose embeddings are word-presence vectors and whose chat model repeats the
// context it was given.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use rag_chat::config::Config;
use rag_chat::synthesis::prompt_context;
use serde_json::{Value, json};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, Request, Respond, ResponseTemplate,
    matchers::{method, path},
};

pub const DIM: usize = 64;

pub const FACT: &str = "The lighthouse keeper's name was Agnes Whitfield.";
pub const QUESTION: &str = "What was the lighthouse keeper's name?";

/// Hash every word of the text into a fixed-width presence vector
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % DIM as u64) as usize] = 1.0;
    }
    vector
}

struct EmbeddingResponder;

impl Respond for EmbeddingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = request.body_json::<Value>() else {
            return ResponseTemplate::new(400);
        };
        let data: Vec<Value> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .enumerate()
                    .map(|(index, input)| {
                        json!({
                            "object": "embedding",
                            "index": index,
                            "embedding": bag_of_words(input.as_str().unwrap_or_default())
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data}))
    }
}

struct EchoChatResponder;

impl Respond for EchoChatResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = request.body_json::<Value>() else {
            return ResponseTemplate::new(400);
        };
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        let answer = prompt_context(prompt).unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": answer}}]
        }))
    }
}

/// Start a fake OpenAI service answering both embeddings and chat completions
pub async fn start_openai() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EmbeddingResponder)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(EchoChatResponder)
        .mount(&server)
        .await;
    server
}

/// Config pointing at the fake service, storing vectors under `dir`, with pacing off
pub fn test_config(dir: &TempDir, openai: &MockServer) -> Config {
    let mut config = Config::default();
    config.base_dir = dir.path().to_path_buf();
    config.openai.base_url = openai.uri();
    config.openai.api_key = Some("sk-test".to_string());
    config.openai.embedding_dimension = DIM as u32;
    config.openai.retry_attempts = 1;
    config.rag.min_ingest_duration_ms = 0;
    config
}

pub fn write_file(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).expect("should write file");
    path
}

pub fn filler(sentences: usize) -> String {
    "Grain ships sailed along quiet northern coasts every season. ".repeat(sentences)
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}
