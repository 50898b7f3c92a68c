use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::config::EmbeddingConfig;
use crate::utils::error::ChatError;

/// Query encoder used by the vector store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError>;
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    endpoint: String,
    model_kwargs: Map<String, Value>,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ChatError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            model_kwargs: config.model_kwargs,
        })
    }
}

fn floats(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Accepts `{"data": [{"embedding": [...]}]}` (OpenAI),
/// `{"embedding": [...]}` (llama.cpp), `[{"embedding": [...]}]` and `[...]`.
fn parse_embedding(json_value: &Value) -> Result<Vec<f32>, ChatError> {
    let embedding = match json_value {
        Value::Object(obj) => {
            if let Some(Value::Array(values)) = obj.get("embedding") {
                floats(values)
            } else if let Some(Value::Array(data)) = obj.get("data") {
                match data.first().and_then(|d| d.get("embedding")) {
                    Some(Value::Array(values)) => floats(values),
                    _ => {
                        return Err(ChatError::unavailable(format!(
                            "Unrecognized embedding response format: {}",
                            json_value
                        )))
                    }
                }
            } else {
                return Err(ChatError::unavailable(format!(
                    "Unrecognized embedding response format: {}",
                    json_value
                )));
            }
        }
        Value::Array(arr) => match arr.first() {
            None => {
                return Err(ChatError::unavailable(
                    "Empty array returned from embedding server",
                ))
            }
            Some(first) => match first.get("embedding") {
                Some(Value::Array(values)) => floats(values),
                _ => floats(arr),
            },
        },
        _ => {
            return Err(ChatError::unavailable(format!(
                "Unrecognized embedding response format: {}",
                json_value
            )))
        }
    };

    if embedding.is_empty() {
        return Err(ChatError::unavailable("Generated embedding is empty"));
    }

    Ok(embedding)
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        debug!("Generating embedding for {} chars", text.len());

        let mut payload = Map::new();
        payload.insert(
            "input".to_string(),
            Value::Array(vec![Value::String(text.to_string())]),
        );
        for (key, value) in &self.model_kwargs {
            payload.insert(key.clone(), value.clone());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ChatError::unavailable(format!("Failed to connect to embedding server: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::unavailable(format!(
                "Embedding API error ({}): {}",
                status, body
            )));
        }

        let json_value: Value = response.json().await.map_err(|e| {
            ChatError::unavailable(format!("Failed to parse embedding response as JSON: {}", e))
        })?;

        parse_embedding(&json_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_known_shapes() {
        assert_eq!(
            parse_embedding(&json!({"data": [{"embedding": [0.1, 0.2]}]})).unwrap(),
            vec![0.1, 0.2]
        );
        assert_eq!(
            parse_embedding(&json!({"embedding": [1.0, 2.0, 3.0]})).unwrap(),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(
            parse_embedding(&json!([{"embedding": [0.5]}])).unwrap(),
            vec![0.5]
        );
        assert_eq!(parse_embedding(&json!([0.25, 0.75])).unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn rejects_unknown_or_empty() {
        assert!(matches!(
            parse_embedding(&json!({"vectors": []})),
            Err(ChatError::Unavailable(_))
        ));
        assert!(parse_embedding(&json!([])).is_err());
        assert!(parse_embedding(&json!({"embedding": []})).is_err());
        assert!(parse_embedding(&json!("nope")).is_err());
    }

    #[tokio::test]
    async fn embed_posts_input_with_kwargs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"input": ["hello"], "model": "bge"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.0, 1.0]}]
            })))
            .mount(&server)
            .await;

        let mut model_kwargs = Map::new();
        model_kwargs.insert("model".to_string(), json!("bge"));
        let service = EmbeddingService::new(EmbeddingConfig {
            endpoint: server.uri(),
            timeout_seconds: 5,
            model_kwargs,
        })
        .unwrap();

        assert_eq!(service.embed("hello").await.unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn embed_error_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let service = EmbeddingService::new(EmbeddingConfig {
            endpoint: server.uri(),
            ..EmbeddingConfig::default()
        })
        .unwrap();

        assert!(matches!(
            service.embed("hello").await,
            Err(ChatError::Unavailable(_))
        ));
    }
}
