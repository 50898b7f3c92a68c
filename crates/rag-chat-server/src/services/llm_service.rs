use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::pin::Pin;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::utils::error::ChatError;

/// Lazy sequence of text deltas from an incremental completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Completions capability consumed by the chat service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// One-shot completion; returns the first choice's text or `""` if the
    /// response carries none.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model_kwargs: &Map<String, Value>,
    ) -> Result<String, ChatError>;

    /// Incremental completion. The request is issued when this future is
    /// awaited; fragments arrive as the backend produces them.
    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        model_kwargs: &Map<String, Value>,
    ) -> Result<FragmentStream, ChatError>;
}

// Local response structs, all optional so malformed payloads degrade to "".
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
struct ChoiceChunk {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of parsing one line of the event stream.
#[derive(Debug, PartialEq, Eq)]
enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

/// Permissive parser: anything that is not a well-formed chunk with a
/// non-empty delta is skipped rather than failing the stream.
fn parse_stream_line(raw: &str) -> StreamLine {
    let mut line = raw.trim();
    if let Some(rest) = line.strip_prefix("data:") {
        line = rest.trim();
    }

    if line.is_empty() {
        return StreamLine::Skip;
    }
    if line == "[DONE]" {
        return StreamLine::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(line) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|content| !content.is_empty())
            .map(StreamLine::Delta)
            .unwrap_or(StreamLine::Skip),
        Err(_) => {
            debug!("Skipping non-JSON stream line: {}", line);
            StreamLine::Skip
        }
    }
}

#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self, ChatError> {
        // Per-read deadline: a streamed reply may run longer than the
        // timeout overall as long as chunks keep arriving.
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .build()
            .map_err(|e| ChatError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn build_payload(
        &self,
        messages: &[ChatMessage],
        model_kwargs: &Map<String, Value>,
        stream: bool,
    ) -> Value {
        let mut payload = Map::new();
        payload.insert("model".to_string(), Value::String(self.config.model.clone()));
        payload.insert(
            "messages".to_string(),
            serde_json::to_value(messages).unwrap_or(Value::Array(Vec::new())),
        );
        payload.insert("stream".to_string(), Value::Bool(stream));
        for (key, value) in model_kwargs {
            payload.insert(key.clone(), value.clone());
        }
        Value::Object(payload)
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| ChatError::unavailable(format!("Failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::unavailable(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for LlmService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model_kwargs: &Map<String, Value>,
    ) -> Result<String, ChatError> {
        debug!("Requesting non-streaming completion for {} message(s)", messages.len());

        let payload = self.build_payload(messages, model_kwargs, false);
        let response = self.post(&payload).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ChatError::unavailable(format!("Failed to read LLM response: {}", e)))?;

        let content = serde_json::from_slice::<ChatCompletionResponse>(&body)
            .ok()
            .and_then(|r| r.choices.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(content)
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        model_kwargs: &Map<String, Value>,
    ) -> Result<FragmentStream, ChatError> {
        info!(
            "Streaming chat completion to {} using model {}",
            self.config.endpoint, self.config.model
        );

        let payload = self.build_payload(messages, model_kwargs, true);
        let response = self.post(&payload).await?;
        let mut bytes = response.bytes_stream();

        // Lines (and UTF-8 sequences) may straddle network chunks, so
        // buffer raw bytes until a newline.
        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut done = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ChatError::unavailable(format!("Stream error: {}", e)));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_stream_line(&String::from_utf8_lossy(&line)) {
                        StreamLine::Delta(text) => {
                            yield Ok(text);
                        }
                        StreamLine::Done => {
                            done = true;
                            break;
                        }
                        StreamLine::Skip => {}
                    }
                }

                if done {
                    break;
                }
            }

            // Trailing line without a newline before close
            if !done {
                if let StreamLine::Delta(text) = parse_stream_line(&String::from_utf8_lossy(&buffer)) {
                    yield Ok(text);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_service(server: &MockServer) -> LlmService {
        LlmService::new(LlmConfig {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            model: "test-model".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    /// Serves one chunked SSE response, writing each delta `gap` apart.
    async fn trickling_server(deltas: &'static [&'static str], gap: std::time::Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();

            let mut events: Vec<String> = deltas
                .iter()
                .map(|d| format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n", d))
                .collect();
            events.push("data: [DONE]\n\n".to_string());

            for event in events {
                tokio::time::sleep(gap).await;
                let chunk = format!("{:x}\r\n{}\r\n", event.len(), event);
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;

            // Hold the connection until the client hangs up.
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });

        format!("http://{}/v1/chat/completions", addr)
    }

    #[test]
    fn parse_line_variants() {
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            StreamLine::Delta("Hi".to_string())
        );
        assert_eq!(parse_stream_line("data: [DONE]"), StreamLine::Done);
        assert_eq!(parse_stream_line("data: not json"), StreamLine::Skip);
        assert_eq!(parse_stream_line(r#"data: {"choices":[]}"#), StreamLine::Skip);
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            StreamLine::Skip
        );
        assert_eq!(parse_stream_line(": keep-alive"), StreamLine::Skip);
        assert_eq!(parse_stream_line(""), StreamLine::Skip);
    }

    #[tokio::test]
    async fn stream_yields_deltas_and_skips_noise() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: garbage\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true, "model": "test-model"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let service = test_service(&server);
        let stream = service
            .stream_complete(&[ChatMessage::user("hello")], &Map::new())
            .await
            .unwrap();

        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn stream_ends_on_close_without_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "data: {\"choices\":[{\"delta\":{\"content\":\"only\"}}]}",
            ))
            .mount(&server)
            .await;

        let service = test_service(&server);
        let fragments: Vec<String> = service
            .stream_complete(&[ChatMessage::user("hello")], &Map::new())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["only".to_string()]);
    }

    #[tokio::test]
    async fn slow_stream_outlasting_timeout_is_not_cut_off() {
        let endpoint =
            trickling_server(&["a", "b", "c"], std::time::Duration::from_millis(700)).await;
        let service = LlmService::new(LlmConfig {
            endpoint,
            model: "test-model".to_string(),
            timeout_seconds: 1,
        })
        .unwrap();

        let items: Vec<Result<String, ChatError>> = service
            .stream_complete(&[ChatMessage::user("hello")], &Map::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            items,
            vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())]
        );
    }

    #[tokio::test]
    async fn complete_returns_first_choice_and_merges_kwargs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": false, "temperature": 0.2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "first"}},
                    {"message": {"role": "assistant", "content": "second"}}
                ]
            })))
            .mount(&server)
            .await;

        let mut kwargs = Map::new();
        kwargs.insert("temperature".to_string(), serde_json::json!(0.2));

        let service = test_service(&server);
        let text = service
            .complete(&[ChatMessage::user("hello")], &kwargs)
            .await
            .unwrap();
        assert_eq!(text, "first");
    }

    #[tokio::test]
    async fn complete_malformed_response_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"unexpected": true})))
            .mount(&server)
            .await;

        let service = test_service(&server);
        let text = service.complete(&[ChatMessage::user("hello")], &Map::new()).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let service = test_service(&server);
        let err = service
            .complete(&[ChatMessage::user("hello")], &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unavailable(_)));

        let err = service
            .stream_complete(&[ChatMessage::user("hello")], &Map::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::Unavailable(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_unavailable() {
        let service = LlmService::new(LlmConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            model: "m".to_string(),
            timeout_seconds: 1,
        })
        .unwrap();

        let err = service
            .complete(&[ChatMessage::user("hello")], &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unavailable(_)));
    }
}
