use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::traits::CompletionClient;
use super::types::{CompletionOptions, ProjectContext, StreamCallback};
use crate::app::AzureConfig;
use crate::session::Turn;
use crate::utils::{AzccError, Result};

const TRANSPORT_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

/// Chat completions against an Azure OpenAI deployment
pub struct AzureOpenAIClient {
    client: Client,
    endpoint: String,
    deployment: String,
    api_version: String,
    api_key: String,
    timeout: Duration,
}

impl AzureOpenAIClient {
    /// Create a client; fails with an auth error when credentials are missing
    pub fn new(settings: &AzureConfig, timeout: Duration) -> Result<Self> {
        let api_key = non_blank(settings.api_key.as_deref()).ok_or_else(|| {
            AzccError::Auth("AZURE_OPENAI_API_KEY is not set".to_string())
        })?;
        let endpoint = non_blank(settings.endpoint.as_deref()).ok_or_else(|| {
            AzccError::Auth("AZURE_OPENAI_ENDPOINT is not set".to_string())
        })?;

        let client = Client::builder()
            .timeout(transport_timeout(timeout))
            .build()
            .map_err(|e| AzccError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            deployment: settings.deployment.clone(),
            api_version: settings.api_version.clone(),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    async fn send(&self, body: &Value) -> Result<Response> {
        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.status_error(response).await)
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> AzccError {
        if e.is_timeout() {
            AzccError::Timeout(self.timeout)
        } else {
            AzccError::Backend(format!(
                "Failed to reach Azure OpenAI at {}: {}",
                self.endpoint, e
            ))
        }
    }

    async fn status_error(&self, response: Response) -> AzccError {
        let status = response.status();
        let retry_after = retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        let message = format!("{} {}", status.as_u16(), error_message(&body));

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AzccError::Auth(message),
            StatusCode::TOO_MANY_REQUESTS => AzccError::RateLimit {
                message,
                retry_after,
            },
            StatusCode::NOT_FOUND => AzccError::Config(format!(
                "deployment '{}' not found at {} ({})",
                self.deployment, self.endpoint, message
            )),
            s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
                AzccError::Backend(message)
            }
            _ => AzccError::InvalidRequest(message),
        }
    }

    async fn complete_streaming(&self, body: &Value, callback: StreamCallback) -> Result<String> {
        let response = self.send(body).await?;
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut full_response = String::new();
        let mut finished = false;

        'chunks: while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) if full_response.is_empty() => return Err(self.transport_error(e)),
                Err(e) => return Err(AzccError::StreamInterrupted(e.to_string())),
            };

            for event in decoder.push(&chunk) {
                let data = match event {
                    SseEvent::Done => {
                        finished = true;
                        break 'chunks;
                    }
                    SseEvent::Data(data) => data,
                };
                let parsed: StreamChunk = match serde_json::from_str(&data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!("Ignoring unparseable stream event: {}", e);
                        continue;
                    }
                };
                if let Some(delta) = parsed
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                    .filter(|d| !d.is_empty())
                {
                    full_response.push_str(delta);
                    callback(delta);
                }
            }
        }

        if !finished && !full_response.is_empty() {
            return Err(AzccError::StreamInterrupted(
                "stream closed before [DONE]".to_string(),
            ));
        }
        if full_response.is_empty() {
            return Err(AzccError::Backend(
                "stream ended without any content".to_string(),
            ));
        }
        Ok(full_response)
    }

    async fn complete_blocking(&self, body: &Value) -> Result<String> {
        let response = self.send(body).await?;
        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AzccError::Backend(format!("Malformed completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AzccError::Backend("completion returned no content".to_string()))
    }
}

#[async_trait]
impl CompletionClient for AzureOpenAIClient {
    async fn complete(
        &self,
        turns: &[Turn],
        context: Option<&ProjectContext>,
        options: &CompletionOptions,
        stream: Option<StreamCallback>,
    ) -> Result<String> {
        let body = request_body(turns, context, options, stream.is_some());
        debug!(
            deployment = %self.deployment,
            turns = turns.len(),
            stream = stream.is_some(),
            "Sending chat completion"
        );

        match stream {
            Some(callback) => self.complete_streaming(&body, callback).await,
            None => self.complete_blocking(&body).await,
        }
    }

    fn name(&self) -> &str {
        &self.deployment
    }
}

/// The request deadline is enforced by the caller; the HTTP client's own
/// limit sits past it so the deadline always fires first.
fn transport_timeout(deadline: Duration) -> Duration {
    deadline + TRANSPORT_TIMEOUT_MARGIN
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// OpenAI chat message list: system prompt (with context), then the turns
pub(crate) fn build_messages(
    turns: &[Turn],
    context: Option<&ProjectContext>,
    options: &CompletionOptions,
) -> Vec<Value> {
    let mut system = options.system_prompt.clone();
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        system.push_str("\n\nProject context:\n");
        system.push_str(&context.to_prompt_context());
    }

    let mut messages = vec![json!({ "role": "system", "content": system })];
    messages.extend(turns.iter().map(|turn| {
        json!({
            "role": turn.role().as_str(),
            "content": turn.text(),
        })
    }));
    messages
}

fn request_body(
    turns: &[Turn],
    context: Option<&ProjectContext>,
    options: &CompletionOptions,
    stream: bool,
) -> Value {
    let mut body = json!({
        "messages": build_messages(turns, context, options),
        "temperature": options.temperature,
        "stream": stream,
    });
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// Prefer millisecond-precision `retry-after-ms`, else `retry-after` seconds
fn retry_after(response: &Response) -> Option<Duration> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    };
    header("retry-after-ms")
        .map(Duration::from_millis)
        .or_else(|| header(RETRY_AFTER.as_str()).map(Duration::from_secs))
}

/// Pull `error.message` out of an Azure error body, else the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

enum SseEvent {
    Data(String),
    Done,
}

/// Splits a server-sent event byte stream into complete `data:` payloads,
/// buffering partial lines across network chunks
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &Bytes) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else if !data.is_empty() {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }
        events
    }
}

// Response structures (OpenAI chat completions format)

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHAT_PATH: &str = "/openai/deployments/gpt-4/chat/completions";

    fn settings(endpoint: &str) -> AzureConfig {
        AzureConfig {
            api_key: Some("test-key".to_string()),
            endpoint: Some(endpoint.to_string()),
            ..AzureConfig::default()
        }
    }

    fn client(server: &MockServer) -> AzureOpenAIClient {
        AzureOpenAIClient::new(&settings(&server.uri()), Duration::from_secs(5)).unwrap()
    }

    async fn ask(client: &AzureOpenAIClient, stream: Option<StreamCallback>) -> Result<String> {
        client
            .complete(
                &[Turn::user("What is Rust?")],
                None,
                &CompletionOptions::default(),
                stream,
            )
            .await
    }

    #[test]
    fn test_missing_credentials_is_auth_error() {
        let mut config = settings("https://example.openai.azure.com");
        config.api_key = None;
        assert!(matches!(
            AzureOpenAIClient::new(&config, Duration::from_secs(1)),
            Err(AzccError::Auth(_))
        ));

        let mut config = settings("  ");
        config.api_key = Some("key".to_string());
        assert!(matches!(
            AzureOpenAIClient::new(&config, Duration::from_secs(1)),
            Err(AzccError::Auth(_))
        ));
    }

    #[test]
    fn test_messages_put_context_in_system_prompt() {
        let mut context = ProjectContext::new(".".to_string());
        context.add_file("main.rs".to_string(), "fn main() {}".to_string(), false);
        let turns = vec![Turn::user("q1"), Turn::assistant("a1"), Turn::user("q2")];

        let messages = build_messages(&turns, Some(&context), &CompletionOptions::default());

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        let system = messages[0]["content"].as_str().unwrap();
        assert!(system.contains("Project context:\nFile: main.rs"));
        assert_eq!(messages[2], json!({ "role": "assistant", "content": "a1" }));
        assert_eq!(messages[3], json!({ "role": "user", "content": "q2" }));
    }

    #[test]
    fn test_sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&Bytes::from_static(b"data: {\"a\"")).is_empty());
        let events = decoder.push(&Bytes::from_static(b":1}\r\n\r\ndata: [DONE]\n\n"));

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SseEvent::Data(d) if d == "{\"a\":1}"));
        assert!(matches!(events[1], SseEvent::Done));
    }

    #[tokio::test]
    async fn test_blocking_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .and(query_param("api-version", "2023-05-15"))
            .and(header("api-key", "test-key"))
            .and(body_partial_json(json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "A systems language." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(ask(&client(&server), None).await.unwrap(), "A systems language.");
    }

    #[tokio::test]
    async fn test_streaming_completion_forwards_chunks() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[],\"prompt_filter_results\":[]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        let callback: StreamCallback = Arc::new(move |chunk: &str| {
            sink.lock().unwrap().push(chunk.to_string());
        });

        let text = ask(&client(&server), Some(callback)).await.unwrap();
        assert_eq!(text, "Hello world");
        assert_eq!(*seen.lock().unwrap(), vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn test_stream_closed_without_done_is_interrupted() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Half an\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" answ\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let callback: StreamCallback = Arc::new(|_: &str| {});
        let err = ask(&client(&server), Some(callback)).await.unwrap_err();
        assert!(matches!(err, AzccError::StreamInterrupted(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_empty_stream_without_done_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
            .mount(&server)
            .await;

        let callback: StreamCallback = Arc::new(|_: &str| {});
        let err = ask(&client(&server), Some(callback)).await.unwrap_err();
        assert!(matches!(err, AzccError::Backend(_)), "{err:?}");
    }

    #[test]
    fn test_transport_timeout_outlasts_deadline() {
        let deadline = Duration::from_secs(60);
        assert!(transport_timeout(deadline) > deadline);
    }

    #[tokio::test]
    async fn test_slow_backend_reports_deadline_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: [DONE]\n\n", "text/event-stream")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let deadline = Duration::from_millis(200);
        let azure = AzureOpenAIClient::new(&settings(&server.uri()), deadline).unwrap();
        let client = crate::models::RetryingClient::new(
            azure,
            crate::models::RetryPolicy::default(),
            deadline,
        );
        let err = client
            .complete(
                &[Turn::user("slow?")],
                None,
                &CompletionOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AzccError::Timeout(d) if d == deadline), "{err:?}");
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "code": "401", "message": "Access denied due to invalid subscription key." }
            })))
            .mount(&server)
            .await;

        let err = ask(&client(&server), None).await.unwrap_err();
        match err {
            AzccError::Auth(message) => assert!(message.contains("invalid subscription key")),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_throttling_maps_to_rate_limit_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let err = ask(&client(&server), None).await.unwrap_err();
        assert!(matches!(
            err,
            AzccError::RateLimit { retry_after: Some(d), .. } if d == Duration::from_secs(2)
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = ask(&client(&server), None).await.unwrap_err();
        assert!(matches!(err, AzccError::Backend(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "content filtered" }
            })))
            .mount(&server)
            .await;

        let err = ask(&client(&server), None).await.unwrap_err();
        assert!(matches!(err, AzccError::InvalidRequest(ref m) if m.contains("content filtered")));
        assert!(!err.is_retryable());
    }
}
