//! Model backend abstraction.
//!
//! The [`ModelBackend`] trait decouples persona invocation from the actual
//! text-generation service (currently the Gemini `generateContent` endpoint).
//! Tests use scripted backends that return canned replies without touching
//! the network.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::credentials::ApiKey;

/// Parameters for a single completion.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

/// Abstraction over text-generation backends.
pub trait ModelBackend {
    /// Return the generated text for `request`.
    ///
    /// Rate-limit failures must be reported as [`QuotaExceededError`] so the
    /// caller can class them separately from other failures.
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String>;
}

impl<T: ModelBackend + ?Sized> ModelBackend for Box<T> {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        (**self).generate(request)
    }
}

/// The service rejected a call because the quota or rate limit was exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExceededError {
    pub detail: String,
}

impl fmt::Display for QuotaExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quota exceeded: {}", self.detail)
    }
}

impl std::error::Error for QuotaExceededError {}

/// Backend calling the Gemini REST API with a blocking HTTP client.
///
/// Must be constructed and used outside of an async runtime thread.
pub struct GeminiBackend {
    api_base: String,
    api_key: ApiKey,
    http: Client,
}

impl GeminiBackend {
    /// Build a backend. `timeout` bounds each call; `None` waits indefinitely.
    pub fn new(api_base: &str, api_key: ApiKey, timeout: Option<Duration>) -> Result<Self> {
        // The blocking client defaults to a 30s total timeout; replace it explicitly.
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }
}

impl ModelBackend for GeminiBackend {
    #[instrument(skip_all, fields(model = request.model, prompt_bytes = request.prompt.len()))]
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: request.prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        let started = Instant::now();
        let response = self
            .http
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .context("send generateContent request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let parsed: GenerateContentResponse =
            response.json().context("parse generateContent response")?;
        let text = parsed.text().ok_or_else(|| {
            anyhow!(
                "empty response (finish reason: {})",
                parsed.finish_reason().unwrap_or("unknown")
            )
        })?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_bytes = text.len(),
            "generateContent completed"
        );
        Ok(text)
    }
}

/// Map a non-success HTTP response to an error, classing rate limits apart.
fn classify_failure(status: StatusCode, body: &str) -> anyhow::Error {
    let api_error = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let detail = api_error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.trim().to_string());
    let exhausted = api_error
        .as_ref()
        .and_then(|e| e.status.as_deref())
        .is_some_and(|s| s == "RESOURCE_EXHAUSTED");

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        warn!(status = status.as_u16(), "model quota exhausted");
        return anyhow!(QuotaExceededError { detail });
    }
    warn!(status = status.as_u16(), "model request failed");
    anyhow!("model API error {status}: {detail}")
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.is_empty()).then_some(text)
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    const OK_BODY: &str = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"pronto"}]},"finishReason":"STOP"}]}"#;

    /// Serve one request, replying with `OK_BODY` after `delay`.
    fn slow_server(delay: Duration) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}/v1beta", listener.local_addr().expect("addr"));
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            read_request(&mut stream);
            thread::sleep(delay);
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                OK_BODY.len(),
                OK_BODY
            );
            let _ = stream.write_all(response.as_bytes());
        });
        (base, handle)
    }

    fn read_request(stream: &mut std::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(n) = stream.read(&mut chunk) else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    fn generate_with(backend: &GeminiBackend) -> Result<String> {
        backend.generate(&GenerateRequest {
            model: "gemini-2.5-flash",
            prompt: "oi",
            temperature: 0.0,
        })
    }

    #[test]
    fn slow_reply_completes_without_timeout() {
        let (base, server) = slow_server(Duration::from_secs(2));
        let backend = GeminiBackend::new(&base, ApiKey::from_value(Some("k".to_string())), None)
            .expect("backend");
        assert_eq!(generate_with(&backend).expect("generate"), "pronto");
        server.join().expect("server");
    }

    #[test]
    #[ignore = "slow: waits past the blocking client's 30s default"]
    fn reply_slower_than_client_default_still_completes() {
        let (base, server) = slow_server(Duration::from_secs(31));
        let backend = GeminiBackend::new(&base, ApiKey::from_value(Some("k".to_string())), None)
            .expect("backend");
        assert_eq!(generate_with(&backend).expect("generate"), "pronto");
        server.join().expect("server");
    }

    #[test]
    fn configured_timeout_is_applied() {
        let (base, server) = slow_server(Duration::from_secs(3));
        let backend = GeminiBackend::new(
            &base,
            ApiKey::from_value(Some("k".to_string())),
            Some(Duration::from_millis(500)),
        )
        .expect("backend");
        let err = generate_with(&backend).unwrap_err();
        assert!(format!("{err:#}").contains("timed out"), "{err:#}");
        server.join().expect("server");
    }

    #[test]
    fn too_many_requests_is_quota_error() {
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down");
        let quota = err.downcast_ref::<QuotaExceededError>().expect("quota");
        assert_eq!(quota.detail, "slow down");
    }

    #[test]
    fn resource_exhausted_body_is_quota_error() {
        let body = r#"{"error":{"code":403,"message":"Quota exceeded for metric","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(StatusCode::FORBIDDEN, body);
        assert!(err.downcast_ref::<QuotaExceededError>().is_some());
        assert!(err.to_string().contains("Quota exceeded for metric"));
    }

    #[test]
    fn other_failures_are_generic() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, body);
        assert!(err.downcast_ref::<QuotaExceededError>().is_none());
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"a"},{"text":"b"}]},"finishReason":"STOP"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.text().as_deref(), Some("ab"));
    }

    #[test]
    fn blocked_response_has_no_text() {
        let raw = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.text(), None);
        assert_eq!(parsed.finish_reason(), Some("SAFETY"));
    }

    #[test]
    fn request_body_pins_temperature_field_name() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "oi".to_string(),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["generationConfig"]["temperature"], 0.0);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "oi");
    }
}
