use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, CLIENT_TTFB};
use crate::stream::ByteStream;
use crate::types::{ChatCompletionRequest, Model};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens completion streams against a remote model.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Send `request` to `model` and return the response body once the headers arrived.
    ///
    /// A non-success status is an error; the body is only returned for successful responses.
    async fn open_stream(&self, model: &Model, request: &ChatCompletionRequest)
    -> Result<ByteStream>;
}

/// Client for OpenAI-compatible chat-completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    client: ReqwestClient,
    connect_timeout: Duration,
}

impl OpenAiCompatible {
    /// Create a new client with the default connect timeout.
    pub fn new() -> Result<Self> {
        Self::with_options(None)
    }

    /// Create a new client with custom settings.
    ///
    /// Only connecting is bounded; a streaming response may legitimately run for minutes and is
    /// bounded by the orchestrator's per-stream deadline instead.
    pub fn with_options(connect_timeout: Option<Duration>) -> Result<Self> {
        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::transport(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            client,
            connect_timeout,
        })
    }

    /// Headers for a streaming request authenticated with `api_key`.
    fn headers(api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::configuration("API key is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());
        match response.text().await {
            Ok(body) => error_from_body(status_code, &body, retry_after),
            Err(e) => Error::transport(
                format!("Failed to read error response: {}", e),
                Some(Box::new(e)),
            ),
        }
    }
}

/// Map an error response body of the `{"error": {"message", "type"}}` shape to an [`Error`].
///
/// Bodies in any other shape are reported verbatim.
fn error_from_body(status_code: u16, body: &str, retry_after: Option<u64>) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error);
    let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| body.trim().to_string());
    Error::status(status_code, error_type, message, retry_after)
}

#[async_trait]
impl CompletionTransport for OpenAiCompatible {
    async fn open_stream(
        &self,
        model: &Model,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream> {
        let url = model.completions_url()?;
        let headers = Self::headers(&model.api_key)?;
        CLIENT_REQUESTS.click();
        tracing::debug!(url = %url, messages = request.messages.len(), "opening completion stream");

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.connect_timeout.as_secs_f64()),
                    )
                } else {
                    Error::transport(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;
        CLIENT_TTFB.add(started.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                Error::transport(format!("Stream read failed: {}", e), Some(Box::new(e)))
            })
        });
        Ok(Box::pin(body))
    }
}
