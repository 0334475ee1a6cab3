//! HTTP plumbing shared by the capability fetcher and invoker.
//!
//! One [`HttpClient`] is built per resolution from the [`ResolveOptions`]; it
//! applies the per-request timeout, records traces and maps transport
//! failures onto [`PaymailError`].

use std::error::Error as _;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::config::ResolveOptions;
use crate::trace::{TraceKind, Tracer};
use crate::{PaymailError, Result};

/// Maximum number of body bytes copied into error values and traces.
const MAX_BODY_EXCERPT: usize = 2048;

/// HTTP client bound to one resolution.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    tracer: Tracer,
    timeout_ms: u64,
    max_body_bytes: usize,
    insecure: bool,
}

impl HttpClient {
    /// Build a client from resolution options.
    pub fn new(options: &ResolveOptions, tracer: Tracer) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout())
            .user_agent(options.user_agent.clone());

        if options.skip_ssl_check {
            warn!("TLS certificate validation disabled for this resolution");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| PaymailError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            tracer,
            timeout_ms: options.timeout_ms(),
            max_body_bytes: options.max_body_bytes,
            insecure: options.skip_ssl_check,
        })
    }

    /// Returns true if certificate validation is disabled.
    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// GET `url` and return the body of a 2xx response.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let span = self.tracer.start(TraceKind::Http, url, "GET");
        let result = self.send(self.client.get(url), url).await;
        finish(span, &result);
        result.map(|(_, body)| body)
    }

    /// GET `url` and decode a 2xx JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url).await?;
        decode(url, &body)
    }

    /// POST `body` as JSON to `url` and decode a 2xx JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let payload = serde_json::to_string(body)?;
        let span = self
            .tracer
            .start(TraceKind::Http, url, format!("POST {}", payload));
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        let result = self.send(request, url).await;
        finish(span, &result);
        let (_, text) = result?;
        decode(url, &text)
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<(u16, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?;

        let status = response.status();
        let (text, complete) = self.read_body(response, url).await?;

        if !status.is_success() {
            return Err(PaymailError::CapabilityRequest {
                url: url.to_string(),
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }
        if !complete {
            return Err(PaymailError::invalid_data(
                "body",
                format!(
                    "response from {} exceeds {} bytes",
                    url, self.max_body_bytes
                ),
            ));
        }

        Ok((status.as_u16(), text))
    }

    /// Read at most `max_body_bytes` of the body. The flag is false when the
    /// body was longer and reading stopped early.
    async fn read_body(&self, mut response: reqwest::Response, url: &str) -> Result<(String, bool)> {
        let limit = self.max_body_bytes;
        if response.status().is_success()
            && response.content_length().is_some_and(|len| len > limit as u64)
        {
            return Ok((String::new(), false));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?
        {
            if body.len() + chunk.len() > limit {
                let room = limit - body.len();
                body.extend_from_slice(&chunk[..room]);
                return Ok((String::from_utf8_lossy(&body).into_owned(), false));
            }
            body.extend_from_slice(&chunk);
        }
        Ok((String::from_utf8_lossy(&body).into_owned(), true))
    }

    /// Map reqwest errors to PaymailError.
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> PaymailError {
        if e.is_timeout() {
            PaymailError::ConnectionTimeout {
                operation: format!("request to {}", url),
                timeout_ms: self.timeout_ms,
            }
        } else if e.is_decode() || e.is_body() {
            PaymailError::Serialization(format!("Failed to read response from {}: {}", url, e))
        } else {
            PaymailError::Unreachable {
                target: url.to_string(),
                reason: error_chain(&e),
            }
        }
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| PaymailError::Serialization(format!("Failed to parse response from {}: {}", url, e)))
}

fn finish(span: crate::trace::TraceSpan, result: &Result<(u16, String)>) {
    match result {
        Ok((status, body)) => span.finish(Some(*status), Some(excerpt(body)), None),
        Err(PaymailError::CapabilityRequest { status, body, .. }) => {
            span.finish(Some(*status), Some(body.clone()), None)
        }
        Err(err) => span.finish(None, None, Some(err.to_string())),
    }
}

/// Flatten an error and its sources, so TLS causes such as certificate
/// failures survive into the message.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn excerpt(body: &str) -> String {
    if body.len() <= MAX_BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
