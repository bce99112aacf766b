//! HTTP adapter backed by `reqwest`.
//!
//! Each attempt runs on its own Tokio task. Aborting the returned handle wakes
//! the task, which drops the in-flight request and rejects the attempt with
//! `"request aborted"`.

use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, instrument, trace};
use url::Url;

use super::{Adapter, Responder, TransportFailure, TransportHandle};
use crate::request::{Method, RequestSpec, Response};

/// Reason reported when an attempt is aborted through its handle.
pub const ABORTED_MESSAGE: &str = "request aborted";

/// Adapter issuing real HTTP calls.
///
/// Created once and shared; the inner client pools connections across
/// attempts and requests.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: Client,
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAdapter {
    /// Creates an adapter with gzip decompression enabled.
    ///
    /// Timeouts are left to the execution engine.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Creates an adapter around an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &RequestSpec) -> Result<reqwest::RequestBuilder, TransportFailure> {
        let mut url = Url::parse(&request.url)
            .map_err(|e| TransportFailure::new(format!("invalid URL {}: {e}", request.url)))?;

        if request.method.sends_data_as_query()
            && let Some(Value::Object(params)) = &request.data
        {
            append_query(&mut url, params);
        }

        let mut builder = self.client.request(to_reqwest_method(request.method), url);
        for (name, value) in &request.header {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.method.sends_data_as_query()
            && let Some(data) = &request.data
        {
            builder = builder.json(data);
        }
        Ok(builder)
    }
}

impl Adapter for HttpAdapter {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(level = "debug", skip_all, fields(method = %request.method, url = %request.url))]
    fn send(&self, request: &RequestSpec, responder: Responder) -> Box<dyn TransportHandle> {
        let abort = Arc::new(Notify::new());
        let handle = HttpHandle {
            abort: Arc::clone(&abort),
        };

        let builder = match self.build(request) {
            Ok(builder) => builder,
            Err(failure) => {
                debug!(error = %failure, "rejecting request before send");
                responder.reject(failure);
                return Box::new(handle);
            }
        };

        tokio::spawn(async move {
            tokio::select! {
                () = abort.notified() => {
                    debug!("transport aborted");
                    responder.reject(ABORTED_MESSAGE);
                }
                result = execute(builder) => match result {
                    Ok(response) => responder.resolve(response),
                    Err(failure) => responder.reject(failure),
                },
            }
        });

        Box::new(handle)
    }
}

#[derive(Debug)]
struct HttpHandle {
    abort: Arc<Notify>,
}

impl TransportHandle for HttpHandle {
    fn abort(&self) {
        // Stores a permit when the worker is not yet waiting; harmless once settled.
        self.abort.notify_one();
    }
}

async fn execute(builder: reqwest::RequestBuilder) -> Result<Response, TransportFailure> {
    let response = builder
        .send()
        .await
        .map_err(|e| TransportFailure::new(e.to_string()))?;
    let status_code = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportFailure::new(e.to_string()))?;
    trace!(status_code, body_len = body.len(), "response received");
    Ok(Response::new(status_code, parse_body(&body)))
}

/// Parses a body as JSON, falling back to a JSON string for non-JSON bodies.
fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn append_query(url: &mut Url, params: &serde_json::Map<String, Value>) {
    let encoded: Vec<String> = params
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&value)
            )
        })
        .collect();
    if encoded.is_empty() {
        return;
    }

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{}", encoded.join("&")),
        _ => encoded.join("&"),
    };
    url.set_query(Some(&query));
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}
