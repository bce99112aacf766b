//! Request and response data model.
//!
//! [`RequestSpec`] is what an adapter receives, [`Response`] is what it hands
//! back on success. [`RequestOptions`] and [`ClientOptions`] are the
//! caller-facing inputs the [`Client`](crate::Client) layers into a spec.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ConfigOverrides;

/// HTTP verbs understood by the bundled adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    /// Returns the uppercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether request data travels in the query string rather than the body.
    #[must_use]
    pub fn sends_data_as_query(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown HTTP verb.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// The request an adapter is asked to perform.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestSpec {
    /// HTTP verb.
    pub method: Method,
    /// Target URL, rewritten once with the configured base URL before dispatch.
    pub url: String,
    /// Request headers.
    pub header: HashMap<String, String>,
    /// Body or query parameters, depending on the verb.
    pub data: Option<Value>,
    /// Transport-specific fields passed through untouched.
    pub extra: Map<String, Value>,
}

/// A completed transport call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Parsed payload.
    pub data: Value,
}

impl Response {
    /// Creates a response.
    pub fn new(status_code: u16, data: Value) -> Self {
        Self { status_code, data }
    }

    /// Whether the status code is in `[200, 300)`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Per-instance request defaults, layered under every call's options.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Verb used when a call does not name one.
    pub method: Option<Method>,
    /// Headers sent with every request.
    pub header: HashMap<String, String>,
    /// Transport-specific fields sent with every request.
    pub extra: Map<String, Value>,
    /// Instance configuration layer.
    pub ext: ConfigOverrides,
}

impl ClientOptions {
    /// Creates empty instance options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance configuration layer.
    #[must_use]
    pub fn ext(mut self, ext: ConfigOverrides) -> Self {
        self.ext = ext;
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(name.into(), value.into());
        self
    }
}

/// Per-call request options.
///
/// ```
/// use cloudsea_core::{ConfigOverrides, Method, RequestOptions};
/// use serde_json::json;
///
/// let options = RequestOptions::new("/v1/orders")
///     .method(Method::Post)
///     .data(json!({"sku": "A-1"}))
///     .name("create-order")
///     .ext(ConfigOverrides {
///         repeat_num: Some(0),
///         ..ConfigOverrides::default()
///     });
/// assert_eq!(options.name.as_deref(), Some("create-order"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Verb; falls back to the instance verb, then `GET`.
    pub method: Option<Method>,
    /// Target URL, absolute or relative to the configured base URL.
    pub url: String,
    /// Headers for this call.
    pub header: HashMap<String, String>,
    /// Body or query parameters.
    pub data: Option<Value>,
    /// Transport-specific fields for this call.
    pub extra: Map<String, Value>,
    /// Per-call configuration layer.
    pub ext: ConfigOverrides,
    /// Registry name used by [`Client::abort`](crate::Client::abort).
    pub name: Option<String>,
}

impl RequestOptions {
    /// Creates options targeting `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the verb.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(name.into(), value.into());
        self
    }

    /// Sets the body or query parameters.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Adds a transport-specific field.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Sets the per-call configuration layer.
    #[must_use]
    pub fn ext(mut self, ext: ConfigOverrides) -> Self {
        self.ext = ext;
        self
    }

    /// Names the request so it can be aborted.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
