//! Request configuration: resolved settings, partial layers and shared defaults.
//!
//! Configuration is resolved per request from three tiers, each overriding
//! the previous one key by key:
//!
//! ```text
//! Defaults (shared)  <-  ClientOptions::ext (instance)  <-  RequestOptions::ext (call)
//! ```
//!
//! [`Config`] is the fully resolved result, [`ConfigOverrides`] is one partial
//! layer (deserializable from JSON using the camelCase option names), and
//! [`Defaults`] is the shared bottom tier, mutated only through
//! [`Defaults::merge`].

mod constants;
mod error;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::adapter::{Adapter, HttpAdapter};

/// Transport shared by every configuration that does not supply its own.
static DEFAULT_ADAPTER: LazyLock<Arc<dyn Adapter>> =
    LazyLock::new(|| Arc::new(HttpAdapter::new()));

pub use constants::{
    DEFAULT_LOGIC_ERROR_MSG_KEY, DEFAULT_LOGIC_ERROR_MSG_UNKNOWN, DEFAULT_REPEAT_NUM,
    DEFAULT_RETCODE_KEY, MAX_REPEAT_NUM, MAX_TIMEOUT_MS, REQUEST_ID_HEADER, REQUEST_TIME_HEADER,
};
pub use error::ConfigError;

/// Where the business result code lives in a response payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RetcodeKeyRepr")]
pub enum RetcodeKey {
    /// No business-code handling; every 2xx response succeeds.
    Disabled,
    /// A single field name.
    Field(String),
    /// Candidate field names; the first one present in the payload wins.
    Candidates(Vec<String>),
}

impl Default for RetcodeKey {
    fn default() -> Self {
        Self::Field(DEFAULT_RETCODE_KEY.to_string())
    }
}

impl RetcodeKey {
    /// Whether business-code handling is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RetcodeKeyRepr {
    Name(String),
    Candidates(Vec<String>),
    Flag(bool),
}

impl TryFrom<RetcodeKeyRepr> for RetcodeKey {
    type Error = String;

    fn try_from(repr: RetcodeKeyRepr) -> Result<Self, Self::Error> {
        match repr {
            RetcodeKeyRepr::Name(name) if name.is_empty() => Ok(Self::Disabled),
            RetcodeKeyRepr::Name(name) => Ok(Self::Field(name)),
            RetcodeKeyRepr::Candidates(names) => Ok(Self::Candidates(names)),
            RetcodeKeyRepr::Flag(false) => Ok(Self::Disabled),
            RetcodeKeyRepr::Flag(true) => {
                Err("`retcodeKey` must be a field name, a list of field names, or false".into())
            }
        }
    }
}

/// Business codes accepted as success in addition to the neutral code `0`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WhitelistRepr")]
pub enum Whitelist {
    /// Whitelist evaluation is off; every 2xx response succeeds.
    Disabled,
    /// Accepted codes. An empty list means only `0` succeeds.
    Codes(Vec<Value>),
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::Codes(Vec::new())
    }
}

impl Whitelist {
    /// Whether whitelist evaluation is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether `code` is listed. Numbers compare by value, so `7` matches `7.0`.
    #[must_use]
    pub fn contains(&self, code: &Value) -> bool {
        match self {
            Self::Disabled => false,
            Self::Codes(codes) => codes.iter().any(|listed| same_code(listed, code)),
        }
    }
}

fn same_code(a: &Value, b: &Value) -> bool {
    let (Value::Number(x), Value::Number(y)) = (a, b) else {
        return a == b;
    };
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    // Integers past i64 on one side only, or a float on either side.
    if x.is_f64() || y.is_f64() {
        return match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => false,
        };
    }
    false
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WhitelistRepr {
    Codes(Vec<Value>),
    Flag(bool),
}

impl TryFrom<WhitelistRepr> for Whitelist {
    type Error = String;

    fn try_from(repr: WhitelistRepr) -> Result<Self, Self::Error> {
        match repr {
            WhitelistRepr::Codes(codes) => Ok(Self::Codes(codes)),
            WhitelistRepr::Flag(false) => Ok(Self::Disabled),
            WhitelistRepr::Flag(true) => {
                Err("`retcodeWhiteList` must be a list of codes or false".into())
            }
        }
    }
}

/// Fully resolved settings for one request.
#[derive(Clone)]
pub struct Config {
    /// Prefix applied to relative request URLs.
    pub base_url: String,
    /// Attach a random `X-Request-Id` header.
    pub x_request_id: bool,
    /// Remaining retry budget. Decremented by the engine, never reset.
    pub repeat_num: u32,
    /// Per-attempt timeout; zero disables it.
    pub timeout: Duration,
    /// Business-code field(s).
    pub retcode_key: RetcodeKey,
    /// Accepted business codes.
    pub retcode_white_list: Whitelist,
    /// Payload field (optionally `outer.inner`) holding the logic error message.
    pub logic_error_msg_key: Option<String>,
    /// Message used when the payload carries none.
    pub logic_error_msg_unknown: String,
    /// Transport adapter; `None` makes every attempt fail.
    pub adapter: Option<Arc<dyn Adapter>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            x_request_id: true,
            repeat_num: DEFAULT_REPEAT_NUM,
            timeout: Duration::ZERO,
            retcode_key: RetcodeKey::default(),
            retcode_white_list: Whitelist::default(),
            logic_error_msg_key: Some(DEFAULT_LOGIC_ERROR_MSG_KEY.to_string()),
            logic_error_msg_unknown: DEFAULT_LOGIC_ERROR_MSG_UNKNOWN.to_string(),
            adapter: Some(Arc::clone(&DEFAULT_ADAPTER)),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("x_request_id", &self.x_request_id)
            .field("repeat_num", &self.repeat_num)
            .field("timeout", &self.timeout)
            .field("retcode_key", &self.retcode_key)
            .field("retcode_white_list", &self.retcode_white_list)
            .field("logic_error_msg_key", &self.logic_error_msg_key)
            .field("logic_error_msg_unknown", &self.logic_error_msg_unknown)
            .field("adapter", &self.adapter.as_ref().map(|a| a.name()))
            .finish()
    }
}

impl Config {
    /// Returns the per-attempt timeout, or `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// Returns a copy of `self` with every key set in `layer` overridden.
    #[must_use]
    pub fn merged(&self, layer: &ConfigOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(base_url) = &layer.base_url {
            merged.base_url.clone_from(base_url);
        }
        if let Some(x_request_id) = layer.x_request_id {
            merged.x_request_id = x_request_id;
        }
        if let Some(repeat_num) = layer.repeat_num {
            merged.repeat_num = repeat_num;
        }
        if let Some(timeout_ms) = layer.timeout {
            merged.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(retcode_key) = &layer.retcode_key {
            merged.retcode_key = retcode_key.clone();
        }
        if let Some(white_list) = &layer.retcode_white_list {
            merged.retcode_white_list = white_list.clone();
        }
        if let Some(key) = &layer.logic_error_msg_key {
            merged.logic_error_msg_key = (!key.is_empty()).then(|| key.clone());
        }
        if let Some(unknown) = &layer.logic_error_msg_unknown {
            merged.logic_error_msg_unknown.clone_from(unknown);
        }
        if let Some(adapter) = &layer.adapter {
            merged.adapter = Some(Arc::clone(adapter));
        }
        merged
    }

    /// Resolves the three configuration tiers in precedence order.
    #[must_use]
    pub fn layered(defaults: &Config, instance: &ConfigOverrides, call: &ConfigOverrides) -> Self {
        defaults.merged(instance).merged(call)
    }
}

/// One partial configuration layer. Unset keys inherit from the layer below.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverrides {
    /// Prefix applied to relative request URLs.
    pub base_url: Option<String>,
    /// Attach a random `X-Request-Id` header.
    pub x_request_id: Option<bool>,
    /// Retry budget.
    pub repeat_num: Option<u32>,
    /// Per-attempt timeout in milliseconds; `0` disables it.
    pub timeout: Option<u64>,
    /// Business-code field(s), or `false` to disable.
    pub retcode_key: Option<RetcodeKey>,
    /// Accepted business codes, or `false` to disable.
    pub retcode_white_list: Option<Whitelist>,
    /// Logic error message field; an empty string disables the lookup.
    pub logic_error_msg_key: Option<String>,
    /// Fallback logic error message.
    pub logic_error_msg_unknown: Option<String>,
    /// Transport adapter. Code-only; never read from JSON.
    #[serde(skip)]
    pub adapter: Option<Arc<dyn Adapter>>,
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("base_url", &self.base_url)
            .field("x_request_id", &self.x_request_id)
            .field("repeat_num", &self.repeat_num)
            .field("timeout", &self.timeout)
            .field("retcode_key", &self.retcode_key)
            .field("retcode_white_list", &self.retcode_white_list)
            .field("logic_error_msg_key", &self.logic_error_msg_key)
            .field("logic_error_msg_unknown", &self.logic_error_msg_unknown)
            .field("adapter", &self.adapter.as_ref().map(|a| a.name()))
            .finish()
    }
}

impl ConfigOverrides {
    /// Creates a layer that only sets the adapter.
    pub fn with_adapter(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter: Some(adapter),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown keys and
    /// [`ConfigError::OutOfRange`] for values outside accepted bounds.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let layer: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::parse("inline", e))?;
        layer.validate()?;
        Ok(layer)
    }

    /// Loads and validates a JSON configuration layer from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise
    /// the same errors as [`from_json_str`](Self::from_json_str).
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let layer: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::parse(path.display().to_string(), e))?;
        layer.validate()?;
        debug!(?layer, "loaded config layer");
        Ok(layer)
    }

    /// Validates numeric bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(repeat_num) = self.repeat_num
            && repeat_num > MAX_REPEAT_NUM
        {
            return Err(ConfigError::OutOfRange {
                field: "repeatNum",
                value: u64::from(repeat_num),
                expected: "0..=10",
            });
        }
        if let Some(timeout) = self.timeout
            && timeout > MAX_TIMEOUT_MS
        {
            return Err(ConfigError::OutOfRange {
                field: "timeout",
                value: timeout,
                expected: "0..=3600000",
            });
        }
        Ok(())
    }
}

/// Shared bottom configuration tier.
///
/// Cloning a `Defaults` shares the same underlying configuration, so several
/// clients can observe one [`merge`](Self::merge).
#[derive(Clone, Default)]
pub struct Defaults {
    inner: Arc<RwLock<Config>>,
}

impl fmt::Debug for Defaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Defaults").field(&self.snapshot()).finish()
    }
}

impl Defaults {
    /// Creates shared defaults from a resolved config.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Returns a copy of the current defaults.
    #[must_use]
    pub fn snapshot(&self) -> Config {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Overlays `layer` onto the defaults. Later merges win; nothing is removed.
    pub fn merge(&self, layer: &ConfigOverrides) {
        match self.inner.write() {
            Ok(mut guard) => *guard = guard.merged(layer),
            Err(poisoned) => {
                warn!("defaults lock poisoned; merging anyway");
                let mut guard = poisoned.into_inner();
                *guard = guard.merged(layer);
            }
        }
    }
}
